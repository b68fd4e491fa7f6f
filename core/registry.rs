// Link-type and protocol-family dispatch tables
use crate::decode::{Decoder, RawDecoder};
use crate::types::CaptureMeta;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

// Process-wide fallback table: empty registries, opaque default.
static SHARED: Lazy<Arc<DispatchTable>> =
    Lazy::new(|| Arc::new(DispatchTable::new(Arc::new(RawDecoder))));

/// Decoder selected for a capture read, with the level it decodes at.
pub enum Dispatch {
    /// Link-type match: decode, then unwrap the link header.
    Link(Arc<dyn Decoder>),
    /// Protocol-family match: decode and return as-is.
    Network(Arc<dyn Decoder>),
    /// No registry match: default decoder at network level. The caller
    /// is expected to emit one warning per read taking this path.
    Fallback(Arc<dyn Decoder>),
}

/// Read-mostly decoder lookup, integer-keyed on link-type and
/// protocol-family codes. Built once at startup and injected into
/// transports; nothing mutates a table once it is shared.
pub struct DispatchTable {
    link: HashMap<u16, Arc<dyn Decoder>>,
    family: HashMap<u16, Arc<dyn Decoder>>,
    default_link: Arc<dyn Decoder>,
}

impl DispatchTable {
    pub fn new(default_link: Arc<dyn Decoder>) -> Self {
        DispatchTable {
            link: HashMap::new(),
            family: HashMap::new(),
            default_link,
        }
    }

    /// The process-wide default table (opaque decoder, no registrations).
    pub fn shared() -> Arc<DispatchTable> {
        SHARED.clone()
    }

    pub fn register_link_type(&mut self, code: u16, decoder: Arc<dyn Decoder>) {
        self.link.insert(code, decoder);
    }

    pub fn register_family(&mut self, code: u16, decoder: Arc<dyn Decoder>) {
        self.family.insert(code, decoder);
    }

    pub fn default_decoder(&self) -> &Arc<dyn Decoder> {
        &self.default_link
    }

    /// Select a decoder for one capture read. Link-type codes win over
    /// protocol-family codes; an unknown pair falls back to the default.
    pub fn resolve(&self, meta: &CaptureMeta) -> Dispatch {
        if let Some(decoder) = self.link.get(&meta.link_type) {
            Dispatch::Link(decoder.clone())
        } else if let Some(decoder) = self.family.get(&meta.protocol) {
            Dispatch::Network(decoder.clone())
        } else {
            Dispatch::Fallback(self.default_link.clone())
        }
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        DispatchTable::new(Arc::new(RawDecoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    fn meta(protocol: u16, link_type: u16) -> CaptureMeta {
        CaptureMeta {
            ifindex: 2,
            protocol,
            direction: Direction::Incoming,
            link_type,
        }
    }

    #[test]
    fn link_type_wins_over_family() {
        let mut table = DispatchTable::default();
        table.register_link_type(1, Arc::new(RawDecoder));
        table.register_family(0x0800, Arc::new(RawDecoder));
        assert!(matches!(table.resolve(&meta(0x0800, 1)), Dispatch::Link(_)));
    }

    #[test]
    fn family_matches_when_link_type_unknown() {
        let mut table = DispatchTable::default();
        table.register_family(0x0800, Arc::new(RawDecoder));
        assert!(matches!(
            table.resolve(&meta(0x0800, 99)),
            Dispatch::Network(_)
        ));
    }

    #[test]
    fn unknown_pair_falls_back_to_default() {
        let table = DispatchTable::default();
        let dispatch = table.resolve(&meta(0x9999, 99));
        match dispatch {
            Dispatch::Fallback(decoder) => assert_eq!(decoder.name(), "raw"),
            _ => panic!("expected fallback"),
        }
    }

    #[test]
    fn shared_table_has_opaque_default() {
        let table = DispatchTable::shared();
        assert_eq!(table.default_decoder().name(), "raw");
    }
}
