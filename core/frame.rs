// Decoded frame model - an ordered chain of layers, outermost first
use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

/// Role of a layer within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Link-level header, stripped when a link-level decode is unwrapped.
    Link,
    /// Protocol header above the link level.
    Proto,
    /// Opaque bytes no dissector claimed.
    Raw,
    /// Trailing bytes past the end of the decoded structure. A frame's
    /// trailing padding chain is detached before the frame is returned
    /// and its length is excluded from the consumed byte count.
    Padding,
}

/// One decoded layer and the wire bytes it claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub kind: LayerKind,
    pub name: &'static str,
    pub data: Vec<u8>,
}

impl Layer {
    pub fn new(kind: LayerKind, name: &'static str, data: Vec<u8>) -> Self {
        Layer { kind, name, data }
    }
}

/// A decoded protocol frame.
///
/// Layers are ordered outermost to innermost. `ts` is the capture
/// timestamp attached by receiving transports; `sent_at` is stamped by
/// `send`; `dst` addresses raw network-level sends.
#[derive(Debug, Clone)]
pub struct Frame {
    layers: Vec<Layer>,
    pub ts: Option<SystemTime>,
    pub sent_at: Option<SystemTime>,
    pub dst: Option<IpAddr>,
}

impl Frame {
    pub fn new(layers: Vec<Layer>) -> Self {
        Frame {
            layers,
            ts: None,
            sent_at: None,
            dst: None,
        }
    }

    /// Opaque frame: a single raw layer holding `bytes` unchanged.
    pub fn raw(bytes: &[u8]) -> Self {
        Frame::new(vec![Layer::new(LayerKind::Raw, "raw", bytes.to_vec())])
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Total wire length in bytes.
    pub fn len(&self) -> usize {
        self.layers.iter().map(|l| l.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire serialization: layer bytes concatenated in order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        for layer in &self.layers {
            bytes.extend_from_slice(&layer.data);
        }
        bytes
    }

    /// Drop the outermost layer, keeping timestamps and destination.
    /// Used to unwrap a link-level decode down to its payload.
    pub fn into_payload(mut self) -> Frame {
        if !self.layers.is_empty() {
            self.layers.remove(0);
        }
        self
    }

    /// Detach the trailing padding chain and return its byte length.
    ///
    /// The first padding layer (scanning outermost to innermost) starts
    /// the chain; the chain's total length P is returned even when no
    /// detachment happens. If the padding layer is the outermost layer
    /// there is nothing to detach it from, so the frame is left intact
    /// (the caller's length accounting still subtracts P). Returns 0
    /// when the frame has no padding layer.
    pub fn trim_padding(&mut self) -> usize {
        let Some(start) = self
            .layers
            .iter()
            .position(|l| l.kind == LayerKind::Padding)
        else {
            return 0;
        };
        let pad: usize = self.layers[start..]
            .iter()
            .take_while(|l| l.kind == LayerKind::Padding)
            .map(|l| l.data.len())
            .sum();
        if start > 0 {
            self.layers.truncate(start);
        }
        pad
    }
}

/// One-line human-readable frame summary.
pub fn format_frame(frame: &Frame) -> String {
    let path = if frame.layers.is_empty() {
        "empty".to_string()
    } else {
        frame
            .layers
            .iter()
            .map(|l| l.name)
            .collect::<Vec<_>>()
            .join("/")
    };
    match frame.ts {
        Some(ts) => {
            let dt = chrono::DateTime::<chrono::Local>::from(ts);
            format!(
                "{} {} ({} bytes)",
                dt.format("%Y/%m/%d %H:%M:%S%.6f"),
                path,
                frame.len()
            )
        }
        None => format!("{} ({} bytes)", path, frame.len()),
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format_frame(self))
    }
}
