// Transport module: one send/receive contract over heterogeneous channels
pub mod buffered;
#[cfg(target_os = "linux")]
pub mod raw;
pub mod stream;
pub mod tcpdump;
pub mod traits;

mod sys;

pub use buffered::*;
#[cfg(target_os = "linux")]
pub use raw::*;
pub use stream::*;
pub use tcpdump::*;
pub use traits::*;
