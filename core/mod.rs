// Core module: frame model, decoder capability and dispatch tables (NO socket I/O)
pub mod decode;
pub mod error;
pub mod frame;
pub mod registry;
pub mod types;

pub use decode::*;
pub use error::*;
pub use frame::*;
pub use registry::*;
pub use types::*;
