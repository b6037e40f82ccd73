//! Transport layer for the tool server.
//!
//! - `codec.rs` - Line and `Content-Length` framing
//! - `session.rs` - Read loop, single writer task and in-flight limits
//! - `stdio.rs` - The session bound to the process's stdin and stdout
//!
//! Sessions are generic over the byte streams, so tests drive them through
//! in-memory pipes.

pub mod codec;
mod config;
mod error;
pub mod session;
pub mod stdio;

pub use codec::{DecodeError, Decoded, FrameLocation, FrameReader, FrameWriter};
pub use config::{Framing, TransportConfig};
pub use error::{TransportError, TransportResult};
pub use session::serve;
pub use stdio::StdioTransport;
