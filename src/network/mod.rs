//! Network Module
//!
//! Connection handling on top of the protocol codec.
//!
//! ## Architecture
//! - [`Transport`]: TCP stream with timeouts, split into buffered halves
//! - [`Session`]: login handshake and one-request-at-a-time commands
//! - [`Client`]: tagged requests from many threads, one reader thread

mod transport;
mod abandoned;
mod session;
mod client;

pub use transport::{ShutdownHandle, Transport, TransportReader, TransportWriter, WireRead, WireWrite};
pub use abandoned::MAX_ABANDONED_TAGS;
pub use session::{CloseReason, Response, Session, SessionState};
pub use client::{Client, ReplyStream};
