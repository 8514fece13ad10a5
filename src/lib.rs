//! # tikapi
//!
//! A blocking client for the RouterOS-style binary management API:
//! - Variable-length word codec and sentence framing
//! - Plaintext login handshake with an explicit session state machine
//! - Streamed `!re` rows collected per request
//! - Tagged requests from many threads over one connection
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Application (execute / stream)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Session   │─────────▶│   Client    │
//!   │ (one req.)  │  into_   │ (tagged,    │
//!   └──────┬──────┘  client  │ reader thr.)│
//!          │                 └──────┬──────┘
//!          └────────────┬───────────┘
//!                       ▼
//!               ┌───────────────┐
//!               │   Sentence    │
//!               │    Framer     │
//!               └───────┬───────┘
//!                       ▼
//!               ┌───────────────┐        ┌─────────────┐
//!               │  Word Codec   │◀──────▶│  Transport  │
//!               └───────────────┘        │    (TCP)    │
//!                                        └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tikapi::{commands, Config, Session};
//!
//! let config = Config::builder()
//!     .host("192.168.88.1")
//!     .username("admin")
//!     .password("secret")
//!     .build();
//!
//! let mut session = Session::open(config)?;
//! for row in session.run(&commands::identity())?.rows {
//!     println!("{:?}", row.get("name"));
//! }
//!
//! let added = session.execute(
//!     "/ip/address/add",
//!     [("address", "10.0.0.1/24"), ("interface", "ether1")],
//! )?;
//! println!("new id: {:?}", added.last().and_then(|done| done.get("ret")));
//! session.disconnect();
//! # Ok::<(), tikapi::ApiError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod commands;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ApiError, DeviceError, ProtocolError, Result};
pub use config::Config;
pub use network::{Client, CloseReason, Response, Session, SessionState};
pub use protocol::{Attributes, Command, Reply, ReplyKind, Sentence, Tag};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tikapi
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
