//! Protocol Module
//!
//! Defines the wire protocol spoken with the device.
//!
//! ## Wire Format
//!
//! Every message is a *sentence*: a list of length-prefixed *words*
//! closed by a zero-length word.
//!
//! ```text
//! ┌────────┬──────────────┬────────┬──────────────┬─────┬──────┐
//! │ Len    │ "/login"     │ Len    │ "=name=admin"│ ... │ 0x00 │
//! └────────┴──────────────┴────────┴──────────────┴─────┴──────┘
//! ```
//!
//! ### Command Sentences
//! - first word is a menu path: `/interface/print`
//! - `=key=value` attributes, `?query` words, optional `.tag=N`
//!
//! ### Reply Sentences
//! - `!re`    - streamed row
//! - `!done`  - success
//! - `!trap`  - error (request-local)
//! - `!fatal` - connection is being closed

mod word;
mod sentence;
mod reply;
mod command;

pub use word::{
    decode_length, decode_word, encode_length, encode_word, length_prefix_size,
    prefix_size_from_first_byte, put_word, read_word, MAX_PREFIX_SIZE,
};
pub use sentence::{encode_sentence, read_sentence, write_sentence, Sentence};
pub use reply::{Attributes, Reply, ReplyKind, Tag};
pub use command::Command;
