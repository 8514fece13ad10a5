//! Reply classification
//!
//! Turns a received sentence into a typed [`Reply`].
//!
//! ### Reply Words
//! - `!re`    - one streamed result row
//! - `!done`  - request finished, may carry final attributes (`=ret=`)
//! - `!trap`  - request failed, `=message=` / `=category=` describe why
//! - `!fatal` - device is closing the connection
//!
//! ### Attribute Words
//! - `=key=value` - result attribute (value may itself contain `=`)
//! - `.tag=N`     - correlation tag of the originating request
//! - `.key=value` - other API attributes

use std::collections::BTreeMap;

use crate::error::{DeviceError, ProtocolError, Result};
use super::Sentence;

/// One result row or set of final attributes
pub type Attributes = BTreeMap<String, String>;

/// Correlation id attached with `.tag=`
pub type Tag = u32;

/// Reply types, taken from the first word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Re,
    Done,
    Trap,
    Fatal,
    /// A sentence without words
    Empty,
    /// Any other first word; ignored by the correlator
    Unknown(String),
}

impl ReplyKind {
    fn from_word(word: &str) -> Self {
        match word {
            "!re" => ReplyKind::Re,
            "!done" => ReplyKind::Done,
            "!trap" => ReplyKind::Trap,
            "!fatal" => ReplyKind::Fatal,
            other => ReplyKind::Unknown(other.to_string()),
        }
    }
}

/// A classified reply sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,

    /// `=key=value` words
    pub attributes: Attributes,

    /// `.key=value` words other than `.tag`
    pub api_attributes: Attributes,

    /// Value of `.tag=`, if present and numeric
    pub tag: Option<Tag>,

    /// Words that are neither attributes nor API attributes
    /// (the reason text of `!fatal` lands here)
    pub bare_words: Vec<String>,
}

impl Reply {
    /// Classify a sentence
    pub fn parse(sentence: &Sentence) -> Result<Self> {
        let words = sentence.to_strings()?;
        let mut iter = words.into_iter();

        let kind = match iter.next() {
            Some(first) => ReplyKind::from_word(&first),
            None => ReplyKind::Empty,
        };

        let mut reply = Reply {
            kind,
            attributes: Attributes::new(),
            api_attributes: Attributes::new(),
            tag: None,
            bare_words: Vec::new(),
        };

        for word in iter {
            reply.absorb_word(word);
        }

        Ok(reply)
    }

    fn absorb_word(&mut self, word: String) {
        if let Some(rest) = word.strip_prefix('=') {
            let (key, value) = split_key_value(rest);
            self.attributes.insert(key.to_string(), value.to_string());
        } else if let Some(rest) = word.strip_prefix('.') {
            let (key, value) = split_key_value(rest);
            if key == "tag" {
                match value.parse() {
                    Ok(tag) => {
                        self.tag = Some(tag);
                        return;
                    }
                    Err(_) => tracing::debug!("Non-numeric reply tag {:?}", value),
                }
            }
            self.api_attributes.insert(key.to_string(), value.to_string());
        } else {
            self.bare_words.push(word);
        }
    }

    /// `!done` and `!trap` end a request
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ReplyKind::Done | ReplyKind::Trap)
    }

    /// Text explaining a `!fatal` (or any other) reply
    pub fn reason(&self) -> String {
        if let Some(message) = self.attributes.get("message") {
            return message.clone();
        }
        if self.bare_words.is_empty() {
            "no reason given".to_string()
        } else {
            self.bare_words.join(" ")
        }
    }

    /// Device error detail for a `!trap`
    pub fn into_device_error(self) -> DeviceError {
        DeviceError::from_attributes(self.attributes)
    }

    /// Fail with [`ProtocolError::UnexpectedReply`] unless this reply has `kind`
    pub fn expect_kind(&self, kind: ReplyKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedReply(format!(
                "expected {:?}, got {:?}",
                kind, self.kind
            ))
            .into())
        }
    }
}

/// Split `key=value` on its first `=`; a missing value is empty
fn split_key_value(s: &str) -> (&str, &str) {
    s.split_once('=').unwrap_or((s, ""))
}
