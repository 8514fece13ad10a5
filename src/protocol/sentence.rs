//! Sentence framing
//!
//! A sentence is one protocol message: a run of words closed by a
//! zero-length word.
//!
//! ```text
//! ┌─────────┬─────────┬─────┬─────────┬──────┐
//! │ Word 1  │ Word 2  │ ... │ Word N  │ 0x00 │
//! └─────────┴─────────┴─────┴─────────┴──────┘
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ApiError, ProtocolError, Result};
use crate::network::{WireRead, WireWrite};
use super::word::{put_word, read_word};

/// Prefix of the login attribute that must never reach the logs
const PASSWORD_PREFIX: &[u8] = b"=password=";

/// An ordered list of non-empty words
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<Bytes>,
}

impl Sentence {
    /// Create an empty sentence
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sentence from any list of byte-like words
    pub fn from_words<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: AsRef<[u8]>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| Bytes::copy_from_slice(w.as_ref()))
                .collect(),
        }
    }

    /// Append a word
    pub fn push(&mut self, word: impl Into<Bytes>) {
        self.words.push(word.into());
    }

    pub fn words(&self) -> &[Bytes] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// First word, which classifies the sentence
    pub fn first_word(&self) -> Option<&[u8]> {
        self.words.first().map(|w| w.as_ref())
    }

    /// Word `index` as UTF-8 text
    pub fn word_str(&self, index: usize) -> Result<Option<&str>> {
        self.words
            .get(index)
            .map(|w| std::str::from_utf8(w).map_err(|_| ApiError::from(ProtocolError::InvalidUtf8)))
            .transpose()
    }

    /// All words as owned UTF-8 strings
    pub fn to_strings(&self) -> Result<Vec<String>> {
        self.words
            .iter()
            .map(|w| {
                String::from_utf8(w.to_vec()).map_err(|_| ApiError::from(ProtocolError::InvalidUtf8))
            })
            .collect()
    }

    /// Encode this sentence including its terminator
    pub fn encode(&self) -> Result<Bytes> {
        encode_sentence(&self.words)
    }
}

impl fmt::Display for Sentence {
    /// Space separated words, with login passwords masked
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if word.starts_with(PASSWORD_PREFIX) {
                f.write_str("=password=***")?;
            } else {
                write!(f, "{}", String::from_utf8_lossy(word))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a list of words followed by the zero-length terminator
///
/// Empty words are rejected: a zero length is reserved for the terminator.
pub fn encode_sentence<W: AsRef<[u8]>>(words: &[W]) -> Result<Bytes> {
    let capacity = words.iter().map(|w| w.as_ref().len() + 1).sum::<usize>() + 1;
    let mut buf = BytesMut::with_capacity(capacity);

    for (i, word) in words.iter().enumerate() {
        let word = word.as_ref();
        if word.is_empty() {
            return Err(ApiError::InvalidCommand(format!(
                "word {} is empty; zero length is reserved for the terminator",
                i
            )));
        }
        put_word(word, &mut buf)?;
    }
    buf.put_u8(0x00);

    Ok(buf.freeze())
}

// =============================================================================
// Stream-based I/O
// =============================================================================

/// Write a sentence as a single transport write
pub fn write_sentence<T, W>(tx: &mut T, words: &[W]) -> Result<()>
where
    T: WireWrite + ?Sized,
    W: AsRef<[u8]>,
{
    let bytes = encode_sentence(words)?;
    tx.send(&bytes)
}

/// Read the next non-empty sentence
///
/// Blocks until a terminator has been read. Empty sentences (a bare
/// terminator) are protocol no-ops and are skipped.
pub fn read_sentence<R: WireRead + ?Sized>(rx: &mut R, max_word_len: u32) -> Result<Sentence> {
    loop {
        let mut sentence = Sentence::new();

        loop {
            let word = read_word(rx, max_word_len, sentence.is_empty())?;
            if word.is_empty() {
                break;
            }
            sentence.push(word);
        }

        if !sentence.is_empty() {
            return Ok(sentence);
        }
        tracing::trace!("Skipping empty sentence");
    }
}
