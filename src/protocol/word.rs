//! Word codec
//!
//! Encoding and decoding of single length-prefixed words.
//!
//! ## Length Prefix
//!
//! ```text
//! ┌─────────────────────────┬───────┬──────────────────────────────────┐
//! │ Length range            │ Bytes │ Layout                           │
//! ├─────────────────────────┼───────┼──────────────────────────────────┤
//! │ 0x00       - 0x7F       │ 1     │ 0xxxxxxx                         │
//! │ 0x80       - 0x3FFF     │ 2     │ 10xxxxxx xxxxxxxx                │
//! │ 0x4000     - 0x1FFFFF   │ 3     │ 110xxxxx xxxxxxxx xxxxxxxx       │
//! │ 0x200000   - 0xFFFFFFF  │ 4     │ 1110xxxx xxxxxxxx xxxxxxxx ...   │
//! │ 0x10000000 - 0xFFFFFFFF │ 5     │ 11110000 + 4 raw big-endian      │
//! └─────────────────────────┴───────┴──────────────────────────────────┘
//! ```
//!
//! First bytes `0xF1..=0xFF` are reserved control bytes and never start a
//! word.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ApiError, ProtocolError, Result};
use crate::network::WireRead;

/// Longest possible length prefix
pub const MAX_PREFIX_SIZE: usize = 5;

/// Marker byte for the five-byte form
const FIVE_BYTE_MARKER: u8 = 0xF0;

// =============================================================================
// Length Prefix
// =============================================================================

/// Number of prefix bytes needed to encode `len`
pub fn length_prefix_size(len: u32) -> usize {
    match len {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}

/// Append the length prefix for `len` to `buf`
pub fn encode_length(len: u32, buf: &mut BytesMut) {
    match length_prefix_size(len) {
        1 => buf.put_u8(len as u8),
        2 => buf.put_u16(len as u16 | 0x8000),
        3 => {
            let value = len | 0xC0_0000;
            buf.put_u8((value >> 16) as u8);
            buf.put_u16(value as u16);
        }
        4 => buf.put_u32(len | 0xE000_0000),
        _ => {
            buf.put_u8(FIVE_BYTE_MARKER);
            buf.put_u32(len);
        }
    }
}

/// Total prefix size announced by the first prefix byte
pub fn prefix_size_from_first_byte(first: u8) -> Result<usize> {
    if first & 0x80 == 0x00 {
        Ok(1)
    } else if first & 0xC0 == 0x80 {
        Ok(2)
    } else if first & 0xE0 == 0xC0 {
        Ok(3)
    } else if first & 0xF0 == 0xE0 {
        Ok(4)
    } else if first == FIVE_BYTE_MARKER {
        Ok(5)
    } else {
        Err(ProtocolError::InvalidLengthPrefix(first).into())
    }
}

/// Combine a complete prefix (as sized by [`prefix_size_from_first_byte`])
/// into the length it encodes
fn length_from_prefix(prefix: &[u8]) -> u32 {
    let first = prefix[0];
    match prefix.len() {
        1 => u32::from(first),
        2 => u32::from(first & 0x3F) << 8 | u32::from(prefix[1]),
        3 => u32::from(first & 0x1F) << 16 | u32::from(prefix[1]) << 8 | u32::from(prefix[2]),
        4 => {
            u32::from(first & 0x0F) << 24
                | u32::from(prefix[1]) << 16
                | u32::from(prefix[2]) << 8
                | u32::from(prefix[3])
        }
        _ => u32::from_be_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]),
    }
}

/// Decode a length prefix from the start of `src`
///
/// Returns the length and the number of prefix bytes consumed
pub fn decode_length(src: &[u8]) -> Result<(u32, usize)> {
    let first = *src.first().ok_or(ProtocolError::Truncated {
        expected: 1,
        available: 0,
    })?;
    let size = prefix_size_from_first_byte(first)?;

    if src.len() < size {
        return Err(ProtocolError::Truncated {
            expected: size,
            available: src.len(),
        }
        .into());
    }

    Ok((length_from_prefix(&src[..size]), size))
}

// =============================================================================
// Word Encoding/Decoding
// =============================================================================

/// Append one encoded word (prefix + payload) to `buf`
pub fn put_word(word: &[u8], buf: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(word.len()).map_err(|_| ProtocolError::WordTooLong {
        len: word.len() as u64,
        max: u64::from(u32::MAX),
    })?;

    buf.reserve(length_prefix_size(len) + word.len());
    encode_length(len, buf);
    buf.put_slice(word);
    Ok(())
}

/// Encode a single word
///
/// An empty input encodes to the sentence terminator `[0x00]`.
pub fn encode_word(word: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    put_word(word, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode a single word from the start of `src`
///
/// Returns the payload and the total number of bytes consumed
pub fn decode_word(src: &[u8]) -> Result<(Bytes, usize)> {
    let (len, prefix_len) = decode_length(src)?;
    let total = prefix_len + len as usize;

    if src.len() < total {
        return Err(ProtocolError::Truncated {
            expected: total,
            available: src.len(),
        }
        .into());
    }

    Ok((Bytes::copy_from_slice(&src[prefix_len..total]), total))
}

// =============================================================================
// Stream-based reading
// =============================================================================

/// Read one word from a transport
///
/// `at_boundary` is true when nothing of the current sentence has been
/// consumed yet: a close or timeout there is reported as-is. Once any byte
/// of a sentence has been read, a short read means the stream can no longer
/// be realigned and is reported as [`ProtocolError::Truncated`].
pub fn read_word<R: WireRead + ?Sized>(
    rx: &mut R,
    max_len: u32,
    at_boundary: bool,
) -> Result<Bytes> {
    let mut prefix = [0u8; MAX_PREFIX_SIZE];

    if at_boundary {
        let first = rx.recv_exact(1)?;
        prefix[0] = first[0];
    } else {
        fill(rx, &mut prefix[..1])?;
    }

    let size = prefix_size_from_first_byte(prefix[0])?;
    if size > 1 {
        fill(rx, &mut prefix[1..size])?;
    }

    let len = length_from_prefix(&prefix[..size]);
    if len > max_len {
        return Err(ProtocolError::WordTooLong {
            len: u64::from(len),
            max: u64::from(max_len),
        }
        .into());
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        fill(rx, &mut payload)?;
    }

    Ok(Bytes::from(payload))
}

/// Fill `buf` completely; a close or stall partway through a word is a
/// truncated frame
fn fill<R: WireRead + ?Sized>(rx: &mut R, buf: &mut [u8]) -> Result<()> {
    match rx.recv_into(buf) {
        Ok(n) if n == buf.len() => Ok(()),
        Ok(n) => Err(ProtocolError::Truncated {
            expected: buf.len(),
            available: n,
        }
        .into()),
        Err(ApiError::Timeout) | Err(ApiError::ConnectionClosed(_)) => {
            Err(ProtocolError::Truncated {
                expected: buf.len(),
                available: 0,
            }
            .into())
        }
        Err(e) => Err(e),
    }
}
