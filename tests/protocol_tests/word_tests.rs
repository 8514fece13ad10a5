//! Word Codec Tests
//!
//! Tests for length prefix and word encoding/decoding.

use std::io::{self, Cursor, Read};

use bytes::BytesMut;
use tikapi::network::TransportReader;
use tikapi::protocol::{
    decode_length, decode_word, encode_length, encode_word, length_prefix_size, read_word,
};
use tikapi::{ApiError, ProtocolError};

/// Hands out its bytes once, then reports an expired read timeout
struct StallingReader {
    data: Option<Vec<u8>>,
}

impl Read for StallingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.take() {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }
}

fn prefix(len: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_length(len, &mut buf);
    buf.to_vec()
}

// =============================================================================
// Length Prefix Tests
// =============================================================================

#[test]
fn test_one_byte_prefix() {
    assert_eq!(prefix(0), vec![0x00]);
    assert_eq!(prefix(0x05), vec![0x05]);
    assert_eq!(prefix(0x7F), vec![0x7F]);
}

#[test]
fn test_two_byte_prefix() {
    assert_eq!(prefix(0x80), vec![0x80, 0x80]);
    assert_eq!(prefix(0x3FFF), vec![0xBF, 0xFF]);
}

#[test]
fn test_three_byte_prefix() {
    assert_eq!(prefix(0x4000), vec![0xC0, 0x40, 0x00]);
    assert_eq!(prefix(0x1F_FFFF), vec![0xDF, 0xFF, 0xFF]);
}

#[test]
fn test_four_byte_prefix() {
    assert_eq!(prefix(0x20_0000), vec![0xE0, 0x20, 0x00, 0x00]);
    assert_eq!(prefix(0xFFF_FFFF), vec![0xEF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_five_byte_prefix() {
    assert_eq!(prefix(0x1000_0000), vec![0xF0, 0x10, 0x00, 0x00, 0x00]);
    assert_eq!(prefix(u32::MAX), vec![0xF0, 0xFF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_boundaries_select_prefix_size() {
    let cases = [
        (0x7F, 1),
        (0x80, 2),
        (0x3FFF, 2),
        (0x4000, 3),
        (0x1F_FFFF, 3),
        (0x20_0000, 4),
        (0xFFF_FFFF, 4),
        (0x1000_0000, 5),
    ];

    for (len, size) in cases {
        assert_eq!(length_prefix_size(len), size, "length 0x{:x}", len);
        assert_eq!(prefix(len).len(), size, "length 0x{:x}", len);

        let (decoded, consumed) = decode_length(&prefix(len)).unwrap();
        assert_eq!(decoded, len);
        assert_eq!(consumed, size);
    }
}

#[test]
fn test_decode_length_empty_input() {
    let err = decode_length(&[]).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::Truncated {
            expected: 1,
            available: 0
        })
    ));
}

#[test]
fn test_decode_length_missing_continuation() {
    // 3-byte prefix with only 2 bytes present
    let err = decode_length(&[0xC0, 0x40]).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::Truncated {
            expected: 3,
            available: 2
        })
    ));
}

#[test]
fn test_reserved_prefix_byte() {
    let err = decode_length(&[0xF8, 0, 0, 0, 0]).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::InvalidLengthPrefix(0xF8))
    ));
}

// =============================================================================
// Word Tests
// =============================================================================

#[test]
fn test_encode_short_word() {
    let encoded = encode_word(b"/login").unwrap();
    assert_eq!(&encoded[..], b"\x06/login");
}

#[test]
fn test_empty_word_is_terminator() {
    assert_eq!(&encode_word(b"").unwrap()[..], &[0x00]);
}

#[test]
fn test_word_round_trip_across_prefix_sizes() {
    for len in [0usize, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000] {
        let word: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let encoded = encode_word(&word).unwrap();

        let (decoded, consumed) = decode_word(&encoded).unwrap();
        assert_eq!(decoded.len(), len);
        assert_eq!(&decoded[..], &word[..]);
        assert_eq!(consumed, encoded.len());
    }
}

#[test]
fn test_decode_word_largest_four_byte_length() {
    // Header only: the payload is never allocated
    let mut data = prefix(0xFFF_FFFF);
    assert_eq!(data, vec![0xEF, 0xFF, 0xFF, 0xFF]);
    data.extend_from_slice(b"abc");

    let err = decode_word(&data).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::Truncated {
            expected: 0x1000_0003,
            available: 7
        })
    ));
}

#[test]
fn test_decode_word_ignores_trailing_bytes() {
    let mut data = encode_word(b"!done").unwrap().to_vec();
    data.extend_from_slice(b"\x00garbage");

    let (word, consumed) = decode_word(&data).unwrap();
    assert_eq!(&word[..], b"!done");
    assert_eq!(consumed, 6);
}

#[test]
fn test_decode_word_truncated_payload() {
    let err = decode_word(&[0x05, b'a', b'b']).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::Truncated {
            expected: 6,
            available: 3
        })
    ));
}

// =============================================================================
// Stream Reading Tests
// =============================================================================

#[test]
fn test_read_word_from_stream() {
    let mut reader = TransportReader::new(Cursor::new(b"\x05hello\x00".to_vec()));

    let word = read_word(&mut reader, 1024, true).unwrap();
    assert_eq!(&word[..], b"hello");

    let terminator = read_word(&mut reader, 1024, false).unwrap();
    assert!(terminator.is_empty());
}

#[test]
fn test_read_word_peer_closes_mid_payload() {
    // Declares 5 payload bytes, delivers 2, then closes
    let mut reader = TransportReader::new(Cursor::new(vec![0x05, b'a', b'b']));

    let err = read_word(&mut reader, 1024, true).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::Truncated {
            expected: 5,
            available: 2
        })
    ));
}

#[test]
fn test_read_word_stall_mid_payload_is_truncated() {
    let mut reader = TransportReader::new(StallingReader {
        data: Some(vec![0x05, b'a', b'b']),
    });

    let err = read_word(&mut reader, 1024, true).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::Truncated { expected: 5, .. })
    ));
}

#[test]
fn test_read_word_peer_closes_at_boundary() {
    let mut reader = TransportReader::new(Cursor::new(Vec::new()));

    let err = read_word(&mut reader, 1024, true).unwrap_err();
    assert!(matches!(err, ApiError::ConnectionClosed(_)));
}

#[test]
fn test_read_word_rejects_oversized_word() {
    let mut data = Vec::new();
    let mut buf = BytesMut::new();
    encode_length(4096, &mut buf);
    data.extend_from_slice(&buf);
    let mut reader = TransportReader::new(Cursor::new(data));

    let err = read_word(&mut reader, 1024, true).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::WordTooLong { len: 4096, max: 1024 })
    ));
}

#[test]
fn test_read_word_rejects_reserved_prefix() {
    let mut reader = TransportReader::new(Cursor::new(vec![0xFF, 0x01]));

    let err = read_word(&mut reader, 1024, true).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::InvalidLengthPrefix(0xFF))
    ));
}
