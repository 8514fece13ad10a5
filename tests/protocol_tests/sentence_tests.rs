//! Sentence Framing Tests
//!
//! Tests for writing and reading terminator-delimited sentences.

#[path = "../common/mod.rs"]
mod common;

use std::io::Cursor;

use common::SharedBuf;
use tikapi::network::{TransportReader, TransportWriter};
use tikapi::protocol::{encode_sentence, read_sentence, write_sentence, Sentence};
use tikapi::{ApiError, ProtocolError};

fn reader(bytes: Vec<u8>) -> TransportReader {
    TransportReader::new(Cursor::new(bytes))
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_single_word_sentence() {
    let bytes = encode_sentence(&["/login"]).unwrap();
    assert_eq!(&bytes[..], b"\x06/login\x00");
}

#[test]
fn test_encode_login_sentence() {
    let bytes = encode_sentence(&["/login", "=name=admin", "=password="]).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(b"\x06/login");
    expected.extend_from_slice(b"\x0b=name=admin");
    expected.extend_from_slice(b"\x0a=password=");
    expected.push(0x00);
    assert_eq!(&bytes[..], &expected[..]);
}

#[test]
fn test_encode_rejects_empty_word() {
    let result = encode_sentence(&["/interface/print", ""]);
    assert!(matches!(result, Err(ApiError::InvalidCommand(_))));
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_write_then_read_reproduces_words() {
    let sent = SharedBuf::default();
    let mut writer = TransportWriter::new(sent.clone());

    let long_value = format!("=comment={}", "x".repeat(300));
    let words = vec![
        "/ip/address/add".to_string(),
        "=address=10.0.0.1/24".to_string(),
        long_value,
        ".tag=42".to_string(),
    ];
    write_sentence(&mut writer, &words).unwrap();

    let mut rx = reader(sent.contents());
    let sentence = read_sentence(&mut rx, 1024).unwrap();
    assert_eq!(sentence.to_strings().unwrap(), words);
}

#[test]
fn test_binary_words_survive() {
    let sent = SharedBuf::default();
    let mut writer = TransportWriter::new(sent.clone());

    let words: Vec<Vec<u8>> = vec![vec![0xFF, 0x00, 0x80], vec![0x00]];
    write_sentence(&mut writer, &words).unwrap();

    let sentence = read_sentence(&mut reader(sent.contents()), 1024).unwrap();
    assert_eq!(sentence, Sentence::from_words(&words));
}

#[test]
fn test_consecutive_sentences() {
    let bytes = common::wire(&[
        &["!re", "=name=ether1"],
        &["!re", "=name=ether2"],
        &["!done"],
    ]);
    let mut rx = reader(bytes);

    let first = read_sentence(&mut rx, 1024).unwrap();
    let second = read_sentence(&mut rx, 1024).unwrap();
    let third = read_sentence(&mut rx, 1024).unwrap();

    assert_eq!(first.word_str(1).unwrap(), Some("=name=ether1"));
    assert_eq!(second.word_str(1).unwrap(), Some("=name=ether2"));
    assert_eq!(third.first_word(), Some(&b"!done"[..]));
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_empty_sentences_are_skipped() {
    let mut bytes = vec![0x00, 0x00];
    bytes.extend_from_slice(&encode_sentence(&["!done"]).unwrap());
    let mut rx = reader(bytes);

    let sentence = read_sentence(&mut rx, 1024).unwrap();
    assert_eq!(sentence.len(), 1);
    assert_eq!(sentence.word_str(0).unwrap(), Some("!done"));
}

#[test]
fn test_missing_terminator_is_truncated() {
    // One complete word, then the stream ends before the terminator
    let mut rx = reader(b"\x05!done".to_vec());

    let err = read_sentence(&mut rx, 1024).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Protocol(ProtocolError::Truncated { .. })
    ));
}

#[test]
fn test_close_between_sentences_is_connection_closed() {
    let mut rx = reader(encode_sentence(&["!done"]).unwrap().to_vec());

    read_sentence(&mut rx, 1024).unwrap();
    let err = read_sentence(&mut rx, 1024).unwrap_err();
    assert!(matches!(err, ApiError::ConnectionClosed(_)));
}

#[test]
fn test_invalid_utf8_is_reported_on_text_access() {
    let mut rx = reader(vec![0x02, 0xC3, 0x28, 0x00]);

    let sentence = read_sentence(&mut rx, 1024).unwrap();
    assert!(matches!(
        sentence.to_strings(),
        Err(ApiError::Protocol(ProtocolError::InvalidUtf8))
    ));
}

#[test]
fn test_display_masks_password() {
    let sentence = Sentence::from_words(["/login", "=name=admin", "=password=hunter2"]);
    let shown = sentence.to_string();
    assert!(!shown.contains("hunter2"));
    assert!(shown.starts_with("/login =name=admin"));
}
