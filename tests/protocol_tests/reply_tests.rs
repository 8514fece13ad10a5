//! Reply Classification Tests

use tikapi::protocol::{Reply, ReplyKind, Sentence};
use tikapi::{ApiError, ProtocolError};

fn parse(words: &[&str]) -> Reply {
    Reply::parse(&Sentence::from_words(words)).unwrap()
}

#[test]
fn test_re_with_attributes_and_tag() {
    let reply = parse(&["!re", "=name=MyRouter", "=disabled=false", ".tag=5"]);

    assert_eq!(reply.kind, ReplyKind::Re);
    assert_eq!(reply.tag, Some(5));
    assert_eq!(reply.attributes.len(), 2);
    assert_eq!(reply.attributes["name"], "MyRouter");
    assert_eq!(reply.attributes["disabled"], "false");
    assert!(!reply.is_terminal());
}

#[test]
fn test_value_may_contain_equals() {
    let reply = parse(&["!re", "=comment=a=b=c"]);
    assert_eq!(reply.attributes["comment"], "a=b=c");
}

#[test]
fn test_attribute_without_value() {
    let reply = parse(&["!re", "=dynamic"]);
    assert_eq!(reply.attributes["dynamic"], "");
}

#[test]
fn test_done_with_ret() {
    let reply = parse(&["!done", "=ret=*1A"]);

    assert_eq!(reply.kind, ReplyKind::Done);
    assert!(reply.is_terminal());
    assert_eq!(reply.attributes["ret"], "*1A");
}

#[test]
fn test_trap_becomes_device_error() {
    let reply = parse(&["!trap", "=category=1", "=message=no such command", ".tag=3"]);

    assert_eq!(reply.kind, ReplyKind::Trap);
    assert!(reply.is_terminal());
    assert_eq!(reply.tag, Some(3));

    let err = reply.into_device_error();
    assert_eq!(err.message, "no such command");
    assert_eq!(err.category, Some(1));
}

#[test]
fn test_trap_without_message() {
    let err = parse(&["!trap"]).into_device_error();
    assert_eq!(err.message, "unknown device error");
    assert_eq!(err.category, None);
}

#[test]
fn test_fatal_reason_from_bare_word() {
    let reply = parse(&["!fatal", "session terminated on request"]);

    assert_eq!(reply.kind, ReplyKind::Fatal);
    assert!(!reply.is_terminal());
    assert_eq!(reply.reason(), "session terminated on request");
}

#[test]
fn test_unknown_reply_word() {
    let reply = parse(&["!empty"]);
    assert_eq!(reply.kind, ReplyKind::Unknown("!empty".to_string()));
}

#[test]
fn test_empty_sentence() {
    let reply = Reply::parse(&Sentence::new()).unwrap();
    assert_eq!(reply.kind, ReplyKind::Empty);
}

#[test]
fn test_api_attributes_are_kept_apart() {
    let reply = parse(&["!re", ".section=2", ".tag=abc", "=name=x"]);

    assert_eq!(reply.tag, None);
    assert_eq!(reply.api_attributes["section"], "2");
    assert_eq!(reply.api_attributes["tag"], "abc");
    assert_eq!(reply.attributes["name"], "x");
}

#[test]
fn test_invalid_utf8_is_protocol_error() {
    let sentence = Sentence::from_words([&b"!re"[..], &[b'=', 0xFF, b'=', b'x'][..]]);
    let err = Reply::parse(&sentence).unwrap_err();
    assert!(matches!(err, ApiError::Protocol(ProtocolError::InvalidUtf8)));
}

#[test]
fn test_expect_kind() {
    let reply = parse(&["!done"]);
    assert!(reply.expect_kind(ReplyKind::Done).is_ok());
    assert!(matches!(
        reply.expect_kind(ReplyKind::Re),
        Err(ApiError::Protocol(ProtocolError::UnexpectedReply(_)))
    ));
}
