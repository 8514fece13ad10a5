//! Transport Tests
//!
//! Tests for exact reads, full writes and error classification.

#[path = "../common/mod.rs"]
mod common;

use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use common::SharedBuf;
use tikapi::network::{Transport, TransportReader, TransportWriter, WireRead, WireWrite};
use tikapi::{ApiError, Config};

// =============================================================================
// In-memory Tests
// =============================================================================

#[test]
fn test_recv_exact_returns_requested_bytes() {
    let mut reader = TransportReader::new(Cursor::new(b"abcdef".to_vec()));

    assert_eq!(&reader.recv_exact(2).unwrap()[..], b"ab");
    assert_eq!(&reader.recv_exact(4).unwrap()[..], b"cdef");
}

#[test]
fn test_recv_exact_after_close() {
    let mut reader = TransportReader::new(Cursor::new(b"abc".to_vec()));

    let err = reader.recv_exact(5).unwrap_err();
    assert!(matches!(err, ApiError::ConnectionClosed(_)));
}

#[test]
fn test_recv_into_reports_short_count() {
    let mut reader = TransportReader::new(Cursor::new(b"abc".to_vec()));
    let mut buf = [0u8; 8];

    assert_eq!(reader.recv_into(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"abc");
}

#[test]
fn test_send_writes_everything() {
    let sent = SharedBuf::default();
    let mut writer = TransportWriter::new(sent.clone());

    writer.send(b"hello ").unwrap();
    writer.send(b"world").unwrap();

    assert_eq!(sent.contents(), b"hello world");
}

// =============================================================================
// TCP Tests
// =============================================================================

fn loopback_config(port: u16) -> Config {
    Config::builder()
        .host("127.0.0.1")
        .port(port)
        .connect_timeout_ms(1_000)
        .read_timeout_ms(200)
        .write_timeout_ms(1_000)
        .build()
}

#[test]
fn test_tcp_send_and_receive() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        stream.write_all(b"pong").unwrap();
    });

    let mut transport = Transport::connect(&loopback_config(port)).unwrap();
    assert!(transport.peer_addr().starts_with("127.0.0.1:"));

    transport.send(b"ping").unwrap();
    assert_eq!(&transport.recv_exact(4).unwrap()[..], b"pong");

    peer.join().unwrap();
}

#[test]
fn test_tcp_read_timeout_is_distinct() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let peer = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_millis(600));
        drop(stream);
    });

    let mut transport = Transport::connect(&loopback_config(port)).unwrap();
    let err = transport.recv_exact(1).unwrap_err();
    assert!(matches!(err, ApiError::Timeout), "got {:?}", err);

    peer.join().unwrap();
}

#[test]
fn test_tcp_stall_after_partial_bytes_is_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"ab").unwrap();
        thread::sleep(Duration::from_millis(800));
        drop(stream);
    });

    let mut transport = Transport::connect(&loopback_config(port)).unwrap();
    let err = transport.recv_exact(3).unwrap_err();
    assert!(matches!(err, ApiError::Timeout), "got {:?}", err);

    peer.join().unwrap();
}

#[test]
fn test_tcp_peer_close_is_connection_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"ab").unwrap();
    });

    let mut transport = Transport::connect(&loopback_config(port)).unwrap();
    peer.join().unwrap();

    let err = transport.recv_exact(3).unwrap_err();
    assert!(matches!(err, ApiError::ConnectionClosed(_)), "got {:?}", err);
}

#[test]
fn test_connect_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = Transport::connect(&loopback_config(port));
    assert!(result.is_err());
}
