//! Transport
//!
//! Owns the byte stream to the device. No protocol knowledge lives here.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{ApiError, Result};

/// Receive side of a byte stream
pub trait WireRead {
    /// Fill `buf`, looping over short reads
    ///
    /// Returns the number of bytes stored; a count below `buf.len()` means
    /// the peer closed. A read timeout is `ApiError::Timeout` whether or not
    /// some bytes had already arrived; those bytes are discarded.
    fn recv_into(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read exactly `n` bytes
    ///
    /// A close before that is `ConnectionClosed`, a stall is `Timeout`.
    fn recv_exact(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        let got = self.recv_into(&mut buf)?;
        if got < n {
            return Err(ApiError::ConnectionClosed(format!(
                "peer closed after {} of {} bytes",
                got, n
            )));
        }
        Ok(Bytes::from(buf))
    }
}

/// Send side of a byte stream
pub trait WireWrite {
    /// Write all of `bytes` and flush
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

// =============================================================================
// Receive Half
// =============================================================================

/// Buffered receive half
pub struct TransportReader {
    inner: BufReader<Box<dyn Read + Send>>,

    /// Socket handle for timeout changes
    socket: Option<TcpStream>,
}

impl TransportReader {
    /// Wrap any reader (in-memory streams, pipes)
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: BufReader::new(Box::new(reader)),
            socket: None,
        }
    }

    fn from_socket(stream: TcpStream) -> Result<Self> {
        let handle = stream.try_clone()?;
        Ok(Self {
            inner: BufReader::new(Box::new(stream)),
            socket: Some(handle),
        })
    }

    /// Change the per-read timeout (`None` blocks forever)
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        if let Some(socket) = &self.socket {
            socket.set_read_timeout(timeout)?;
        }
        Ok(())
    }
}

impl WireRead for TransportReader {
    fn recv_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let err = ApiError::from_io(e);
                    if filled > 0 && matches!(err, ApiError::Timeout) {
                        tracing::debug!("Read stalled after {} of {} bytes", filled, buf.len());
                    }
                    return Err(err);
                }
            }
        }

        Ok(filled)
    }
}

// =============================================================================
// Send Half
// =============================================================================

/// Buffered send half
pub struct TransportWriter {
    inner: BufWriter<Box<dyn Write + Send>>,

    /// Socket handle for shutdown
    socket: Option<TcpStream>,
}

impl TransportWriter {
    /// Wrap any writer (in-memory streams, pipes)
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: BufWriter::new(Box::new(writer)),
            socket: None,
        }
    }

    fn from_socket(stream: TcpStream) -> Result<Self> {
        let handle = stream.try_clone()?;
        Ok(Self {
            inner: BufWriter::new(Box::new(stream)),
            socket: Some(handle),
        })
    }

    /// Shut the socket down in both directions
    pub fn shutdown(&self) {
        shutdown_socket(self.socket.as_ref());
    }

    /// A handle that can shut the socket down while this half is in use
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        let socket = match &self.socket {
            Some(socket) => Some(socket.try_clone()?),
            None => None,
        };
        Ok(ShutdownHandle { socket })
    }
}

/// Closes the connection from any thread, unblocking a parked reader
#[derive(Debug)]
pub struct ShutdownHandle {
    socket: Option<TcpStream>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        shutdown_socket(self.socket.as_ref());
    }
}

fn shutdown_socket(socket: Option<&TcpStream>) {
    if let Some(socket) = socket {
        if let Err(e) = socket.shutdown(Shutdown::Both) {
            tracing::debug!("Socket shutdown: {}", e);
        }
    }
}

impl WireWrite for TransportWriter {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(ApiError::from_io)?;
        self.inner.flush().map_err(ApiError::from_io)?;
        Ok(())
    }
}

// =============================================================================
// Transport
// =============================================================================

/// A connected byte stream, split into buffered halves
pub struct Transport {
    reader: TransportReader,
    writer: TransportWriter,

    /// Peer address for logging
    peer_addr: String,
}

impl Transport {
    /// Open a TCP connection using the endpoint and timeouts in `config`
    ///
    /// Every resolved address is tried in turn with the connect timeout.
    pub fn connect(config: &Config) -> Result<Self> {
        let addr = config.addr();
        let mut last_err = None;

        for socket_addr in addr.to_socket_addrs()? {
            tracing::debug!("Connecting to {}", socket_addr);
            match TcpStream::connect_timeout(&socket_addr, config.connect_timeout()) {
                Ok(stream) => return Self::from_tcp(stream, config),
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", socket_addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => ApiError::from_io(e),
            None => ApiError::Config(format!("{} did not resolve to any address", addr)),
        })
    }

    /// Wrap an already connected socket
    pub fn from_tcp(stream: TcpStream, config: &Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm: sentences are small and latency bound
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: TransportReader::from_socket(read_stream)?,
            writer: TransportWriter::from_socket(write_stream)?,
            peer_addr,
        })
    }

    /// Build from arbitrary halves, e.g. in-memory buffers
    pub fn from_parts(reader: TransportReader, writer: TransportWriter) -> Self {
        Self {
            reader,
            writer,
            peer_addr: "in-memory".to_string(),
        }
    }

    /// Split into independently owned halves
    pub fn split(self) -> (TransportReader, TransportWriter) {
        (self.reader, self.writer)
    }

    /// Shut the underlying socket down
    pub fn shutdown(&self) {
        self.writer.shutdown();
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader.set_read_timeout(timeout)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

impl WireRead for Transport {
    fn recv_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.recv_into(buf)
    }
}

impl WireWrite for Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.send(bytes)
    }
}
