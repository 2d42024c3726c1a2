//! Connection configuration and the byte-exact transport.

use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use megapose_protocol::frame::{Frame, FrameHeader, FRAME_HEADER_SIZE};
use megapose_protocol::{ProtocolError, DEFAULT_PORT};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default payload ceiling for received frames (256 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

/// Smallest accepted payload ceiling (64 KiB).
pub const MIN_MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host, a literal IP or a resolvable name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connection timeout. `None` blocks until the OS gives up.
    pub connect_timeout: Option<Duration>,
    /// Deadline for each socket read and write. `None` blocks indefinitely.
    pub request_timeout: Option<Duration>,
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
    /// Largest payload accepted from the server.
    pub max_payload_size: u32,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Some(Duration::from_secs(10)),
            request_timeout: None,
            nodelay: true,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Configuration for a server on this machine at its default port.
    pub fn localhost() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = non_zero(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = non_zero(timeout);
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size.max(MIN_MAX_PAYLOAD_SIZE);
        self
    }

    /// Resolves `host:port` to a socket address.
    pub fn resolve(&self) -> Result<SocketAddr, ClientError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ClientError::invalid("empty host"));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        (host, self.port)
            .to_socket_addrs()
            .map_err(|e| ClientError::invalid(format!("invalid address {}: {}", host, e)))?
            .next()
            .ok_or_else(|| ClientError::invalid(format!("no address found for {}", host)))
    }
}

/// Socket timeouts reject a zero duration; treat it as "no deadline".
fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

fn map_io(err: io::Error) -> ClientError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ClientError::Timeout,
        io::ErrorKind::UnexpectedEof => ClientError::ConnectionClosed,
        _ => ClientError::Io(err),
    }
}

/// Byte-exact stream over one connection.
///
/// Reads never return short: either the requested count arrives or the call
/// fails. Generic over the stream so tests can substitute in-memory pipes.
pub struct Transport<S = TcpStream> {
    stream: Option<S>,
}

impl Transport<TcpStream> {
    /// Opens a TCP connection as described by `config`.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let addr = config.resolve()?;
        tracing::debug!("Connecting to {}...", addr);

        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| {
            tracing::debug!("Connection to {} failed: {}", addr, e);
            map_io(e)
        })?;

        stream.set_nodelay(config.nodelay)?;
        stream.set_read_timeout(config.request_timeout)?;
        stream.set_write_timeout(config.request_timeout)?;

        tracing::debug!("TCP connected to {}", addr);
        Ok(Self::from_stream(stream))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Shuts the socket down in both directions and releases it.
    pub fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            tracing::debug!("Shutting down socket");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl<S: Read + Write> Transport<S> {
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> Result<&mut S, ClientError> {
        self.stream.as_mut().ok_or(ClientError::NotConnected)
    }

    /// Reads exactly `n` bytes.
    pub fn read_exact(&mut self, n: usize) -> Result<BytesMut, ClientError> {
        let stream = self.stream()?;
        let mut buf = BytesMut::zeroed(n);
        let mut filled = 0;
        while filled < n {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    tracing::debug!("Peer closed after {} of {} bytes", filled, n);
                    return Err(ClientError::ConnectionClosed);
                }
                Ok(read) => filled += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io(e)),
            }
        }
        Ok(buf)
    }

    /// Writes every byte of `bytes`.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let stream = self.stream()?;
        let mut written = 0;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(ClientError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    )))
                }
                Ok(sent) => written += sent,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io(e)),
            }
        }
        stream.flush().map_err(map_io)
    }

    /// Reads and parses one frame header.
    pub fn read_header(&mut self) -> Result<FrameHeader, ClientError> {
        let length = self.read_exact(4)?;
        let tag = self.read_exact(4)?;
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        raw[..4].copy_from_slice(&length);
        raw[4..].copy_from_slice(&tag);
        Ok(FrameHeader::parse(&raw))
    }

    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let encoded = frame.encode()?;
        self.write_all(&encoded)
    }

    /// Reads one complete frame, refusing payloads above `max_payload`.
    pub fn recv_frame(&mut self, max_payload: u32) -> Result<Frame, ClientError> {
        let (header, payload) = self.recv_raw(max_payload)?;
        Ok(Frame::new(header.code, payload))
    }

    /// Reads one complete frame and keeps its header, including the raw tag.
    pub fn recv_raw(&mut self, max_payload: u32) -> Result<(FrameHeader, Bytes), ClientError> {
        let header = self.read_header()?;
        if header.length > max_payload {
            return Err(ProtocolError::FrameTooLarge {
                size: u64::from(header.length),
                max: u64::from(max_payload),
            }
            .into());
        }
        let payload = self.read_exact(header.length as usize)?;
        Ok((header, payload.freeze()))
    }

    /// Releases the stream. Safe to call more than once.
    pub fn close(&mut self) {
        self.stream = None;
    }
}
