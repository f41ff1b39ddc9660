//! Primitive framing over an ordered byte stream.
//!
//! All multi-byte values are big-endian. Strings are a 4-byte length header
//! followed by UTF-8 bytes; payloads are a string name, a 4-byte length
//! header and the raw bytes. Length headers are checked against their limit
//! before anything is allocated.

use licenselink_types::{Artifact, ErrorKind};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum encoded string length (64 KB).
pub const MAX_STRING_LEN: u32 = 64 * 1024;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("String too long: {size} bytes (max {max})")]
    StringTooLong { size: u32, max: u32 },
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u32 },
    #[error("Invalid UTF-8 in string frame")]
    InvalidUtf8,
    #[error("Invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl WireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WireError::Io(_) | WireError::ConnectionClosed | WireError::Timeout(_) => {
                ErrorKind::Io
            }
            _ => ErrorKind::Protocol,
        }
    }
}

fn map_io(e: std::io::Error) -> WireError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::ConnectionClosed
    } else {
        WireError::Io(e)
    }
}

async fn timed<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T, WireError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res.map_err(map_io),
            Err(_) => Err(WireError::Timeout(limit)),
        },
        None => fut.await.map_err(map_io),
    }
}

/// Append a length-prefixed string to `buf`.
pub fn encode_string(buf: &mut Vec<u8>, s: &str) -> Result<(), WireError> {
    let len = s.len();
    if len > MAX_STRING_LEN as usize {
        return Err(WireError::StringTooLong {
            size: len.min(u32::MAX as usize) as u32,
            max: MAX_STRING_LEN,
        });
    }
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// A byte stream speaking the licenselink primitives.
///
/// Each read or write is individually bounded by the configured timeout.
#[derive(Debug)]
pub struct WireStream<S> {
    inner: S,
    io_timeout: Option<Duration>,
    max_payload: u32,
}

impl<S> WireStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            io_timeout: None,
            max_payload: licenselink_types::config::DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    /// Bound every subsequent read and write by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn with_max_payload(mut self, max: u32) -> Self {
        self.max_payload = max;
        self
    }

    pub fn max_payload(&self) -> u32 {
        self.max_payload
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> WireStream<S> {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        let limit = self.io_timeout;
        let inner = &mut self.inner;
        timed(limit, async move {
            inner.write_all(bytes).await?;
            inner.flush().await
        })
        .await
    }

    pub async fn write_int(&mut self, value: i32) -> Result<(), WireError> {
        self.send(&value.to_be_bytes()).await
    }

    pub async fn read_int(&mut self) -> Result<i32, WireError> {
        let limit = self.io_timeout;
        timed(limit, self.inner.read_i32()).await
    }

    pub async fn write_bool(&mut self, value: bool) -> Result<(), WireError> {
        self.send(&[value as u8]).await
    }

    pub async fn read_bool(&mut self) -> Result<bool, WireError> {
        let limit = self.io_timeout;
        match timed(limit, self.inner.read_u8()).await? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }

    pub async fn write_string(&mut self, s: &str) -> Result<(), WireError> {
        let mut buf = Vec::with_capacity(4 + s.len());
        encode_string(&mut buf, s)?;
        self.send(&buf).await
    }

    pub async fn read_string(&mut self) -> Result<String, WireError> {
        let limit = self.io_timeout;
        let len = timed(limit, self.inner.read_u32()).await?;
        if len > MAX_STRING_LEN {
            return Err(WireError::StringTooLong {
                size: len,
                max: MAX_STRING_LEN,
            });
        }
        let mut body = vec![0u8; len as usize];
        timed(limit, self.inner.read_exact(&mut body)).await?;
        String::from_utf8(body).map_err(|_| WireError::InvalidUtf8)
    }

    /// Write a length-prefixed byte blob.
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        if bytes.len() as u64 > self.max_payload as u64 {
            return Err(WireError::PayloadTooLarge {
                size: bytes.len() as u64,
                max: self.max_payload,
            });
        }
        self.send(&(bytes.len() as u32).to_be_bytes()).await?;
        self.send(bytes).await
    }

    /// Read a length-prefixed byte blob.
    pub async fn read_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let limit = self.io_timeout;
        let len = timed(limit, self.inner.read_u32()).await?;
        if len > self.max_payload {
            return Err(WireError::PayloadTooLarge {
                size: len as u64,
                max: self.max_payload,
            });
        }
        let mut body = vec![0u8; len as usize];
        timed(limit, self.inner.read_exact(&mut body)).await?;
        Ok(body)
    }

    /// Write a named payload (entry name, then the blob).
    pub async fn write_payload(&mut self, artifact: &Artifact) -> Result<(), WireError> {
        self.write_string(&artifact.name).await?;
        self.write_bytes(&artifact.bytes).await
    }

    pub async fn read_payload(&mut self) -> Result<Artifact, WireError> {
        let name = self.read_string().await?;
        let bytes = self.read_bytes().await?;
        Ok(Artifact { name, bytes })
    }
}
