//! Stream abstraction and bounded outbound connections.

use crate::codec::WireError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Any ordered, reliable byte stream a role can talk over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Type-erased transport, as returned by connectors.
pub type BoxedTransport = Box<dyn Transport>;

/// Open a TCP connection to `host:port`, giving up after `timeout`.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, WireError> {
    debug!(host, port, "connecting");
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(WireError::Io(e)),
        Err(_) => Err(WireError::Timeout(timeout)),
    }
}
