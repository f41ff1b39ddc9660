//! Outbound connections to Software Houses.

use async_trait::async_trait;
use licenselink_wire::{BoxedTransport, WireError};
use std::time::Duration;

/// Opens the connection a session uses to redeem one dependency.
#[async_trait]
pub trait SwhConnector: Send + Sync + 'static {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedTransport, WireError>;
}

/// Plain TCP with a bounded connect time.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl SwhConnector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedTransport, WireError> {
        let stream = licenselink_wire::connect(host, port, self.timeout).await?;
        Ok(Box::new(stream))
    }
}
