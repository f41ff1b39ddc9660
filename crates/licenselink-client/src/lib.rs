//! Developer-side client.
//!
//! Speaks both conversations a Developer takes part in: `REQ`/`VER`
//! exchanges with a Software House, and link sessions with a Linker.

use licenselink_types::config::DEFAULT_MAX_PAYLOAD_BYTES;
use licenselink_types::{Artifact, ErrorKind};
use licenselink_wire::{
    Command, DependencyDecl, IssuedLicense, LicenseRequest, VerifyRequest, WireError, WireStream,
};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Errors seen by a Developer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The Software House refused to issue licenses.
    #[error("License request for {library} refused")]
    Refused { library: String },

    /// The Software House would not redeem the license.
    #[error("Invalid license")]
    InvalidLicense,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Wire(e) => e.kind(),
            ClientError::Refused { .. } => ErrorKind::LibUnknown,
            ClientError::InvalidLicense => ErrorKind::InvalidLicense,
            ClientError::Protocol(_) => ErrorKind::Protocol,
        }
    }
}

/// Everything a Developer sends to open a link session.
#[derive(Debug, Clone, Default)]
pub struct LinkRequest {
    /// `Main-Class` of the archive, dotted or as a class file path.
    pub entry_point: String,
    pub dependencies: Vec<DependencyDecl>,
    pub files: Vec<Artifact>,
}

/// How a link session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The finished archive.
    Delivered(Artifact),
    /// The dependency at `index` could not be redeemed; nothing was linked.
    DependencyRejected { index: usize },
    /// The Linker aborted after the redemption phase.
    Rejected,
}

/// Connection settings for a Developer.
#[derive(Debug, Clone)]
pub struct DeveloperClient {
    io_timeout: Duration,
    connect_timeout: Duration,
    max_payload: u32,
}

impl Default for DeveloperClient {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_payload: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl DeveloperClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_payload(mut self, max: u32) -> Self {
        self.max_payload = max;
        self
    }

    async fn open(&self, host: &str, port: u16) -> Result<WireStream<TcpStream>, ClientError> {
        let stream = licenselink_wire::connect(host, port, self.connect_timeout).await?;
        Ok(WireStream::new(stream)
            .with_timeout(self.io_timeout)
            .with_max_payload(self.max_payload))
    }

    /// Ask a Software House for `count` licenses on `library`.
    pub async fn request_licenses(
        &self,
        host: &str,
        port: u16,
        library: &str,
        count: i32,
    ) -> Result<Vec<IssuedLicense>, ClientError> {
        let mut swh = self.open(host, port).await?;
        Command::Request.write_to(&mut swh).await?;
        LicenseRequest {
            library: library.to_string(),
            count,
        }
        .write_to(&mut swh)
        .await?;

        let issued = swh.read_int().await?;
        if issued == -1 {
            return Err(ClientError::Refused {
                library: library.to_string(),
            });
        }
        if issued < 0 || issued != count {
            return Err(ClientError::Protocol(format!(
                "asked for {count} licenses, SWH announced {issued}"
            )));
        }

        let mut licenses = Vec::with_capacity(issued as usize);
        for _ in 0..issued {
            licenses.push(IssuedLicense::read_from(&mut swh).await?);
        }
        info!(library, count = licenses.len(), "licenses received");
        Ok(licenses)
    }

    /// Redeem a wrapped license directly and confirm receipt.
    pub async fn redeem(
        &self,
        host: &str,
        port: u16,
        wrapped_token: &str,
        identity: &str,
    ) -> Result<Artifact, ClientError> {
        let mut swh = self.open(host, port).await?;
        Command::Verify.write_to(&mut swh).await?;
        VerifyRequest {
            wrapped_token: wrapped_token.to_string(),
            identity: identity.to_string(),
        }
        .write_to(&mut swh)
        .await?;

        if !swh.read_bool().await? {
            return Err(ClientError::InvalidLicense);
        }
        let artifact = swh.read_payload().await?;
        swh.write_bool(true).await?;
        debug!(entry = %artifact.name, bytes = artifact.bytes.len(), "artifact redeemed");
        Ok(artifact)
    }

    /// Run one link session.
    ///
    /// Dependencies are sent one at a time and each waits for its flag, so
    /// a rejection stops the upload before the remaining declarations.
    pub async fn link(
        &self,
        host: &str,
        port: u16,
        request: &LinkRequest,
    ) -> Result<LinkOutcome, ClientError> {
        let mut linker = self.open(host, port).await?;
        linker.write_string(&request.entry_point).await?;
        linker.write_int(count(request.dependencies.len())?).await?;

        for (index, dependency) in request.dependencies.iter().enumerate() {
            dependency.write_to(&mut linker).await?;
            if !linker.read_bool().await? {
                // Phase flag follows; the outcome is already known.
                if let Err(e) = linker.read_bool().await {
                    debug!(index, error = %e, "phase flag not received");
                }
                info!(index, host = %dependency.host, "dependency rejected");
                return Ok(LinkOutcome::DependencyRejected { index });
            }
        }
        if !linker.read_bool().await? {
            return Ok(LinkOutcome::Rejected);
        }

        linker.write_int(count(request.files.len())?).await?;
        for file in &request.files {
            linker.write_payload(file).await?;
        }

        if !linker.read_bool().await? {
            return Ok(LinkOutcome::Rejected);
        }
        let archive = linker.read_payload().await?;
        info!(name = %archive.name, bytes = archive.bytes.len(), "archive delivered");
        Ok(LinkOutcome::Delivered(archive))
    }
}

fn count(len: usize) -> Result<i32, ClientError> {
    i32::try_from(len).map_err(|_| ClientError::Protocol(format!("too many entries: {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_request_refused() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut wire = WireStream::new(stream);
            assert_eq!(Command::read_from(&mut wire).await.unwrap(), Command::Request);
            LicenseRequest::read_from(&mut wire).await.unwrap();
            wire.write_int(-1).await.unwrap();
        });

        let err = DeveloperClient::new()
            .request_licenses("127.0.0.1", port, "acme.lib.Missing", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Refused { .. }));
        assert_eq!(err.kind(), ErrorKind::LibUnknown);
    }

    #[tokio::test]
    async fn test_redeem_refused() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut wire = WireStream::new(stream);
            Command::read_from(&mut wire).await.unwrap();
            VerifyRequest::read_from(&mut wire).await.unwrap();
            wire.write_bool(false).await.unwrap();
        });

        let err = DeveloperClient::new()
            .redeem("127.0.0.1", port, "00ff", "dev")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidLicense));
    }

    #[tokio::test]
    async fn test_link_reports_rejected_dependency_index() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut wire = WireStream::new(stream);
            wire.read_string().await.unwrap();
            assert_eq!(wire.read_int().await.unwrap(), 2);
            DependencyDecl::read_from(&mut wire).await.unwrap();
            wire.write_bool(true).await.unwrap();
            DependencyDecl::read_from(&mut wire).await.unwrap();
            wire.write_bool(false).await.unwrap();
            wire.write_bool(false).await.unwrap();
        });

        let dependency = DependencyDecl {
            host: "127.0.0.1".to_string(),
            port: 7400,
            wrapped_token: "00ff".to_string(),
        };
        let request = LinkRequest {
            entry_point: "app.Main".to_string(),
            dependencies: vec![dependency.clone(), dependency],
            files: vec![],
        };
        let outcome = DeveloperClient::new()
            .link("127.0.0.1", port, &request)
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::DependencyRejected { index: 1 });
    }

    #[tokio::test]
    async fn test_connect_refused_is_io() {
        let (listener, port) = listener().await;
        drop(listener);
        let err = DeveloperClient::new()
            .with_connect_timeout(Duration::from_secs(1))
            .request_licenses("127.0.0.1", port, "acme.lib.Core", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
