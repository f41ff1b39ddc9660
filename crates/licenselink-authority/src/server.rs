//! SoftwareHouse: TCP front end of a license authority.
//!
//! A [`SoftwareHouse`] binds a listener and serves each accepted connection
//! on its own task. A connection carries exactly one exchange, selected by
//! its opening command:
//!
//! - `REQ`: issue licenses to a Developer
//! - `VER`: verify a wrapped license, release the compiled artifact and
//!   commit consumption once the redeemer confirms delivery
//!
//! A failed exchange is logged once here and never stops the accept loop.

use crate::authority::LicenseAuthority;
use crate::error::{AuthorityError, AuthorityResult};
use licenselink_types::config::SwhConfig;
use licenselink_wire::{Command, IssuedLicense, LicenseRequest, VerifyRequest, WireStream};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// A running Software House endpoint.
pub struct SoftwareHouse {
    authority: Arc<LicenseAuthority>,
    local_addr: SocketAddr,
    io_timeout: Duration,
    max_payload: u32,
}

impl SoftwareHouse {
    /// Bind the configured address and start accepting connections.
    ///
    /// Libraries must already be registered with `authority`.
    pub async fn start(
        config: &SwhConfig,
        authority: Arc<LicenseAuthority>,
    ) -> AuthorityResult<(Arc<Self>, tokio::task::JoinHandle<()>)> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        authority.set_issuer(local_addr.to_string());

        info!(
            "SWH: listening on {} ({} libraries)",
            local_addr,
            authority.library_count()
        );

        let node = Arc::new(Self {
            authority,
            local_addr,
            io_timeout: config.io_timeout(),
            max_payload: config.max_payload_bytes,
        });

        let node_clone = Arc::clone(&node);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, node_clone).await;
        });

        Ok((node, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn authority(&self) -> &Arc<LicenseAuthority> {
        &self.authority
    }

    async fn accept_loop(listener: TcpListener, node: Arc<SoftwareHouse>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("SWH: accepted connection from {}", addr);
                    let node = Arc::clone(&node);
                    tokio::spawn(async move {
                        match node.handle_connection(stream, addr).await {
                            Ok(()) => debug!("SWH: connection from {} complete", addr),
                            Err(e) => warn!(
                                peer = %addr,
                                kind = %e.kind(),
                                error = %e,
                                "SWH: exchange failed"
                            ),
                        }
                    });
                }
                Err(e) => {
                    error!("SWH: accept error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> AuthorityResult<()> {
        stream.set_nodelay(true)?;
        let mut wire = WireStream::new(stream)
            .with_timeout(self.io_timeout)
            .with_max_payload(self.max_payload);
        serve_exchange(&self.authority, &mut wire, &addr.to_string()).await
    }
}

/// Serve one exchange on an accepted stream.
pub async fn serve_exchange<S>(
    authority: &LicenseAuthority,
    wire: &mut WireStream<S>,
    peer: &str,
) -> AuthorityResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match Command::read_from(wire).await? {
        Command::Request => handle_license_request(authority, wire, peer).await,
        Command::Verify => handle_verify(authority, wire, peer).await,
    }
}

/// `REQ`: reply with the issued `(token, wrapped_token)` pairs, or `-1`.
async fn handle_license_request<S>(
    authority: &LicenseAuthority,
    wire: &mut WireStream<S>,
    peer: &str,
) -> AuthorityResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = LicenseRequest::read_from(wire).await?;
    debug!(
        peer,
        library = %request.library,
        count = request.count,
        "license request"
    );

    let licenses = match authority.generate_licenses(&request.library, request.count, peer) {
        Ok(licenses) => licenses,
        Err(e) => {
            wire.write_int(-1).await?;
            return Err(e);
        }
    };

    wire.write_int(licenses.len() as i32).await?;
    for license in licenses {
        IssuedLicense {
            token: license.token,
            wrapped_token: license.wrapped_token,
        }
        .write_to(wire)
        .await?;
    }
    Ok(())
}

/// `VER`: `false`, or `true` + artifact followed by the redeemer's confirmation.
async fn handle_verify<S>(
    authority: &LicenseAuthority,
    wire: &mut WireStream<S>,
    peer: &str,
) -> AuthorityResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = VerifyRequest::read_from(wire).await?;
    debug!(peer, identity = %request.identity, "verify request");

    let redemption = match authority.verify_and_redeem(&request.wrapped_token, &request.identity)
    {
        Ok(redemption) => redemption,
        Err(e) => {
            wire.write_bool(false).await?;
            return Err(e);
        }
    };

    let artifact = match authority.compile(redemption.library_id()).await {
        Ok(artifact) => artifact,
        Err(e) => {
            wire.write_bool(false).await?;
            return Err(e);
        }
    };

    wire.write_bool(true).await?;
    wire.write_payload(&artifact).await?;

    if wire.read_bool().await? {
        let license = redemption.commit();
        info!(
            peer,
            identity = %request.identity,
            library = %license.library_id,
            bytes = artifact.bytes.len(),
            "SWH: artifact delivered"
        );
        Ok(())
    } else {
        Err(AuthorityError::DeliveryRejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PrebuiltCompiler;
    use crate::crypto::tests::test_keys;
    use crate::crypto::KeyPair;
    use licenselink_types::ErrorKind;
    use tokio::io::duplex;

    fn authority_with_library() -> (Arc<LicenseAuthority>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Core.class");
        std::fs::write(&source, b"\xCA\xFE\xBA\xBE core").unwrap();
        let authority = LicenseAuthority::new(
            KeyPair::from_private(test_keys().private().clone()),
            Arc::new(PrebuiltCompiler),
        );
        authority.register("acme.lib.Core", source);
        (Arc::new(authority), dir)
    }

    async fn issue_one(authority: &Arc<LicenseAuthority>) -> IssuedLicense {
        let (client, server) = duplex(64 * 1024);
        let authority_clone = Arc::clone(authority);
        let task = tokio::spawn(async move {
            let mut wire = WireStream::new(server);
            serve_exchange(&authority_clone, &mut wire, "dev").await
        });
        let mut client = WireStream::new(client);
        Command::Request.write_to(&mut client).await.unwrap();
        LicenseRequest {
            library: "acme.lib.Core".to_string(),
            count: 1,
        }
        .write_to(&mut client)
        .await
        .unwrap();
        assert_eq!(client.read_int().await.unwrap(), 1);
        let issued = IssuedLicense::read_from(&mut client).await.unwrap();
        task.await.unwrap().unwrap();
        issued
    }

    #[tokio::test]
    async fn test_request_refused_for_unknown_library() {
        let (authority, _dir) = authority_with_library();
        let (client, server) = duplex(4096);
        let authority_clone = Arc::clone(&authority);
        let task = tokio::spawn(async move {
            let mut wire = WireStream::new(server);
            serve_exchange(&authority_clone, &mut wire, "dev").await
        });

        let mut client = WireStream::new(client);
        Command::Request.write_to(&mut client).await.unwrap();
        LicenseRequest {
            library: "acme.lib.Missing".to_string(),
            count: 2,
        }
        .write_to(&mut client)
        .await
        .unwrap();
        assert_eq!(client.read_int().await.unwrap(), -1);

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LibUnknown);
        assert_eq!(authority.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_verify_commits_only_after_confirmation() {
        let (authority, _dir) = authority_with_library();
        let issued = issue_one(&authority).await;

        let (client, server) = duplex(64 * 1024);
        let authority_clone = Arc::clone(&authority);
        let task = tokio::spawn(async move {
            let mut wire = WireStream::new(server);
            serve_exchange(&authority_clone, &mut wire, "linker").await
        });

        let mut client = WireStream::new(client);
        Command::Verify.write_to(&mut client).await.unwrap();
        VerifyRequest {
            wrapped_token: issued.wrapped_token.clone(),
            identity: "dev".to_string(),
        }
        .write_to(&mut client)
        .await
        .unwrap();
        assert!(client.read_bool().await.unwrap());
        let artifact = client.read_payload().await.unwrap();
        assert_eq!(artifact.name, "acme/lib/Core.class");
        assert_eq!(artifact.bytes, b"\xCA\xFE\xBA\xBE core");

        // Still in flight until we confirm.
        assert!(!authority.is_outstanding(&issued.token));
        client.write_bool(true).await.unwrap();
        task.await.unwrap().unwrap();
        assert!(!authority.is_outstanding(&issued.token));
        assert_eq!(authority.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_rejected_confirmation_restores_license() {
        let (authority, _dir) = authority_with_library();
        let issued = issue_one(&authority).await;

        let (client, server) = duplex(64 * 1024);
        let authority_clone = Arc::clone(&authority);
        let task = tokio::spawn(async move {
            let mut wire = WireStream::new(server);
            serve_exchange(&authority_clone, &mut wire, "linker").await
        });

        let mut client = WireStream::new(client);
        Command::Verify.write_to(&mut client).await.unwrap();
        VerifyRequest {
            wrapped_token: issued.wrapped_token.clone(),
            identity: "dev".to_string(),
        }
        .write_to(&mut client)
        .await
        .unwrap();
        assert!(client.read_bool().await.unwrap());
        client.read_payload().await.unwrap();
        client.write_bool(false).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthorityError::DeliveryRejected));
        assert!(authority.is_outstanding(&issued.token));
    }

    #[tokio::test]
    async fn test_lost_confirmation_restores_license() {
        let (authority, _dir) = authority_with_library();
        let issued = issue_one(&authority).await;

        let (client, server) = duplex(64 * 1024);
        let authority_clone = Arc::clone(&authority);
        let task = tokio::spawn(async move {
            let mut wire = WireStream::new(server);
            serve_exchange(&authority_clone, &mut wire, "linker").await
        });

        let mut client = WireStream::new(client);
        Command::Verify.write_to(&mut client).await.unwrap();
        VerifyRequest {
            wrapped_token: issued.wrapped_token.clone(),
            identity: "dev".to_string(),
        }
        .write_to(&mut client)
        .await
        .unwrap();
        assert!(client.read_bool().await.unwrap());
        client.read_payload().await.unwrap();
        drop(client);

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(authority.is_outstanding(&issued.token));
    }

    #[tokio::test]
    async fn test_invalid_license_gets_false() {
        let (authority, _dir) = authority_with_library();
        let (client, server) = duplex(4096);
        let authority_clone = Arc::clone(&authority);
        let task = tokio::spawn(async move {
            let mut wire = WireStream::new(server);
            serve_exchange(&authority_clone, &mut wire, "linker").await
        });

        let mut client = WireStream::new(client);
        Command::Verify.write_to(&mut client).await.unwrap();
        VerifyRequest {
            wrapped_token: "00".repeat(256),
            identity: "dev".to_string(),
        }
        .write_to(&mut client)
        .await
        .unwrap();
        assert!(!client.read_bool().await.unwrap());
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLicense);
    }

    #[tokio::test]
    async fn test_tcp_server_survives_bad_client() {
        let (authority, _dir) = authority_with_library();
        let config = SwhConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..SwhConfig::default()
        };
        let (node, _task) = SoftwareHouse::start(&config, authority).await.unwrap();
        assert_eq!(node.authority().issuer(), node.local_addr().to_string());

        // Unknown command, then a well-formed request on a fresh connection.
        let stream = TcpStream::connect(node.local_addr()).await.unwrap();
        let mut bad = WireStream::new(stream);
        bad.write_string("DEL").await.unwrap();
        drop(bad);

        let stream = TcpStream::connect(node.local_addr()).await.unwrap();
        let mut good = WireStream::new(stream);
        Command::Request.write_to(&mut good).await.unwrap();
        LicenseRequest {
            library: "acme.lib.Core".to_string(),
            count: 2,
        }
        .write_to(&mut good)
        .await
        .unwrap();
        assert_eq!(good.read_int().await.unwrap(), 2);
        let first = IssuedLicense::read_from(&mut good).await.unwrap();
        let second = IssuedLicense::read_from(&mut good).await.unwrap();
        assert_ne!(first.token, second.token);
    }
}
