//! One Developer link session.
//!
//! Protocol, Developer side of the connection:
//!
//! 1. Developer sends the entry point (string) and the dependency count `N`.
//! 2. For each dependency the Developer sends a [`DependencyDecl`]; the
//!    Linker redeems it against the named Software House and answers one
//!    `bool`. The first `false` ends the session: the phase flag `false`
//!    follows and no later declaration is read.
//! 3. Phase flag: `true` when all `N` dependencies were redeemed.
//! 4. Developer sends the file count `M` and `M` payloads.
//! 5. Delivery flag: `true` followed by the archive payload, or `false`.
//!
//! Redemption against a Software House is `VER` + [`VerifyRequest`], then
//! `bool` (+ artifact payload), then the Linker's confirmation `bool`. The
//! identity forwarded is the Developer's address as seen by the Linker.

use crate::archive::ArchiveBuilder;
use crate::connector::SwhConnector;
use crate::error::{ArchiveError, SessionError};
use licenselink_types::config::LinkerConfig;
use licenselink_types::Artifact;
use licenselink_wire::{BoxedTransport, Command, DependencyDecl, VerifyRequest, WireStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// What a delivered session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub entry_point: String,
    pub dependencies: usize,
    pub files: usize,
    pub archive_bytes: usize,
}

/// A link session over one Developer connection.
pub struct LinkSession<S> {
    developer: WireStream<S>,
    identity: String,
    connector: Arc<dyn SwhConnector>,
    io_timeout: Duration,
    max_payload: u32,
    archive_dir: Option<PathBuf>,
}

impl<S> LinkSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// `identity` is the Developer's transport address.
    pub fn new(
        developer: S,
        identity: impl Into<String>,
        connector: Arc<dyn SwhConnector>,
        config: &LinkerConfig,
    ) -> Self {
        Self {
            developer: WireStream::new(developer)
                .with_timeout(config.io_timeout())
                .with_max_payload(config.max_payload_bytes),
            identity: identity.into(),
            connector,
            io_timeout: config.io_timeout(),
            max_payload: config.max_payload_bytes,
            archive_dir: config.archive_dir.clone(),
        }
    }

    /// Run the session to completion.
    ///
    /// The archive is delivered only when every dependency was redeemed,
    /// every announced file arrived and the finalized archive fits in one
    /// payload frame. Any other outcome sends the Developer a `false` flag
    /// and drops the archive.
    pub async fn run(mut self) -> Result<SessionReport, SessionError> {
        let raw_entry_point = self.developer.read_string().await?;
        let created = match &self.archive_dir {
            Some(dir) => ArchiveBuilder::new_in(&raw_entry_point, dir),
            None => ArchiveBuilder::new(&raw_entry_point),
        };
        let mut archive = match created {
            Ok(archive) => archive,
            Err(e) => {
                self.notify(false).await;
                return Err(e.into());
            }
        };

        let declared = match self.developer.read_int().await {
            Ok(n) if n >= 0 => n as usize,
            Ok(n) => {
                self.notify(false).await;
                return Err(SessionError::InvalidCount(n));
            }
            Err(e) => {
                self.notify(false).await;
                return Err(e.into());
            }
        };

        // Phase one: every dependency, in declaration order.
        for index in 0..declared {
            if let Err(e) = self.redeem_dependency(index, &mut archive).await {
                // Dependency flag, then phase flag.
                self.notify(false).await;
                self.notify(false).await;
                return Err(e);
            }
        }
        self.developer.write_bool(true).await?;
        debug!(identity = %self.identity, dependencies = declared, "redemption phase complete");

        // Phase two: the Developer's own files.
        let mut transfer_error = None;
        let expected = match self.developer.read_int().await {
            Ok(m) if m >= 0 => m as usize,
            Ok(m) => {
                transfer_error = Some(SessionError::InvalidFileCount(m));
                0
            }
            Err(e) => {
                transfer_error = Some(SessionError::Developer(e));
                0
            }
        };
        let mut received = 0;
        for _ in 0..expected {
            let appended = match self.developer.read_payload().await {
                Ok(file) => archive
                    .append(&file.name, &file.bytes)
                    .map_err(SessionError::Archive),
                Err(e) => Err(SessionError::Developer(e)),
            };
            match appended {
                Ok(()) => received += 1,
                Err(e) => {
                    transfer_error = Some(e);
                    break;
                }
            }
        }

        let failure = transfer_error.or(if received == expected {
            None
        } else {
            Some(SessionError::IncompleteFiles { expected, received })
        });

        // Closing and reading back the archive is blocking file I/O.
        let entry_point = archive.entry_point().to_string();
        let read_back = failure.is_none();
        let sealed = tokio::task::spawn_blocking(move || {
            let sealed = archive.finalize().and_then(|()| {
                if read_back {
                    archive.to_bytes()
                } else {
                    Ok(Vec::new())
                }
            });
            (archive, sealed)
        })
        .await;
        let (archive, sealed) = match sealed {
            Ok((archive, sealed)) => (Some(archive), sealed),
            Err(e) => (None, Err(ArchiveError::Io(std::io::Error::other(e)))),
        };

        let ready = match (failure, sealed) {
            (Some(e), _) => Err(e),
            (None, Err(e)) => Err(SessionError::Archive(e)),
            (None, Ok(bytes)) if bytes.len() as u64 > u64::from(self.max_payload) => {
                Err(SessionError::Archive(ArchiveError::TooLarge {
                    size: bytes.len() as u64,
                    max: self.max_payload,
                }))
            }
            (None, Ok(bytes)) => Ok(bytes),
        };

        // Once the delivery flag is out, a failed write gets no second flag.
        let outcome = match ready {
            Ok(bytes) => self.deliver(entry_point, bytes, declared, received).await,
            Err(e) => {
                self.notify(false).await;
                Err(e)
            }
        };

        if let Some(Err(e)) = archive.map(ArchiveBuilder::discard) {
            warn!(kind = %e.kind(), error = %e, "failed to remove archive");
        }
        outcome
    }

    async fn deliver(
        &mut self,
        entry_point: String,
        bytes: Vec<u8>,
        dependencies: usize,
        files: usize,
    ) -> Result<SessionReport, SessionError> {
        let name = format!("{}.jar", simple_name(&entry_point));
        let archive_bytes = bytes.len();

        self.developer.write_bool(true).await?;
        self.developer.write_payload(&Artifact::new(name, bytes)).await?;

        info!(
            identity = %self.identity,
            entry_point = %entry_point,
            dependencies,
            files,
            bytes = archive_bytes,
            "Linker: archive delivered"
        );
        Ok(SessionReport {
            entry_point,
            dependencies,
            files,
            archive_bytes,
        })
    }

    /// Read one declaration, redeem it and answer the Developer `true`.
    ///
    /// On error the caller sends the `false` flags.
    async fn redeem_dependency(
        &mut self,
        index: usize,
        archive: &mut ArchiveBuilder,
    ) -> Result<(), SessionError> {
        let decl = DependencyDecl::read_from(&mut self.developer).await?;
        let port = decl.port().ok_or(SessionError::InvalidPort {
            index,
            port: decl.port,
        })?;
        let endpoint = format!("{}:{}", decl.host, port);
        debug!(index, endpoint = %endpoint, "redeeming dependency");

        let transport = self
            .connector
            .connect(&decl.host, port)
            .await
            .map_err(|source| SessionError::SwhUnreachable {
                index,
                endpoint: endpoint.clone(),
                source,
            })?;
        let mut swh = WireStream::new(transport)
            .with_timeout(self.io_timeout)
            .with_max_payload(self.max_payload);

        if let Err(e) =
            fetch_artifact(&mut swh, index, &endpoint, &decl, &self.identity, archive).await
        {
            if let Err(notify_err) = swh.write_bool(false).await {
                debug!(endpoint = %endpoint, error = %notify_err, "SWH not notified of failure");
            }
            return Err(e);
        }

        // The SWH commits on this flag; the Developer hears success after.
        swh.write_bool(true)
            .await
            .map_err(|source| SessionError::Swh {
                index,
                endpoint: endpoint.clone(),
                source,
            })?;
        self.developer.write_bool(true).await?;
        Ok(())
    }

    /// Best-effort `false`/`true` flag to the Developer.
    async fn notify(&mut self, flag: bool) {
        if let Err(e) = self.developer.write_bool(flag).await {
            debug!(identity = %self.identity, error = %e, "Developer not notified");
        }
    }
}

/// `VER` exchange up to the artifact; the caller sends the confirmation.
async fn fetch_artifact(
    swh: &mut WireStream<BoxedTransport>,
    index: usize,
    endpoint: &str,
    decl: &DependencyDecl,
    identity: &str,
    archive: &mut ArchiveBuilder,
) -> Result<(), SessionError> {
    let swh_err = |source| SessionError::Swh {
        index,
        endpoint: endpoint.to_string(),
        source,
    };

    Command::Verify.write_to(swh).await.map_err(swh_err)?;
    VerifyRequest {
        wrapped_token: decl.wrapped_token.clone(),
        identity: identity.to_string(),
    }
    .write_to(swh)
    .await
    .map_err(swh_err)?;

    if !swh.read_bool().await.map_err(swh_err)? {
        return Err(SessionError::DependencyRejected {
            index,
            endpoint: endpoint.to_string(),
        });
    }
    let artifact = swh.read_payload().await.map_err(swh_err)?;
    archive
        .append(&artifact.name, &artifact.bytes)
        .map_err(|source| SessionError::DependencyArtifact { index, source })?;
    debug!(index, entry = %artifact.name, bytes = artifact.bytes.len(), "dependency linked");
    Ok(())
}

fn simple_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}
