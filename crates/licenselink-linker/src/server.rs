//! Linker TCP server.
//!
//! Each accepted Developer connection runs one [`LinkSession`] on its own
//! task. Sessions share nothing but the connector; a failed session is
//! logged once and the accept loop carries on.

use crate::connector::SwhConnector;
use crate::session::LinkSession;
use licenselink_types::config::LinkerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A running Linker endpoint.
pub struct Linker {
    config: LinkerConfig,
    local_addr: SocketAddr,
    connector: Arc<dyn SwhConnector>,
}

impl Linker {
    /// Bind the configured address and start accepting Developer sessions.
    pub async fn start(
        config: LinkerConfig,
        connector: Arc<dyn SwhConnector>,
    ) -> std::io::Result<(Arc<Self>, tokio::task::JoinHandle<()>)> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Linker: listening on {}", local_addr);

        let node = Arc::new(Self {
            config,
            local_addr,
            connector,
        });

        let node_clone = Arc::clone(&node);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, node_clone).await;
        });

        Ok((node, accept_handle))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn accept_loop(listener: TcpListener, node: Arc<Linker>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let node = Arc::clone(&node);
                    tokio::spawn(async move {
                        node.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Linker: accept error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let session_id = Uuid::new_v4();
        debug!(session = %session_id, peer = %addr, "Linker: session opened");
        if let Err(e) = stream.set_nodelay(true) {
            debug!(session = %session_id, error = %e, "set_nodelay failed");
        }

        let session = LinkSession::new(
            stream,
            addr.to_string(),
            Arc::clone(&self.connector),
            &self.config,
        );
        match session.run().await {
            Ok(report) => info!(
                session = %session_id,
                peer = %addr,
                entry_point = %report.entry_point,
                dependencies = report.dependencies,
                files = report.files,
                "Linker: session delivered"
            ),
            Err(e) => warn!(
                session = %session_id,
                peer = %addr,
                kind = %e.kind(),
                dependency = ?e.dependency_index(),
                error = %e,
                "Linker: session aborted"
            ),
        }
    }
}
