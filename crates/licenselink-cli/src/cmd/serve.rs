//! `swh` and `linker`: long-running server roles.

use anyhow::Context;
use licenselink_authority::{compiler, KeyPair, LicenseAuthority, SoftwareHouse};
use licenselink_linker::{Linker, TcpConnector};
use licenselink_types::config::{LinkerConfig, SwhConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub async fn cmd_swh(config: SwhConfig) -> anyhow::Result<()> {
    let bits = config.key_bits;
    info!(bits, "generating RSA key pair");
    let keys = tokio::task::spawn_blocking(move || KeyPair::generate(bits))
        .await
        .context("key generation task failed")??;

    let authority = LicenseAuthority::new(keys, compiler::from_config(&config.compiler));
    for library in config.resolved_libraries() {
        if !library.source.exists() {
            warn!(
                library = %library.id,
                source = %library.source.display(),
                "library source not found; redemptions will fail until it exists"
            );
        }
        authority.register(library.id, library.source);
    }

    let (swh, accept) = SoftwareHouse::start(&config, Arc::new(authority))
        .await
        .with_context(|| format!("failed to start SWH on {}", config.listen_addr))?;
    println!("Software House listening on {}", swh.local_addr());
    run_until_shutdown(accept).await
}

pub async fn cmd_linker(config: LinkerConfig) -> anyhow::Result<()> {
    let connector = Arc::new(TcpConnector::new(config.connect_timeout()));
    let listen_addr = config.listen_addr;
    let (linker, accept) = Linker::start(config, connector)
        .await
        .with_context(|| format!("failed to start Linker on {listen_addr}"))?;
    println!("Linker listening on {}", linker.local_addr());
    run_until_shutdown(accept).await
}

async fn run_until_shutdown(accept: JoinHandle<()>) -> anyhow::Result<()> {
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("shutting down");
        }
        joined = accept => {
            joined.context("accept loop stopped")?;
        }
    }
    Ok(())
}
