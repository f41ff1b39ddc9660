//! `request`, `redeem` and `link`: the Developer's side.

use crate::cli::{Endpoint, FileSpec};
use anyhow::{bail, Context};
use licenselink_client::{DeveloperClient, LinkOutcome, LinkRequest};
use licenselink_wire::DependencyDecl;
use std::path::Path;

pub async fn cmd_request(
    swh: &Endpoint,
    library: &str,
    count: i32,
    json: bool,
) -> anyhow::Result<()> {
    let licenses = DeveloperClient::new()
        .request_licenses(&swh.host, swh.port, library, count)
        .await
        .with_context(|| format!("license request to {}:{} failed", swh.host, swh.port))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&licenses)?);
    } else {
        for license in &licenses {
            println!("{} {}", license.token, license.wrapped_token);
        }
    }
    Ok(())
}

pub async fn cmd_redeem(
    swh: &Endpoint,
    wrapped: &str,
    identity: &str,
    out: &Path,
) -> anyhow::Result<()> {
    let artifact = DeveloperClient::new()
        .redeem(&swh.host, swh.port, wrapped, identity)
        .await
        .with_context(|| format!("redemption at {}:{} failed", swh.host, swh.port))?;
    std::fs::write(out, &artifact.bytes)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "{} ({} bytes) -> {}",
        artifact.name,
        artifact.bytes.len(),
        out.display()
    );
    Ok(())
}

pub async fn cmd_link(
    linker: &Endpoint,
    entry_point: String,
    dependencies: Vec<DependencyDecl>,
    files: &[FileSpec],
    out: &Path,
) -> anyhow::Result<()> {
    let files = files
        .iter()
        .map(|spec| {
            spec.load()
                .with_context(|| format!("failed to read {}", spec.path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let request = LinkRequest {
        entry_point,
        dependencies,
        files,
    };

    let outcome = DeveloperClient::new()
        .link(&linker.host, linker.port, &request)
        .await
        .with_context(|| format!("link session with {}:{} failed", linker.host, linker.port))?;

    match outcome {
        LinkOutcome::Delivered(archive) => {
            std::fs::write(out, &archive.bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "{} ({} bytes) -> {}",
                archive.name,
                archive.bytes.len(),
                out.display()
            );
            Ok(())
        }
        LinkOutcome::DependencyRejected { index } => {
            let dependency = &request.dependencies[index];
            bail!(
                "dependency {} ({}:{}) was rejected; nothing was linked",
                index,
                dependency.host,
                dependency.port
            )
        }
        LinkOutcome::Rejected => bail!("the Linker rejected the session; nothing was linked"),
    }
}
