//! Clap CLI definitions for licenselink.

use clap::{Parser, Subcommand};
use licenselink_types::Artifact;
use licenselink_wire::DependencyDecl;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  licenselink swh --config swh.toml         Run a Software House
  licenselink linker                        Run a Linker on 127.0.0.1:7300
  licenselink request --swh 127.0.0.1:7400 --library acme.lib.Core --count 2
  licenselink link --linker 127.0.0.1:7300 --entry-point app/Main.class \\
      --license 127.0.0.1:7400:<wrapped> --file app/Main.class --out app.jar";

/// License-gated linking of compiled libraries.
#[derive(Parser)]
#[command(name = "licenselink", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to a TOML config file (server roles).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a Software House: issue licenses and release compiled libraries.
    Swh {
        /// Override the configured listen address.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Run a Linker: broker link sessions for Developers.
    Linker {
        /// Override the configured listen address.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Request licenses for a library from a Software House.
    Request {
        /// Software House endpoint, `host:port`.
        #[arg(long, value_parser = parse_endpoint)]
        swh: Endpoint,
        /// Fully-qualified library name.
        #[arg(long)]
        library: String,
        #[arg(long, default_value_t = 1)]
        count: i32,
        /// Print the licenses as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Redeem one wrapped license directly and save the artifact.
    Redeem {
        #[arg(long, value_parser = parse_endpoint)]
        swh: Endpoint,
        #[arg(long)]
        wrapped: String,
        #[arg(long, default_value = "developer")]
        identity: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run a link session and save the delivered archive.
    Link {
        /// Linker endpoint, `host:port`.
        #[arg(long, value_parser = parse_endpoint)]
        linker: Endpoint,
        /// Main class, dotted or as a class file path.
        #[arg(long)]
        entry_point: String,
        /// A dependency, `host:port:wrapped_token`. Repeatable, in order.
        #[arg(long = "license", value_parser = parse_license)]
        licenses: Vec<DependencyDecl>,
        /// A file to include, `name=path` or `path`. Repeatable.
        #[arg(long = "file", value_parser = parse_file)]
        files: Vec<FileSpec>,
        #[arg(long)]
        out: PathBuf,
    },
}

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// A local file and the archive name it is sent under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub name: String,
    pub path: PathBuf,
}

impl FileSpec {
    pub fn load(&self) -> std::io::Result<Artifact> {
        Ok(Artifact::new(self.name.clone(), std::fs::read(&self.path)?))
    }
}

pub fn parse_endpoint(s: &str) -> Result<Endpoint, String> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {s:?}"))?;
    if host.is_empty() {
        return Err(format!("missing host in {s:?}"));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| format!("invalid port in {s:?}"))?;
    Ok(Endpoint {
        host: host.to_string(),
        port,
    })
}

pub fn parse_license(s: &str) -> Result<DependencyDecl, String> {
    let (endpoint, wrapped) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port:wrapped_token, got {s:?}"))?;
    if wrapped.is_empty() {
        return Err(format!("missing wrapped token in {s:?}"));
    }
    let endpoint = parse_endpoint(endpoint)?;
    Ok(DependencyDecl {
        host: endpoint.host,
        port: i32::from(endpoint.port),
        wrapped_token: wrapped.to_string(),
    })
}

pub fn parse_file(s: &str) -> Result<FileSpec, String> {
    let (name, path) = match s.split_once('=') {
        Some((name, path)) => (name.to_string(), path),
        None => (s.replace('\\', "/").trim_start_matches("./").to_string(), s),
    };
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected name=path or path, got {s:?}"));
    }
    Ok(FileSpec {
        name,
        path: PathBuf::from(path),
    })
}
