//! Bootstrap configuration for the Software House and Linker roles.
//!
//! Both structs deserialize from TOML; every field has a default so a
//! partial (or missing) file still yields a usable configuration.

use crate::license::Library;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on a single payload frame (16 MB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u32 = 16 * 1024 * 1024;

/// Default RSA modulus size for a Software House key pair.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Software House configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwhConfig {
    /// Address the SWH listens on.
    pub listen_addr: SocketAddr,
    /// Root directory that library sources are resolved against.
    pub source_root: PathBuf,
    /// RSA key size used for wrapping license tokens.
    pub key_bits: usize,
    /// Per-operation I/O timeout on accepted connections.
    pub io_timeout_secs: u64,
    /// Largest payload accepted or sent in a single frame.
    pub max_payload_bytes: u32,
    /// Libraries registered before the listener starts.
    pub libraries: Vec<LibraryConfig>,
    /// How redeemed libraries are compiled.
    pub compiler: CompilerConfig,
}

impl Default for SwhConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 7400)),
            source_root: PathBuf::from("."),
            key_bits: DEFAULT_KEY_BITS,
            io_timeout_secs: 30,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            libraries: Vec::new(),
            compiler: CompilerConfig::default(),
        }
    }
}

impl SwhConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// Resolve every configured library against `source_root`.
    pub fn resolved_libraries(&self) -> Vec<Library> {
        self.libraries
            .iter()
            .map(|lib| lib.resolve(&self.source_root))
            .collect()
    }
}

/// One `[[libraries]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Fully-qualified library name, e.g. `acme.lib.Core`.
    pub name: String,
    /// Explicit source path. Defaults to `<source_root>/acme/lib/Core.java`.
    #[serde(default)]
    pub source: Option<PathBuf>,
}

impl LibraryConfig {
    pub fn resolve(&self, source_root: &Path) -> Library {
        let source = match &self.source {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => source_root.join(path),
            None => source_root.join(format!("{}.java", self.name.replace('.', "/"))),
        };
        Library::new(self.name.clone(), source)
    }
}

/// Which compiler collaborator the SWH uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerKind {
    /// Run an external command (e.g. `javac`) and ship its class file.
    Command,
    /// Ship the bytes at the library's source location as its artifact.
    Prebuilt,
}

/// Compiler collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub kind: CompilerKind,
    /// Executable to run for `kind = "command"`.
    pub command: String,
    /// Extra arguments placed before `-d <outdir> <source>`.
    pub args: Vec<String>,
    /// Wall-clock limit for one compilation.
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            kind: CompilerKind::Command,
            command: "javac".to_string(),
            args: Vec::new(),
            timeout_secs: 60,
        }
    }
}

impl CompilerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Linker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Address the Linker listens on for Developer sessions.
    pub listen_addr: SocketAddr,
    /// Per-operation I/O timeout on Developer and SWH streams.
    pub io_timeout_secs: u64,
    /// Timeout for establishing an outbound SWH connection.
    pub connect_timeout_secs: u64,
    /// Largest payload accepted or sent in a single frame.
    pub max_payload_bytes: u32,
    /// Directory for in-progress archives; the system temp dir when unset.
    pub archive_dir: Option<PathBuf>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 7300)),
            io_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            archive_dir: None,
        }
    }
}

impl LinkerConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
