//! Compiler collaborator.
//!
//! Redemption proves entitlement; turning the library's source into the
//! released artifact is delegated to a [`Compiler`]. The authority makes no
//! claim about the correctness of what the compiler produces.

use async_trait::async_trait;
use licenselink_types::config::{CompilerConfig, CompilerKind};
use licenselink_types::{Artifact, Library};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from compiling a library.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Source not found: {0}")]
    SourceMissing(PathBuf),
    #[error("Compiler exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Compiler timed out after {0:?}")]
    Timeout(Duration),
    #[error("Compiler produced no output at {0}")]
    OutputMissing(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces the artifact released for a redeemed library.
#[async_trait]
pub trait Compiler: Send + Sync + 'static {
    async fn compile(&self, library: &Library) -> Result<Artifact, CompileError>;
}

/// Build the compiler described by `config`.
pub fn from_config(config: &CompilerConfig) -> Arc<dyn Compiler> {
    match config.kind {
        CompilerKind::Command => Arc::new(CommandCompiler::new(
            config.command.clone(),
            config.args.clone(),
            config.timeout(),
        )),
        CompilerKind::Prebuilt => Arc::new(PrebuiltCompiler),
    }
}

/// Ships the bytes stored at the library's source location unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrebuiltCompiler;

#[async_trait]
impl Compiler for PrebuiltCompiler {
    async fn compile(&self, library: &Library) -> Result<Artifact, CompileError> {
        let bytes = match tokio::fs::read(&library.source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CompileError::SourceMissing(library.source.clone()));
            }
            Err(e) => return Err(CompileError::Io(e)),
        };
        Ok(Artifact::new(library.class_entry_name(), bytes))
    }
}

/// Runs an external compiler as `<command> <args..> -d <outdir> <source>`.
///
/// Each compilation gets its own temporary output directory, so concurrent
/// redemptions never see each other's class files.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCompiler {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(&self, library: &Library) -> Result<Artifact, CompileError> {
        if !tokio::fs::try_exists(&library.source).await? {
            return Err(CompileError::SourceMissing(library.source.clone()));
        }
        let out_dir = tempfile::TempDir::new()?;

        debug!(
            library = %library.id,
            source = %library.source.display(),
            command = %self.command,
            "compiling"
        );
        let child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg("-d")
            .arg(out_dir.path())
            .arg(&library.source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(res) => res?,
            Err(_) => return Err(CompileError::Timeout(self.timeout)),
        };
        if !output.status.success() {
            return Err(CompileError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let entry_name = library.class_entry_name();
        let class_file = out_dir.path().join(&entry_name);
        match tokio::fs::read(&class_file).await {
            Ok(bytes) => Ok(Artifact::new(entry_name, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CompileError::OutputMissing(class_file))
            }
            Err(e) => Err(CompileError::Io(e)),
        }
    }
}
