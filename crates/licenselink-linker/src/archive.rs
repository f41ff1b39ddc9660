//! Archive builder.
//!
//! Each link session owns one [`ArchiveBuilder`]. The archive is a
//! JAR-compatible ZIP written to a private temporary file, so concurrent
//! sessions never share a path and an aborted session leaves nothing behind:
//! the file is removed when the builder is dropped, whatever the exit path.
//!
//! The manifest is written first, when the builder is created:
//!
//! ```text
//! Manifest-Version: 1.0
//! Class-Path: .
//! Main-Class: <entry point>
//! ```
//!
//! Entries are then appended in arrival order until [`ArchiveBuilder::finalize`]
//! writes the central directory.

use crate::error::ArchiveError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive path of the manifest. Reserved: callers cannot append it.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Turn a class file path into a dotted class name.
///
/// `a/b/Main.class` becomes `a.b.Main`; an already dotted name passes
/// through unchanged.
pub fn normalize_entry_point(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_suffix = trimmed.strip_suffix(".class").unwrap_or(trimmed);
    without_suffix.replace(['/', '\\'], ".")
}

enum State {
    Open(ZipWriter<File>),
    Finalized,
    Broken,
}

/// A JAR under construction, backed by a temporary file.
pub struct ArchiveBuilder {
    file: NamedTempFile,
    state: State,
    entry_point: String,
    entries: Vec<String>,
    digests: HashMap<String, [u8; 32]>,
}

impl ArchiveBuilder {
    /// Create an archive in the system temporary directory.
    pub fn new(entry_point: &str) -> Result<Self, ArchiveError> {
        Self::create(entry_point, None)
    }

    /// Create an archive whose backing file lives in `dir`.
    pub fn new_in(entry_point: &str, dir: &Path) -> Result<Self, ArchiveError> {
        Self::create(entry_point, Some(dir))
    }

    fn create(entry_point: &str, dir: Option<&Path>) -> Result<Self, ArchiveError> {
        let entry_point = normalize_entry_point(entry_point);
        if !is_class_name(&entry_point) {
            return Err(ArchiveError::InvalidEntryPoint(entry_point));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("licenselink-").suffix(".jar");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let mut writer = ZipWriter::new(file.reopen()?);
        writer.start_file(MANIFEST_PATH, options())?;
        writer.write_all(manifest(&entry_point).as_bytes())?;

        debug!(path = %file.path().display(), entry_point = %entry_point, "archive created");
        Ok(Self {
            file,
            state: State::Open(writer),
            entry_point,
            entries: Vec::new(),
            digests: HashMap::new(),
        })
    }

    /// The normalized `Main-Class` of this archive.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Names of appended entries, in order (the manifest excluded).
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized)
    }

    /// Add a named entry.
    ///
    /// Appending an entry identical to an existing one (same name, same
    /// bytes) is a no-op that succeeds. The same name with different bytes
    /// fails with [`ArchiveError::DuplicateEntry`].
    pub fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        let writer = match &mut self.state {
            State::Open(writer) => writer,
            State::Finalized => return Err(ArchiveError::Finalized),
            State::Broken => return Err(ArchiveError::Broken),
        };
        validate_name(name)?;

        let digest: [u8; 32] = Sha256::digest(bytes).into();
        if let Some(existing) = self.digests.get(name) {
            if *existing == digest {
                debug!(entry = name, "identical entry already present");
                return Ok(());
            }
            return Err(ArchiveError::DuplicateEntry(name.to_string()));
        }

        let written = writer
            .start_file(name, options())
            .map_err(ArchiveError::from)
            .and_then(|()| writer.write_all(bytes).map_err(ArchiveError::from));
        if let Err(e) = written {
            self.state = State::Broken;
            return Err(e);
        }

        self.digests.insert(name.to_string(), digest);
        self.entries.push(name.to_string());
        Ok(())
    }

    /// Write the central directory and close the archive.
    ///
    /// Calling this on an already finalized archive does nothing.
    pub fn finalize(&mut self) -> Result<(), ArchiveError> {
        match std::mem::replace(&mut self.state, State::Broken) {
            State::Open(writer) => {
                let mut file = writer.finish()?;
                file.flush()?;
                file.sync_all()?;
                self.state = State::Finalized;
                debug!(entries = self.entries.len(), "archive finalized");
                Ok(())
            }
            State::Finalized => {
                self.state = State::Finalized;
                Ok(())
            }
            State::Broken => Err(ArchiveError::Broken),
        }
    }

    /// Read the finished archive for delivery.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        if !self.is_finalized() {
            return Err(ArchiveError::NotFinalized);
        }
        Ok(std::fs::read(self.file.path())?)
    }

    /// Delete the backing file now, reporting a failed deletion.
    pub fn discard(mut self) -> Result<(), ArchiveError> {
        // Release the writer's handle before removing the file.
        self.state = State::Broken;
        self.file.close()?;
        Ok(())
    }
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn manifest(entry_point: &str) -> String {
    format!("Manifest-Version: 1.0\r\nClass-Path: .\r\nMain-Class: {entry_point}\r\n\r\n")
}

/// Dotted Java-style identifier segments, nothing that could break the manifest.
fn is_class_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
}

fn validate_name(name: &str) -> Result<(), ArchiveError> {
    let invalid = name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.chars().any(char::is_control)
        || name.split('/').any(|part| part.is_empty() || part == "." || part == "..")
        || name.eq_ignore_ascii_case(MANIFEST_PATH);
    if invalid {
        return Err(ArchiveError::InvalidName(name.to_string()));
    }
    Ok(())
}
