//! Library, License and Artifact records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A licensable library owned by a Software House.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    /// Fully-qualified name, e.g. `acme.lib.Core`.
    pub id: String,
    /// Location of the library's source, relative to the owning SWH.
    pub source: PathBuf,
}

impl Library {
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Last path segment of the dotted id (`acme.lib.Core` -> `Core`).
    pub fn simple_name(&self) -> &str {
        self.id.rsplit('.').next().unwrap_or(&self.id)
    }

    /// Archive entry name of the compiled library (`acme/lib/Core.class`).
    pub fn class_entry_name(&self) -> String {
        format!("{}.class", self.id.replace('.', "/"))
    }
}

/// A redeemable proof of entitlement to one library.
///
/// Only the issuing authority creates these. A License is unconsumed for as
/// long as the authority keeps it; redemption removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Lowercase hex digest; the authority's lookup key.
    pub token: String,
    /// Hex RSA ciphertext of `token`; the transmissible redemption credential.
    pub wrapped_token: String,
    /// The library this license entitles its holder to.
    pub library_id: String,
    /// Endpoint of the issuing authority.
    pub issuer: String,
    /// Host that requested the license.
    pub requester: String,
    pub issued_at: DateTime<Utc>,
}

/// A named blob: a compiled dependency or a Developer-owned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_names() {
        let lib = Library::new("acme.lib.Core", "src/acme/lib/Core.java");
        assert_eq!(lib.simple_name(), "Core");
        assert_eq!(lib.class_entry_name(), "acme/lib/Core.class");
    }

    #[test]
    fn test_undotted_library() {
        let lib = Library::new("Core", "Core.java");
        assert_eq!(lib.simple_name(), "Core");
        assert_eq!(lib.class_entry_name(), "Core.class");
    }

    #[test]
    fn test_license_serialization() {
        let license = License {
            token: "ab".repeat(32),
            wrapped_token: "cd".repeat(256),
            library_id: "acme.lib.Core".to_string(),
            issuer: "127.0.0.1:7000".to_string(),
            requester: "127.0.0.1:50000".to_string(),
            issued_at: Utc::now(),
        };
        let json = serde_json::to_string(&license).unwrap();
        let back: License = serde_json::from_str(&json).unwrap();
        assert_eq!(back, license);
    }
}
