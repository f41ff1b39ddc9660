//! License authority: catalog, issuance and redemption.
//!
//! The authority is the only owner of License records. A License moves
//! `ISSUED -> REDEEMED` exactly once; there is no expiry.
//!
//! Redemption is two-phase. [`LicenseAuthority::verify_and_redeem`] takes
//! the License out of the store into a [`Redemption`] guard, so no other
//! connection can redeem it concurrently. The caller then releases the
//! artifact and waits for the redeemer's delivery confirmation:
//! [`Redemption::commit`] makes consumption permanent, while dropping the
//! guard (rejected or lost confirmation, compile failure, I/O error) puts
//! the License back.

use crate::compiler::Compiler;
use crate::crypto::{self, KeyPair};
use crate::error::{AuthorityError, AuthorityResult};
use crate::store::LicenseStore;
use chrono::Utc;
use dashmap::DashMap;
use licenselink_types::{Artifact, Library, License};
use rand::RngCore;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// A Software House's license authority.
pub struct LicenseAuthority {
    issuer: RwLock<String>,
    keys: KeyPair,
    libraries: DashMap<String, Library>,
    store: LicenseStore,
    sequence: AtomicU64,
    compiler: Arc<dyn Compiler>,
}

impl LicenseAuthority {
    pub fn new(keys: KeyPair, compiler: Arc<dyn Compiler>) -> Self {
        Self {
            issuer: RwLock::new("unbound".to_string()),
            keys,
            libraries: DashMap::new(),
            store: LicenseStore::new(),
            sequence: AtomicU64::new(0),
            compiler,
        }
    }

    /// Record the endpoint that newly issued licenses name as their issuer.
    pub fn set_issuer(&self, endpoint: impl Into<String>) {
        let mut issuer = self.issuer.write().unwrap_or_else(|e| e.into_inner());
        *issuer = endpoint.into();
    }

    pub fn issuer(&self) -> String {
        self.issuer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        self.keys.public()
    }

    /// Register (or re-register) a licensable library.
    pub fn register(&self, library_id: impl Into<String>, source: impl Into<PathBuf>) {
        let library = Library::new(library_id, source);
        debug!(library = %library.id, source = %library.source.display(), "registered library");
        self.libraries.insert(library.id.clone(), library);
    }

    pub fn library(&self, library_id: &str) -> Option<Library> {
        self.libraries.get(library_id).map(|l| l.value().clone())
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    /// Issue `count` licenses for `library_id`.
    ///
    /// Nothing is stored unless every license was produced.
    pub fn generate_licenses(
        &self,
        library_id: &str,
        count: i32,
        requester: &str,
    ) -> AuthorityResult<Vec<License>> {
        if !self.libraries.contains_key(library_id) {
            return Err(AuthorityError::LibUnknown(library_id.to_string()));
        }
        if count <= 0 {
            return Err(AuthorityError::InvalidCount(count));
        }

        let issuer = self.issuer();
        let mut issued = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = self.sequence.fetch_add(1, Ordering::Relaxed);
            let token = derive_token(library_id, index);
            let wrapped_token = crypto::wrap(&token, Some(self.keys.public()))?;
            issued.push(License {
                token,
                wrapped_token,
                library_id: library_id.to_string(),
                issuer: issuer.clone(),
                requester: requester.to_string(),
                issued_at: Utc::now(),
            });
        }

        for license in &issued {
            self.store.insert(license.clone());
        }
        info!(
            library = library_id,
            count,
            requester,
            "issued licenses"
        );
        Ok(issued)
    }

    /// Unwrap `wrapped_token` and take the matching License out of the store.
    ///
    /// Malformed ciphertext, a foreign key, an unknown token and a token
    /// already redeemed (or mid-redemption) all fail as `InvalidLicense`.
    pub fn verify_and_redeem(
        &self,
        wrapped_token: &str,
        requester: &str,
    ) -> AuthorityResult<Redemption<'_>> {
        let token = match crypto::unwrap(wrapped_token, self.keys.private()) {
            Ok(token) => token,
            Err(_) => return Err(AuthorityError::InvalidLicense),
        };
        let license = self
            .store
            .take(&token)
            .ok_or(AuthorityError::InvalidLicense)?;

        info!(
            library = %license.library_id,
            requester,
            "license verified"
        );
        Ok(Redemption {
            store: &self.store,
            license: Some(license),
        })
    }

    /// Compile the library bound to a redeemed license.
    pub async fn compile(&self, library_id: &str) -> AuthorityResult<Artifact> {
        let library = self
            .library(library_id)
            .ok_or_else(|| AuthorityError::LibUnknown(library_id.to_string()))?;
        Ok(self.compiler.compile(&library).await?)
    }

    /// Whether `token` is issued and not (being) redeemed.
    pub fn is_outstanding(&self, token: &str) -> bool {
        self.store.contains(&token.to_ascii_lowercase())
    }

    /// Number of outstanding licenses.
    pub fn outstanding(&self) -> usize {
        self.store.len()
    }

    /// Number of outstanding licenses for one library.
    pub fn outstanding_for(&self, library_id: &str) -> usize {
        self.store.count_for(library_id)
    }
}

/// One-way token over library id, sequence index, time and a random nonce.
fn derive_token(library_id: &str, index: u64) -> String {
    let mut nonce = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce);
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(library_id.as_bytes());
    hasher.update(index.to_be_bytes());
    hasher.update(now.to_be_bytes());
    hasher.update(nonce);
    hex::encode(hasher.finalize())
}

/// A License taken out of the store, pending delivery confirmation.
///
/// Dropping without [`commit`](Self::commit) restores the License.
#[derive(Debug)]
pub struct Redemption<'a> {
    store: &'a LicenseStore,
    license: Option<License>,
}

impl Redemption<'_> {
    pub fn license(&self) -> &License {
        // Only `commit` and `drop` empty the slot, and both consume the guard.
        self.license
            .as_ref()
            .expect("redemption holds its license until commit or drop")
    }

    pub fn library_id(&self) -> &str {
        &self.license().library_id
    }

    /// Make the redemption permanent. The License record is destroyed.
    pub fn commit(mut self) -> License {
        let license = self
            .license
            .take()
            .expect("redemption holds its license until commit or drop");
        info!(library = %license.library_id, "license consumed");
        license
    }
}

impl Drop for Redemption<'_> {
    fn drop(&mut self) {
        if let Some(license) = self.license.take() {
            debug!(library = %license.library_id, "redemption not confirmed, license restored");
            self.store.restore(license);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PrebuiltCompiler;
    use crate::crypto::tests::{other_keys, test_keys};
    use licenselink_types::ErrorKind;

    fn clone_keys(keys: &KeyPair) -> KeyPair {
        KeyPair::from_private(keys.private().clone())
    }

    fn authority() -> LicenseAuthority {
        let authority = LicenseAuthority::new(clone_keys(test_keys()), Arc::new(PrebuiltCompiler));
        authority.set_issuer("127.0.0.1:7400");
        authority.register("acme.lib.Core", "/srv/acme/lib/Core.java");
        authority
    }

    #[test]
    fn test_generate_distinct_licenses() {
        let authority = authority();
        let licenses = authority
            .generate_licenses("acme.lib.Core", 3, "dev.local")
            .unwrap();
        assert_eq!(licenses.len(), 3);
        assert_eq!(authority.outstanding(), 3);
        assert_ne!(licenses[0].token, licenses[1].token);
        assert_ne!(licenses[1].token, licenses[2].token);
        for license in &licenses {
            assert_eq!(license.token.len(), 64);
            assert_eq!(license.library_id, "acme.lib.Core");
            assert_eq!(license.issuer, "127.0.0.1:7400");
            assert!(authority.is_outstanding(&license.token));
        }
    }

    #[test]
    fn test_unregistered_library_issues_nothing() {
        let authority = authority();
        let err = authority
            .generate_licenses("acme.lib.Missing", 2, "dev.local")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LibUnknown);
        assert_eq!(authority.outstanding(), 0);
    }

    #[test]
    fn test_non_positive_count_rejected() {
        let authority = authority();
        for count in [0, -1] {
            assert!(matches!(
                authority.generate_licenses("acme.lib.Core", count, "dev.local"),
                Err(AuthorityError::InvalidCount(c)) if c == count
            ));
        }
        assert_eq!(authority.outstanding(), 0);
    }

    #[test]
    fn test_register_is_idempotent_overwrite() {
        let authority = authority();
        authority.register("acme.lib.Core", "/elsewhere/Core.java");
        assert_eq!(authority.library_count(), 1);
        assert_eq!(
            authority.library("acme.lib.Core").unwrap().source,
            PathBuf::from("/elsewhere/Core.java")
        );
    }

    #[test]
    fn test_redeem_twice_fails() {
        let authority = authority();
        let license = authority
            .generate_licenses("acme.lib.Core", 1, "dev.local")
            .unwrap()
            .remove(0);

        let redemption = authority
            .verify_and_redeem(&license.wrapped_token, "dev.local")
            .unwrap();
        assert_eq!(redemption.library_id(), "acme.lib.Core");
        redemption.commit();
        assert_eq!(authority.outstanding(), 0);

        let err = authority
            .verify_and_redeem(&license.wrapped_token, "dev.local")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLicense);
    }

    #[test]
    fn test_uncommitted_redemption_restores_license() {
        let authority = authority();
        let license = authority
            .generate_licenses("acme.lib.Core", 1, "dev.local")
            .unwrap()
            .remove(0);

        {
            let _redemption = authority
                .verify_and_redeem(&license.wrapped_token, "dev.local")
                .unwrap();
            // In flight: a concurrent attempt is refused.
            assert!(matches!(
                authority.verify_and_redeem(&license.wrapped_token, "other.host"),
                Err(AuthorityError::InvalidLicense)
            ));
        }

        assert!(authority.is_outstanding(&license.token));
        let redemption = authority
            .verify_and_redeem(&license.wrapped_token, "dev.local")
            .unwrap();
        redemption.commit();
        assert!(!authority.is_outstanding(&license.token));
    }

    #[test]
    fn test_crypto_failures_fold_into_invalid_license() {
        let authority = authority();
        let license = authority
            .generate_licenses("acme.lib.Core", 1, "dev.local")
            .unwrap()
            .remove(0);
        let foreign = crypto::wrap(&license.token, Some(other_keys().public())).unwrap();

        for wrapped in ["", "not hex at all", "00ff", foreign.as_str()] {
            let err = authority.verify_and_redeem(wrapped, "dev.local").unwrap_err();
            assert!(matches!(err, AuthorityError::InvalidLicense));
            assert_eq!(err.to_string(), "Invalid license");
        }
        assert!(authority.is_outstanding(&license.token));
    }

    #[test]
    fn test_plaintext_token_is_not_a_credential() {
        let authority = authority();
        let license = authority
            .generate_licenses("acme.lib.Core", 1, "dev.local")
            .unwrap()
            .remove(0);
        assert!(authority
            .verify_and_redeem(&license.token, "dev.local")
            .is_err());
        assert_eq!(authority.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_compile_unknown_library() {
        let authority = authority();
        assert!(matches!(
            authority.compile("acme.lib.Missing").await,
            Err(AuthorityError::LibUnknown(_))
        ));
    }
}
