//! License store: the authority's registry of unconsumed licenses.
//!
//! Keyed by plaintext token. All operations are atomic per key, so a token
//! can be taken out by at most one caller at a time; that is the only
//! mutual exclusion the authority needs across concurrent connections.

use dashmap::DashMap;
use licenselink_types::License;

/// Concurrent map of outstanding licenses.
#[derive(Debug, Default)]
pub struct LicenseStore {
    licenses: DashMap<String, License>,
}

impl LicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly issued license.
    pub fn insert(&self, license: License) {
        self.licenses.insert(license.token.clone(), license);
    }

    /// Atomically remove and return the license for `token`.
    ///
    /// Of several concurrent callers with the same token, at most one gets `Some`.
    pub fn take(&self, token: &str) -> Option<License> {
        self.licenses.remove(token).map(|(_, license)| license)
    }

    /// Put back a license taken by [`take`](Self::take) whose redemption did not complete.
    pub fn restore(&self, license: License) {
        self.licenses.insert(license.token.clone(), license);
    }

    pub fn contains(&self, token: &str) -> bool {
        self.licenses.contains_key(token)
    }

    /// Number of outstanding licenses.
    pub fn len(&self) -> usize {
        self.licenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }

    /// Outstanding licenses bound to `library_id`.
    pub fn count_for(&self, library_id: &str) -> usize {
        self.licenses
            .iter()
            .filter(|entry| entry.value().library_id == library_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn make_license(token: &str, library: &str) -> License {
        License {
            token: token.to_string(),
            wrapped_token: format!("wrapped-{token}"),
            library_id: library.to_string(),
            issuer: "127.0.0.1:7400".to_string(),
            requester: "127.0.0.1:50000".to_string(),
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn test_take_is_at_most_once() {
        let store = LicenseStore::new();
        store.insert(make_license("aa", "acme.lib.Core"));
        assert!(store.take("aa").is_some());
        assert!(store.take("aa").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_makes_license_available_again() {
        let store = LicenseStore::new();
        store.insert(make_license("aa", "acme.lib.Core"));
        let taken = store.take("aa").unwrap();
        assert!(!store.contains("aa"));
        store.restore(taken);
        assert!(store.contains("aa"));
    }

    #[test]
    fn test_count_for_library() {
        let store = LicenseStore::new();
        store.insert(make_license("aa", "acme.lib.Core"));
        store.insert(make_license("bb", "acme.lib.Core"));
        store.insert(make_license("cc", "acme.lib.Extra"));
        assert_eq!(store.len(), 3);
        assert_eq!(store.count_for("acme.lib.Core"), 2);
        assert_eq!(store.count_for("acme.lib.Missing"), 0);
    }

    #[test]
    fn test_concurrent_take_single_winner() {
        let store = Arc::new(LicenseStore::new());
        store.insert(make_license("contended", "acme.lib.Core"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.take("contended").is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
