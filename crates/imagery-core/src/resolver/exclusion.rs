use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::ImageKey;

/// Result of [`ExclusionSet::claim_payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    /// Another slot already holds this key.
    KeyTaken,
    /// Another slot already holds the same bytes under a different key.
    ContentTaken,
}

#[derive(Debug, Default)]
struct Claimed {
    keys: HashSet<ImageKey>,
    digests: HashSet<String>,
}

/// Keys and payload digests already committed to a slot in this run.
///
/// Clones share one set. [`ExclusionSet::claim`] and
/// [`ExclusionSet::claim_payload`] are the only ways in, so two slots can
/// never commit the same key or the same bytes.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    inner: Arc<Mutex<Claimed>>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` unless present. Returns `true` when this call claimed it.
    ///
    /// Used for keys known before any payload is seen, such as images the
    /// article already shows.
    pub fn claim(&self, key: &ImageKey) -> bool {
        self.lock().keys.insert(key.clone())
    }

    /// Claim `key` and the payload `digest` together, or neither.
    pub fn claim_payload(&self, key: &ImageKey, digest: &str) -> Claim {
        let mut claimed = self.lock();
        if claimed.keys.contains(key) {
            return Claim::KeyTaken;
        }
        if claimed.digests.contains(digest) {
            return Claim::ContentTaken;
        }
        claimed.keys.insert(key.clone());
        claimed.digests.insert(digest.to_string());
        Claim::Claimed
    }

    pub fn contains(&self, key: &ImageKey) -> bool {
        self.lock().keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the claimed keys.
    pub fn keys(&self) -> Vec<ImageKey> {
        let mut keys: Vec<ImageKey> = self.lock().keys.iter().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, Claimed> {
        // a panic mid-insert cannot leave a HashSet half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
