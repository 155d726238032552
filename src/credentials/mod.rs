//! Encrypted credential storage and the in-memory token slot.
//!
//! At rest the access token lives as an AES-256-GCM [`EncryptedBlob`] in
//! SQLite, owned by [`TokenStore`]. While the process runs, the current
//! token lives in a [`TokenHolder`]: a single-writer, multi-reader slot
//! that the API client and clone orchestrator re-read on every operation,
//! so a concurrent logout is visible immediately.

use std::sync::{Arc, RwLock};

mod encryption;
mod storage;

pub use encryption::EncryptedBlob;
pub use storage::TokenStore;

// Re-export encryption functions for utilities
pub use encryption::{decrypt, derive_key, encrypt};

/// Shared in-memory slot for the current access token.
///
/// Written by the OAuth flow on success and by logout on invalidation;
/// read by everything else. Readers must call [`TokenHolder::get`] per
/// operation rather than caching the value.
#[derive(Clone, Default)]
pub struct TokenHolder {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if signed in.
    pub fn get(&self) -> Option<String> {
        self.inner.read().unwrap().clone()
    }

    /// Publish a new token (sign-in).
    pub fn set(&self, token: String) {
        *self.inner.write().unwrap() = Some(token);
    }

    /// Drop the in-memory token (logout or failed validation).
    pub fn clear(&self) {
        *self.inner.write().unwrap() = None;
    }

    pub fn is_present(&self) -> bool {
        self.inner.read().unwrap().is_some()
    }
}
