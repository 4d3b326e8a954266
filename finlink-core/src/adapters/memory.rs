//! In-memory token store

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::CachedToken;
use crate::ports::TokenStore;

/// Token store backed by a mutex-guarded map
///
/// Lives as long as the process. A poisoned lock is recovered rather than
/// propagated: the worst outcome is a redundant token fetch.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self, bank_name: &str) -> Option<CachedToken> {
        self.lock().get(bank_name).cloned()
    }

    fn put(&self, bank_name: &str, token: CachedToken) {
        self.lock().insert(bank_name.to_string(), token);
    }

    fn evict(&self, bank_name: &str) {
        self.lock().remove(bank_name);
    }
}
