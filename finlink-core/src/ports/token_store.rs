//! Token store port

use crate::domain::CachedToken;

/// Process-wide cache of bank technical tokens, keyed by bank name
///
/// Implementations must be safe to share across threads. No lock may be
/// held while a token is fetched from the bank.
pub trait TokenStore: Send + Sync {
    fn get(&self, bank_name: &str) -> Option<CachedToken>;

    fn put(&self, bank_name: &str, token: CachedToken);

    fn evict(&self, bank_name: &str);
}
