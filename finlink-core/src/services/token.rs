//! Token service - cached bank technical tokens

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::result::{Error, Result};
use crate::domain::{BankConfig, CachedToken};
use crate::ports::{OpenBankingApi, Repository, TokenStore};

/// Hands out technical tokens, fetching a new one only when the cached one
/// is missing or expired
///
/// The store is only touched before and after the fetch, so two callers
/// that miss at the same time both fetch and the last write wins.
pub struct TokenService {
    repository: Arc<dyn Repository>,
    api: Arc<dyn OpenBankingApi>,
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    pub fn new(
        repository: Arc<dyn Repository>,
        api: Arc<dyn OpenBankingApi>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            repository,
            api,
            store,
        }
    }

    /// Get a valid token for a bank by name
    pub fn get_token(&self, bank_name: &str) -> Result<String> {
        let bank = self
            .repository
            .get_bank(bank_name)?
            .ok_or_else(|| Error::not_found(format!("bank '{}'", bank_name)))?;
        self.token_for(&bank)
    }

    pub fn token_for(&self, bank: &BankConfig) -> Result<String> {
        self.token_for_at(bank, Utc::now())
    }

    /// Token lookup against an explicit clock
    pub fn token_for_at(&self, bank: &BankConfig, now: DateTime<Utc>) -> Result<String> {
        if let Some(cached) = self.store.get(&bank.name) {
            if cached.is_valid_at(now) {
                return Ok(cached.token);
            }
            tracing::debug!(bank = %bank.name, "cached token expired");
        }

        let issued = self.api.request_bank_token(bank)?;
        let cached = CachedToken::from_issued(issued, now).ok_or_else(|| Error::UpstreamAuth {
            bank: bank.name.clone(),
            status: None,
            body: "unusable expires_in".to_string(),
        })?;
        tracing::debug!(bank = %bank.name, expires_at = %cached.expires_at, "fetched bank token");

        let token = cached.token.clone();
        self.store.put(&bank.name, cached);
        Ok(token)
    }

    /// Drop the cached token of a bank if `error` says the bank refused it
    pub fn forget_if_unauthorized(&self, bank: &BankConfig, error: &Error) {
        if let Error::UpstreamRequest {
            status: Some(401), ..
        } = error
        {
            tracing::info!(bank = %bank.name, "bank rejected cached token, evicting");
            self.store.evict(&bank.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::Duration;
    use serde_json::Value as JsonValue;
    use tempfile::TempDir;

    use crate::adapters::duckdb::DuckDbRepository;
    use crate::adapters::memory::InMemoryTokenStore;
    use crate::domain::{ConsentLookup, IssuedToken};
    use crate::ports::{
        ConsentAccess, ConsentRequest, ConsentRequestOutcome, ConsentState, PageQuery,
        RevokeOutcome,
    };

    /// Issues "token-N" with a fixed lifetime and counts calls
    struct CountingTokens {
        calls: AtomicUsize,
        expires_in: i64,
        fail: Mutex<bool>,
    }

    impl CountingTokens {
        fn new(expires_in: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in,
                fail: Mutex::new(false),
            }
        }
    }

    impl OpenBankingApi for CountingTokens {
        fn request_bank_token(&self, bank: &BankConfig) -> Result<IssuedToken> {
            if *self.fail.lock().unwrap() {
                return Err(Error::UpstreamAuth {
                    bank: bank.name.clone(),
                    status: Some(401),
                    body: "invalid_client".to_string(),
                });
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                access_token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }

        fn request_consent(
            &self,
            _: &BankConfig,
            _: &str,
            _: &ConsentRequest,
        ) -> Result<ConsentRequestOutcome> {
            unimplemented!()
        }

        fn get_consent(&self, _: &BankConfig, _: &str, _: ConsentLookup<'_>) -> Result<ConsentState> {
            unimplemented!()
        }

        fn revoke_consent(&self, _: &BankConfig, _: &str) -> Result<RevokeOutcome> {
            unimplemented!()
        }

        fn get_accounts(&self, _: &BankConfig, _: ConsentAccess<'_>) -> Result<Vec<JsonValue>> {
            unimplemented!()
        }

        fn get_balances(
            &self,
            _: &BankConfig,
            _: ConsentAccess<'_>,
            _: &str,
        ) -> Result<Vec<JsonValue>> {
            unimplemented!()
        }

        fn get_transactions_page(
            &self,
            _: &BankConfig,
            _: ConsentAccess<'_>,
            _: &str,
            _: PageQuery<'_>,
        ) -> Result<Vec<JsonValue>> {
            unimplemented!()
        }
    }

    fn setup(expires_in: i64) -> (TempDir, Arc<CountingTokens>, TokenService, BankConfig) {
        let dir = TempDir::new().unwrap();
        let repo = DuckDbRepository::new(&dir.path().join("finlink.duckdb")).unwrap();
        repo.ensure_schema().unwrap();
        let bank = BankConfig::new("vbank", "team1", "secret", "https://vbank.example");
        repo.upsert_bank(&bank).unwrap();

        let api = Arc::new(CountingTokens::new(expires_in));
        let service = TokenService::new(
            Arc::new(repo),
            api.clone(),
            Arc::new(InMemoryTokenStore::new()),
        );
        (dir, api, service, bank)
    }

    #[test]
    fn test_cache_hit_does_no_io() {
        let (_dir, api, service, bank) = setup(3600);
        let now = Utc::now();

        assert_eq!(service.token_for_at(&bank, now).unwrap(), "token-1");
        assert_eq!(
            service.token_for_at(&bank, now + Duration::seconds(100)).unwrap(),
            "token-1"
        );
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_refetched_inside_safety_margin() {
        let (_dir, api, service, bank) = setup(3600);
        let now = Utc::now();

        service.token_for_at(&bank, now).unwrap();
        // 3600s lifetime minus 60s margin
        let token = service
            .token_for_at(&bank, now + Duration::seconds(3540))
            .unwrap();
        assert_eq!(token, "token-2");
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_bank_is_not_found_without_io() {
        let (_dir, api, service, _bank) = setup(3600);

        let err = service.get_token("nobank").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_token_request_is_auth_error_and_not_cached() {
        let (_dir, api, service, bank) = setup(3600);
        *api.fail.lock().unwrap() = true;

        let err = service.token_for(&bank).unwrap_err();
        assert!(matches!(err, Error::UpstreamAuth { .. }));

        *api.fail.lock().unwrap() = false;
        assert_eq!(service.get_token("vbank").unwrap(), "token-1");
    }

    #[test]
    fn test_unusable_lifetime_is_auth_error_and_not_cached() {
        let (_dir, api, service, bank) = setup(i64::MAX);

        let err = service.token_for(&bank).unwrap_err();
        match err {
            Error::UpstreamAuth { bank, status, body } => {
                assert_eq!(bank, "vbank");
                assert_eq!(status, None);
                assert_eq!(body, "unusable expires_in");
            }
            other => panic!("expected UpstreamAuth, got {:?}", other),
        }
        assert!(service.token_for(&bank).is_err());
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unauthorized_response_evicts_token() {
        let (_dir, api, service, bank) = setup(3600);

        service.token_for(&bank).unwrap();
        service.forget_if_unauthorized(&bank, &Error::upstream_status("vbank", 500, ""));
        assert_eq!(service.token_for(&bank).unwrap(), "token-1");

        service.forget_if_unauthorized(&bank, &Error::upstream_status("vbank", 401, ""));
        assert_eq!(service.token_for(&bank).unwrap(), "token-2");
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }
}
