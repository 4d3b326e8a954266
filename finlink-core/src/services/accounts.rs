//! Account service - stored and live bank accounts

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountListing, BankAccountRecord, BankConfig, Connection, ConnectionStatus,
    LiveAccount, LiveBankAccounts,
};
use crate::ports::{AccountFilter, ConnectionFilter, ConsentAccess, OpenBankingApi, Repository};
use crate::services::TokenService;

/// Counts from one account refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub created: usize,
    pub updated: usize,
}

/// Service for fetching and storing accounts of active connections
pub struct AccountService {
    repository: Arc<dyn Repository>,
    api: Arc<dyn OpenBankingApi>,
    tokens: Arc<TokenService>,
}

impl AccountService {
    pub fn new(
        repository: Arc<dyn Repository>,
        api: Arc<dyn OpenBankingApi>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            repository,
            api,
            tokens,
        }
    }

    /// Fetch a connection's accounts with balances and upsert them
    pub fn refresh_accounts(&self, user_id: i64, connection_id: Uuid) -> Result<RefreshSummary> {
        let connection = self
            .repository
            .get_connection(user_id, connection_id)?
            .filter(|c| c.active_consent().is_some())
            .ok_or_else(|| {
                Error::not_found(format!("active connection {}", connection_id))
            })?;
        let bank = self.bank(&connection.bank_name)?;

        let mut summary = RefreshSummary::default();
        for (record, balances) in self.fetch_with_balances(&bank, &connection)? {
            let Some(record) = BankAccountRecord::parse(record) else {
                continue;
            };

            match self
                .repository
                .get_account_by_api_id(connection.id, &record.account_id)?
            {
                Some(mut account) => {
                    account.apply_record(&record, balances);
                    self.repository.update_account(&account)?;
                    summary.updated += 1;
                }
                None => {
                    let account = Account::from_record(connection.id, &record, balances);
                    self.repository.insert_account(&account)?;
                    summary.created += 1;
                }
            }
        }

        tracing::info!(
            connection = %connection.id,
            created = summary.created,
            updated = summary.updated,
            "accounts refreshed"
        );
        Ok(summary)
    }

    pub fn list_accounts(&self, user_id: i64, filter: &AccountFilter) -> Result<Vec<AccountListing>> {
        self.repository.list_accounts(user_id, filter)
    }

    /// Accounts and balances of every active connection, straight from the
    /// banks
    ///
    /// A bank that fails is left out of the result.
    pub fn live_accounts(&self, user_id: i64) -> Result<Vec<LiveBankAccounts>> {
        let connections = self
            .repository
            .list_connections(user_id, &ConnectionFilter::default())?;

        let mut result = Vec::new();
        for connection in connections
            .iter()
            .filter(|c| c.status == ConnectionStatus::Active)
        {
            let fetched = self
                .bank(&connection.bank_name)
                .and_then(|bank| self.fetch_with_balances(&bank, connection));
            match fetched {
                Ok(accounts) => result.push(LiveBankAccounts {
                    name: connection.bank_name.clone(),
                    account: accounts
                        .into_iter()
                        .map(|(mut record, balance)| {
                            if let Some(fields) = record.as_object_mut() {
                                fields.remove("balance");
                            }
                            LiveAccount { record, balance }
                        })
                        .collect(),
                }),
                Err(e) => tracing::warn!(
                    bank = %connection.bank_name,
                    connection = %connection.id,
                    "skipping bank in live accounts: {}",
                    e
                ),
            }
        }
        Ok(result)
    }

    /// Raw account records paired with their balances
    ///
    /// Records without an account id are dropped; a failed balance fetch
    /// yields an empty list.
    fn fetch_with_balances(
        &self,
        bank: &BankConfig,
        connection: &Connection,
    ) -> Result<Vec<(JsonValue, Vec<JsonValue>)>> {
        let consent_id = connection.active_consent().ok_or_else(|| {
            Error::ConsentRequired(format!("connection {} is not active", connection.id))
        })?;
        let token = self.tokens.token_for(bank)?;
        let access = ConsentAccess {
            token: &token,
            consent_id,
            bank_client_id: &connection.bank_client_id,
        };

        let accounts = self.api.get_accounts(bank, access).map_err(|e| {
            self.tokens.forget_if_unauthorized(bank, &e);
            e
        })?;

        let mut result = Vec::with_capacity(accounts.len());
        for record in accounts {
            let Some(account_id) = record
                .get("accountId")
                .and_then(JsonValue::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
            else {
                continue;
            };

            let balances = self
                .api
                .get_balances(bank, access, &account_id)
                .unwrap_or_else(|e| {
                    tracing::warn!(bank = %bank.name, account = %account_id, "balance fetch failed: {}", e);
                    Vec::new()
                });
            result.push((record, balances));
        }
        Ok(result)
    }

    fn bank(&self, bank_name: &str) -> Result<BankConfig> {
        self.repository
            .get_bank(bank_name)?
            .ok_or_else(|| Error::not_found(format!("bank '{}'", bank_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::adapters::duckdb::DuckDbRepository;
    use crate::adapters::memory::InMemoryTokenStore;
    use crate::adapters::open_banking::OpenBankingClient;
    use crate::adapters::open_banking_mock::{MockBankServer, MockConfig};

    fn setup(
        config: MockConfig,
    ) -> (TempDir, MockBankServer, Arc<DuckDbRepository>, AccountService) {
        let dir = TempDir::new().unwrap();
        let server = MockBankServer::start(config).unwrap();
        let repository = Arc::new(DuckDbRepository::new(&dir.path().join("finlink.duckdb")).unwrap());
        repository.ensure_schema().unwrap();
        repository
            .upsert_bank(&BankConfig::new("vbank", "team1", "secret", server.base_url()))
            .unwrap();

        let api: Arc<dyn OpenBankingApi> = Arc::new(OpenBankingClient::new().unwrap());
        let tokens = Arc::new(TokenService::new(
            repository.clone(),
            api.clone(),
            Arc::new(InMemoryTokenStore::new()),
        ));
        let service = AccountService::new(repository.clone(), api, tokens);
        (dir, server, repository, service)
    }

    fn active_connection(repository: &DuckDbRepository) -> Connection {
        let connection = Connection::auto_approved(1, "vbank", "team1-1", "consent-1");
        repository.insert_connection(&connection).unwrap();
        connection
    }

    #[test]
    fn test_refresh_creates_then_updates() {
        let (_dir, _server, repository, service) = setup(MockConfig::default());
        let connection = active_connection(&repository);

        let first = service.refresh_accounts(1, connection.id).unwrap();
        assert_eq!(first, RefreshSummary { created: 2, updated: 0 });

        let second = service.refresh_accounts(1, connection.id).unwrap();
        assert_eq!(second, RefreshSummary { created: 0, updated: 2 });

        let listed = service.list_accounts(1, &AccountFilter::default()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].bank_name, "vbank");
        assert_eq!(listed[0].bank_client_id, "team1-1");
        assert!(listed[0].account.balance_data.is_some());
    }

    #[test]
    fn test_refresh_keeps_accounts_when_balances_fail() {
        let (_dir, server, repository, service) = setup(MockConfig {
            fail_balances: true,
            ..Default::default()
        });
        let connection = active_connection(&repository);

        let summary = service.refresh_accounts(1, connection.id).unwrap();
        assert_eq!(summary, RefreshSummary { created: 2, updated: 0 });
        assert_eq!(server.requests_to("/accounts/acc-1/balances").len(), 1);

        let listed = service.list_accounts(1, &AccountFilter::default()).unwrap();
        assert_eq!(listed.len(), 2);
        for listing in &listed {
            assert_eq!(listing.account.balance_data, Some(serde_json::json!([])));
        }
    }

    #[test]
    fn test_refresh_requires_active_connection() {
        let (_dir, server, repository, service) = setup(MockConfig::default());
        let connection = Connection::awaiting_authorization(1, "vbank", "team1-1", "req-1");
        repository.insert_connection(&connection).unwrap();

        let err = service.refresh_accounts(1, connection.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(server.requests().is_empty());
    }

    #[test]
    fn test_refresh_sends_consent_headers() {
        let (_dir, server, repository, service) = setup(MockConfig {
            num_accounts: 1,
            ..Default::default()
        });
        let connection = active_connection(&repository);
        service.refresh_accounts(1, connection.id).unwrap();

        let request = &server.requests_to("/accounts")[0];
        assert_eq!(request.header("x-consent-id"), Some("consent-1"));
        assert_eq!(request.header("x-requesting-bank"), Some("team1"));
        assert_eq!(request.query_param("client_id").as_deref(), Some("team1-1"));
    }

    #[test]
    fn test_live_accounts_skip_failing_bank() {
        let (_dir, _server, repository, service) = setup(MockConfig {
            fail_data: true,
            ..Default::default()
        });
        active_connection(&repository);

        let live = service.live_accounts(1).unwrap();
        assert!(live.is_empty());
    }

    #[test]
    fn test_live_accounts_include_balances() {
        let (_dir, _server, repository, service) = setup(MockConfig::default());
        active_connection(&repository);

        let live = service.live_accounts(1).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "vbank");
        assert_eq!(live[0].account.len(), 2);
        assert_eq!(live[0].account[0].balance.len(), 1);
        assert_eq!(live[0].account[0].record["accountId"], "acc-1");
    }
}
