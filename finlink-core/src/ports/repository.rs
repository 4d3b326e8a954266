//! Repository port - database abstraction

use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Account, AccountListing, BankConfig, Connection};

/// Optional filters for listing connections
#[derive(Debug, Clone, Default)]
pub struct ConnectionFilter {
    pub bank_name: Option<String>,
    pub bank_client_id: Option<String>,
}

/// Optional filters for listing stored accounts
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub bank_name: Option<String>,
    pub api_account_id: Option<String>,
}

/// Database repository abstraction
///
/// Every connection and account query is scoped to a user id; a record of
/// another user behaves as if it did not exist.
pub trait Repository: Send + Sync {
    // === Banks ===

    /// Insert or replace a bank by name
    fn upsert_bank(&self, bank: &BankConfig) -> Result<()>;

    fn get_bank(&self, name: &str) -> Result<Option<BankConfig>>;

    fn list_banks(&self) -> Result<Vec<BankConfig>>;

    // === Connections ===

    /// Insert a new connection; fails if (user, bank, client id) already exists
    fn insert_connection(&self, connection: &Connection) -> Result<()>;

    /// Persist status, ids and display name of an existing connection
    fn update_connection(&self, connection: &Connection) -> Result<()>;

    fn get_connection(&self, user_id: i64, id: Uuid) -> Result<Option<Connection>>;

    /// Look up a connection by its natural key
    fn find_connection(
        &self,
        user_id: i64,
        bank_name: &str,
        bank_client_id: &str,
    ) -> Result<Option<Connection>>;

    fn list_connections(&self, user_id: i64, filter: &ConnectionFilter) -> Result<Vec<Connection>>;

    /// Delete a connection together with its stored accounts
    fn delete_connection(&self, user_id: i64, id: Uuid) -> Result<()>;

    // === Accounts ===

    fn get_account_by_api_id(&self, connection_id: Uuid, api_account_id: &str)
        -> Result<Option<Account>>;

    fn insert_account(&self, account: &Account) -> Result<()>;

    fn update_account(&self, account: &Account) -> Result<()>;

    fn list_accounts(&self, user_id: i64, filter: &AccountFilter) -> Result<Vec<AccountListing>>;

    /// Find a user's account by bank account id, optionally within one bank
    fn find_user_account(
        &self,
        user_id: i64,
        api_account_id: &str,
        bank_name: Option<&str>,
    ) -> Result<Option<(Account, Connection)>>;
}
