//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection as DbConnection, Row, ToSql};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountListing, BankConfig, Connection, ConnectionStatus};
use crate::ports::{AccountFilter, ConnectionFilter, Repository};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const CONNECTION_COLUMNS: &str = "c.connection_id, c.user_id, c.bank_name, c.bank_client_id, \
     c.request_id, c.consent_id, c.status, c.full_name, c.created_at, c.updated_at";

const ACCOUNT_COLUMNS: &str = "a.account_id, a.connection_id, a.api_account_id, a.status, \
     a.currency, a.account_type, a.account_subtype, a.nickname, a.opening_date, \
     a.owner_data, a.balance_data, a.created_at, a.updated_at";

const ACCOUNT_COLUMN_COUNT: usize = 13;

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Database(err.to_string())
    }
}

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock")
        || lower.contains("file is already open")
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<DbConnection>,
    db_path: PathBuf,
}

impl DuckDbRepository {
    /// Open (or create) the database at `db_path`
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                    });
                }
                Err(e) if is_retryable_error(&e.to_string()) && attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        "Database busy, retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<DbConnection> {
        // Extension autoloading stays off; JSON is compiled in via the "json" feature
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        DbConnection::open_with_flags(db_path, config)
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, DbConnection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    fn query_connections(&self, sql: &str, args: &[&dyn ToSql]) -> Result<Vec<Connection>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| row_to_connection(row, 0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// === Row mapping ===

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_uuid(row: &Row, idx: usize) -> duckdb::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &Row, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_json(row: &Row, idx: usize) -> duckdb::Result<Option<JsonValue>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn to_json_text(value: &Option<JsonValue>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

/// Map CONNECTION_COLUMNS starting at `offset`
fn row_to_connection(row: &Row, offset: usize) -> duckdb::Result<Connection> {
    let status: String = row.get(offset + 6)?;
    Ok(Connection {
        id: get_uuid(row, offset)?,
        user_id: row.get(offset + 1)?,
        bank_name: row.get(offset + 2)?,
        bank_client_id: row.get(offset + 3)?,
        request_id: row.get(offset + 4)?,
        consent_id: row.get(offset + 5)?,
        status: ConnectionStatus::parse(&status),
        full_name: row.get(offset + 7)?,
        created_at: get_timestamp(row, offset + 8)?,
        updated_at: get_timestamp(row, offset + 9)?,
    })
}

/// Map ACCOUNT_COLUMNS starting at `offset`
fn row_to_account(row: &Row, offset: usize) -> duckdb::Result<Account> {
    Ok(Account {
        id: get_uuid(row, offset)?,
        connection_id: get_uuid(row, offset + 1)?,
        api_account_id: row.get(offset + 2)?,
        status: row.get(offset + 3)?,
        currency: row.get(offset + 4)?,
        account_type: row.get(offset + 5)?,
        account_subtype: row.get(offset + 6)?,
        nickname: row.get(offset + 7)?,
        opening_date: row.get(offset + 8)?,
        owner_data: get_json(row, offset + 9)?,
        balance_data: get_json(row, offset + 10)?,
        created_at: get_timestamp(row, offset + 11)?,
        updated_at: get_timestamp(row, offset + 12)?,
    })
}

fn row_to_bank(row: &Row) -> duckdb::Result<BankConfig> {
    Ok(BankConfig {
        name: row.get(0)?,
        client_id: row.get(1)?,
        client_secret: row.get(2)?,
        base_url: row.get(3)?,
        auto_approve: row.get(4)?,
    })
}

impl Repository for DuckDbRepository {
    // === Banks ===

    fn upsert_bank(&self, bank: &BankConfig) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_banks (name, client_id, client_secret, base_url, auto_approve)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (name) DO UPDATE SET
                client_id = EXCLUDED.client_id,
                client_secret = EXCLUDED.client_secret,
                base_url = EXCLUDED.base_url,
                auto_approve = EXCLUDED.auto_approve",
            params![
                bank.name,
                bank.client_id,
                bank.client_secret,
                BankConfig::normalize_base_url(&bank.base_url),
                bank.auto_approve,
            ],
        )?;
        Ok(())
    }

    fn get_bank(&self, name: &str) -> Result<Option<BankConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, client_id, client_secret, base_url, auto_approve
             FROM sys_banks WHERE name = ?",
        )?;
        let mut banks = stmt
            .query_map([name], row_to_bank)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(banks.pop())
    }

    fn list_banks(&self) -> Result<Vec<BankConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, client_id, client_secret, base_url, auto_approve
             FROM sys_banks ORDER BY name",
        )?;
        let banks = stmt
            .query_map([], row_to_bank)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(banks)
    }

    // === Connections ===

    fn insert_connection(&self, connection: &Connection) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_connections (connection_id, user_id, bank_name, bank_client_id,
                                          request_id, consent_id, status, full_name,
                                          created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                connection.id.to_string(),
                connection.user_id,
                connection.bank_name,
                connection.bank_client_id,
                connection.request_id,
                connection.consent_id,
                connection.status.as_str(),
                connection.full_name,
                connection.created_at.to_rfc3339(),
                connection.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_connection(&self, connection: &Connection) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_connections
             SET request_id = ?, consent_id = ?, status = ?, full_name = ?, updated_at = ?
             WHERE connection_id = ? AND user_id = ?",
            params![
                connection.request_id,
                connection.consent_id,
                connection.status.as_str(),
                connection.full_name,
                connection.updated_at.to_rfc3339(),
                connection.id.to_string(),
                connection.user_id,
            ],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("connection {}", connection.id)));
        }
        Ok(())
    }

    fn get_connection(&self, user_id: i64, id: Uuid) -> Result<Option<Connection>> {
        let sql = format!(
            "SELECT {} FROM sys_connections c WHERE c.connection_id = ? AND c.user_id = ?",
            CONNECTION_COLUMNS
        );
        let id = id.to_string();
        Ok(self.query_connections(&sql, params![id, user_id])?.pop())
    }

    fn find_connection(
        &self,
        user_id: i64,
        bank_name: &str,
        bank_client_id: &str,
    ) -> Result<Option<Connection>> {
        let sql = format!(
            "SELECT {} FROM sys_connections c
             WHERE c.user_id = ? AND c.bank_name = ? AND c.bank_client_id = ?",
            CONNECTION_COLUMNS
        );
        Ok(self
            .query_connections(&sql, params![user_id, bank_name, bank_client_id])?
            .pop())
    }

    fn list_connections(&self, user_id: i64, filter: &ConnectionFilter) -> Result<Vec<Connection>> {
        let mut sql = format!(
            "SELECT {} FROM sys_connections c WHERE c.user_id = ?",
            CONNECTION_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![&user_id as &dyn ToSql];
        if let Some(bank_name) = &filter.bank_name {
            sql.push_str(" AND c.bank_name = ?");
            args.push(bank_name);
        }
        if let Some(bank_client_id) = &filter.bank_client_id {
            sql.push_str(" AND c.bank_client_id = ?");
            args.push(bank_client_id);
        }
        sql.push_str(" ORDER BY c.created_at, c.connection_id");
        self.query_connections(&sql, &args)
    }

    fn delete_connection(&self, user_id: i64, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        let id = id.to_string();

        // Accounts first, then the connection; each statement auto-commits
        conn.execute(
            "DELETE FROM sys_accounts WHERE connection_id IN (
                SELECT connection_id FROM sys_connections WHERE connection_id = ? AND user_id = ?
             )",
            params![id, user_id],
        )?;
        conn.execute(
            "DELETE FROM sys_connections WHERE connection_id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        Ok(())
    }

    // === Accounts ===

    fn get_account_by_api_id(
        &self,
        connection_id: Uuid,
        api_account_id: &str,
    ) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_accounts a WHERE a.connection_id = ? AND a.api_account_id = ?",
            ACCOUNT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut accounts = stmt
            .query_map(params![connection_id.to_string(), api_account_id], |row| {
                row_to_account(row, 0)
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(accounts.pop())
    }

    fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_accounts (account_id, connection_id, api_account_id, status, currency,
                                       account_type, account_subtype, nickname, opening_date,
                                       owner_data, balance_data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                account.id.to_string(),
                account.connection_id.to_string(),
                account.api_account_id,
                account.status,
                account.currency,
                account.account_type,
                account.account_subtype,
                account.nickname,
                account.opening_date,
                to_json_text(&account.owner_data),
                to_json_text(&account.balance_data),
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sys_accounts
             SET status = ?, currency = ?, nickname = ?, owner_data = ?, balance_data = ?,
                 updated_at = ?
             WHERE account_id = ?",
            params![
                account.status,
                account.currency,
                account.nickname,
                to_json_text(&account.owner_data),
                to_json_text(&account.balance_data),
                account.updated_at.to_rfc3339(),
                account.id.to_string(),
            ],
        )?;
        Ok(())
    }

    fn list_accounts(&self, user_id: i64, filter: &AccountFilter) -> Result<Vec<AccountListing>> {
        let mut sql = format!(
            "SELECT {}, c.bank_name, c.bank_client_id
             FROM sys_accounts a
             JOIN sys_connections c ON c.connection_id = a.connection_id
             WHERE c.user_id = ?",
            ACCOUNT_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![&user_id as &dyn ToSql];
        if let Some(bank_name) = &filter.bank_name {
            sql.push_str(" AND c.bank_name = ?");
            args.push(bank_name);
        }
        if let Some(api_account_id) = &filter.api_account_id {
            sql.push_str(" AND a.api_account_id = ?");
            args.push(api_account_id);
        }
        sql.push_str(" ORDER BY c.bank_name, a.api_account_id");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let listings = stmt
            .query_map(args.as_slice(), |row| {
                Ok(AccountListing {
                    account: row_to_account(row, 0)?,
                    bank_name: row.get(ACCOUNT_COLUMN_COUNT)?,
                    bank_client_id: row.get(ACCOUNT_COLUMN_COUNT + 1)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(listings)
    }

    fn find_user_account(
        &self,
        user_id: i64,
        api_account_id: &str,
        bank_name: Option<&str>,
    ) -> Result<Option<(Account, Connection)>> {
        let mut sql = format!(
            "SELECT {}, {}
             FROM sys_accounts a
             JOIN sys_connections c ON c.connection_id = a.connection_id
             WHERE c.user_id = ? AND a.api_account_id = ?",
            ACCOUNT_COLUMNS, CONNECTION_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![&user_id as &dyn ToSql, &api_account_id];
        if let Some(bank_name) = &bank_name {
            sql.push_str(" AND c.bank_name = ?");
            args.push(bank_name);
        }
        sql.push_str(" ORDER BY c.created_at LIMIT 1");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut found = stmt
            .query_map(args.as_slice(), |row| {
                Ok((
                    row_to_account(row, 0)?,
                    row_to_connection(row, ACCOUNT_COLUMN_COUNT)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(found.pop())
    }
}
