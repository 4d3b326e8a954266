//! Finlink Core - Open Banking account aggregation
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Connection, Account, Transaction, Turnover, etc.)
//! - **ports**: Trait definitions for external dependencies (Repository, OpenBankingApi, TokenStore)
//! - **services**: Business logic orchestration (consent lifecycle, aggregation, turnover)
//! - **adapters**: Concrete implementations (DuckDB, reqwest, in-memory token store)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use adapters::memory::InMemoryTokenStore;
use adapters::open_banking::OpenBankingClient;
use config::{Config, SETTINGS_FILE};
use ports::{OpenBankingApi, Repository};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    Account, AccountListing, BankConfig, Connection, ConnectionStatus, LiveBankAccounts, Period,
    Transaction, Turnover,
};
pub use ports::{AccountFilter, ConnectionFilter};
pub use services::{
    DeleteOutcome, InitiateOutcome, LogEvent, LoggingService, RefreshSummary, StatusOutcome,
};

pub const DATABASE_FILE: &str = "finlink.duckdb";

/// Main context for Finlink operations
///
/// Holds the configuration, the repository and every service, wired to a
/// single Open Banking client and token store.
pub struct FinlinkContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub repository: Arc<DuckDbRepository>,
    pub token_service: Arc<TokenService>,
    pub connection_service: ConnectionService,
    pub account_service: AccountService,
    pub transaction_service: TransactionService,
}

impl FinlinkContext {
    /// Create a context over the data directory, talking to real banks
    ///
    /// Writes a default settings file on first use.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        if !data_dir.join(SETTINGS_FILE).exists() {
            config
                .save(data_dir)
                .context("Failed to write default settings")?;
        }

        let api = OpenBankingClient::with_timeout(config.request_timeout())?;
        Self::with_api(data_dir, config, Arc::new(api))
    }

    /// Create a context with an explicit Open Banking implementation
    pub fn with_api(data_dir: &Path, config: Config, api: Arc<dyn OpenBankingApi>) -> Result<Self> {
        let db_path = data_dir.join(DATABASE_FILE);
        let repository = Arc::new(DuckDbRepository::new(&db_path)?);
        repository.ensure_schema()?;

        for bank in &config.banks {
            repository
                .upsert_bank(bank)
                .with_context(|| format!("Failed to store bank '{}'", bank.name))?;
        }

        let repo: Arc<dyn Repository> = repository.clone();
        let token_service = Arc::new(TokenService::new(
            Arc::clone(&repo),
            Arc::clone(&api),
            Arc::new(InMemoryTokenStore::new()),
        ));
        let connection_service = ConnectionService::new(
            Arc::clone(&repo),
            Arc::clone(&api),
            Arc::clone(&token_service),
            config.requesting_bank.clone(),
        );
        let account_service = AccountService::new(
            Arc::clone(&repo),
            Arc::clone(&api),
            Arc::clone(&token_service),
        );
        let aggregator = TransactionAggregator::with_page_size(Arc::clone(&api), config.page_size)?;
        let transaction_service =
            TransactionService::new(Arc::clone(&repo), Arc::clone(&token_service), aggregator);

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            repository,
            token_service,
            connection_service,
            account_service,
            transaction_service,
        })
    }

    /// Banks known to this installation
    pub fn banks(&self) -> Result<Vec<BankConfig>> {
        Ok(self.repository.list_banks()?)
    }
}
