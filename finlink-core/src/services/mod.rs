//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod accounts;
mod aggregator;
mod consent;
pub mod logging;
pub mod migration;
mod token;
mod transactions;

pub use accounts::{AccountService, RefreshSummary};
pub use aggregator::{TransactionAggregator, MAX_PAGE_SIZE};
pub use consent::{ConnectionService, DeleteOutcome, InitiateOutcome, StatusOutcome};
pub use logging::{LogEntry, LogEvent, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use token::TokenService;
pub use transactions::TransactionService;
