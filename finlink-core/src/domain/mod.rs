//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with parsing and validation logic - no I/O or external dependencies.

mod account;
mod bank;
mod connection;
pub mod period;
pub mod result;
mod token;
pub mod transaction;
mod turnover;

pub use account::{display_name, Account, AccountListing, BankAccountRecord, LiveAccount, LiveBankAccounts};
pub use bank::BankConfig;
pub use connection::{BankConsentStatus, Connection, ConnectionStatus, ConsentLookup};
pub use period::Period;
pub use token::{CachedToken, IssuedToken};
pub use transaction::{CreditDebit, Money, ParsedTransaction, Transaction};
pub use turnover::{Turnover, TurnoverSummary, UNKNOWN_CURRENCY};
