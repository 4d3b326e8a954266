//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository port
//! - Blocking reqwest client for the OpenBankingApi port
//! - A mutex-guarded map for the TokenStore port

pub mod duckdb;
pub mod memory;
pub mod open_banking;

#[cfg(test)]
pub mod open_banking_mock;
