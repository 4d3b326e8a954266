//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod open_banking;
mod repository;
mod token_store;

pub use open_banking::{
    ConsentAccess, ConsentRequest, ConsentRequestOutcome, ConsentState, OpenBankingApi, PageQuery,
    RevokeOutcome, CONSENT_PERMISSIONS,
};
pub use repository::{AccountFilter, ConnectionFilter, Repository};
pub use token_store::TokenStore;
