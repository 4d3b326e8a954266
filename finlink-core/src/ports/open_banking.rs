//! Open Banking API port
//!
//! Defines the calls Finlink makes to a bank. The HTTP adapter implements it
//! against the real endpoints; tests substitute scripted fakes.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::domain::result::Result;
use crate::domain::{BankConfig, ConsentLookup, IssuedToken, Period};

/// Permissions requested for every consent
pub const CONSENT_PERMISSIONS: [&str; 3] =
    ["ReadAccountsDetail", "ReadBalances", "ReadTransactionsDetail"];

/// Body of a consent request
#[derive(Debug, Clone, Serialize)]
pub struct ConsentRequest {
    /// The user's client id at the bank
    pub client_id: String,
    pub permissions: Vec<String>,
    pub reason: String,
    pub requesting_bank: String,
}

impl ConsentRequest {
    pub fn new(bank_client_id: &str, requesting_bank: &str) -> Self {
        Self {
            client_id: bank_client_id.to_string(),
            permissions: CONSENT_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
            reason: format!("Account aggregation for {}", bank_client_id),
            requesting_bank: requesting_bank.to_string(),
        }
    }
}

/// What the bank answered to a consent request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentRequestOutcome {
    /// Consent granted synchronously
    AutoApproved { consent_id: String },
    /// The end user has to approve; poll with the request id
    Pending { request_id: String },
}

/// Consent state reported by the bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentState {
    /// Raw status string, absent if the bank omitted it
    pub status: Option<String>,
    pub consent_id: Option<String>,
}

/// Result of a revocation call; none of these fail the local delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    /// The bank no longer knows the consent (404)
    AlreadyGone,
    Unexpected { status: u16, body: String },
}

/// Credentials for consent-scoped data calls
#[derive(Debug, Clone, Copy)]
pub struct ConsentAccess<'a> {
    pub token: &'a str,
    pub consent_id: &'a str,
    /// The user's client id at the bank
    pub bank_client_id: &'a str,
}

/// One page of a transaction listing
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub period: &'a Period,
}

pub trait OpenBankingApi: Send + Sync {
    /// Exchange the bank's credential pair for a technical token
    fn request_bank_token(&self, bank: &BankConfig) -> Result<IssuedToken>;

    fn request_consent(
        &self,
        bank: &BankConfig,
        token: &str,
        request: &ConsentRequest,
    ) -> Result<ConsentRequestOutcome>;

    fn get_consent(
        &self,
        bank: &BankConfig,
        token: &str,
        lookup: ConsentLookup<'_>,
    ) -> Result<ConsentState>;

    /// Revoke a consent or pending request; transport failures are errors
    fn revoke_consent(&self, bank: &BankConfig, id: &str) -> Result<RevokeOutcome>;

    /// Raw account objects (`data.account`)
    fn get_accounts(&self, bank: &BankConfig, access: ConsentAccess<'_>) -> Result<Vec<JsonValue>>;

    /// Raw balance objects (`data.balance`)
    fn get_balances(
        &self,
        bank: &BankConfig,
        access: ConsentAccess<'_>,
        account_id: &str,
    ) -> Result<Vec<JsonValue>>;

    /// Raw transaction objects of one page (`data.transaction`)
    fn get_transactions_page(
        &self,
        bank: &BankConfig,
        access: ConsentAccess<'_>,
        account_id: &str,
        query: PageQuery<'_>,
    ) -> Result<Vec<JsonValue>>;
}
