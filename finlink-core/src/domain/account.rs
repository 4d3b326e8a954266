//! Account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A bank account stored for a connection
///
/// `api_account_id` is the bank-assigned identifier and is unique per
/// connection. Owner and balance data are kept as the bank sent them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub api_account_id: String,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub account_type: Option<String>,
    pub account_subtype: Option<String>,
    pub nickname: Option<String>,
    pub opening_date: Option<String>,
    /// Raw owner records (`account` array of the bank's account object)
    pub owner_data: Option<JsonValue>,
    /// Raw balance records from the balances endpoint
    pub balance_data: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an account from a bank record
    pub fn from_record(
        connection_id: Uuid,
        record: &BankAccountRecord,
        balances: Vec<JsonValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            connection_id,
            api_account_id: record.account_id.clone(),
            status: record.status.clone(),
            currency: record.currency.clone(),
            account_type: record.account_type.clone(),
            account_subtype: record.account_sub_type.clone(),
            nickname: record.nickname.clone(),
            opening_date: record.opening_date.clone(),
            owner_data: record.owner_data(),
            balance_data: Some(JsonValue::Array(balances)),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the mutable fields from a newer bank record
    ///
    /// Type, subtype and opening date are fixed once the account is stored.
    pub fn apply_record(&mut self, record: &BankAccountRecord, balances: Vec<JsonValue>) {
        self.status = record.status.clone();
        self.currency = record.currency.clone();
        self.nickname = record.nickname.clone();
        self.owner_data = record.owner_data();
        self.balance_data = Some(JsonValue::Array(balances));
        self.updated_at = Utc::now();
    }
}

/// A stored account together with the bank it was fetched from
#[derive(Debug, Clone, Serialize)]
pub struct AccountListing {
    #[serde(flatten)]
    pub account: Account,
    pub bank_name: String,
    pub bank_client_id: String,
}

/// Account object as returned by a bank's `/accounts` endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountRecord {
    pub account_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default, rename = "accountSubType")]
    pub account_sub_type: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub opening_date: Option<String>,
    /// Owner records, e.g. `[{"name": "...", "identification": "..."}]`
    #[serde(default)]
    pub account: Option<JsonValue>,
}

impl BankAccountRecord {
    /// Parse a raw account object, `None` when it has no usable `accountId`
    pub fn parse(value: JsonValue) -> Option<BankAccountRecord> {
        match serde_json::from_value::<BankAccountRecord>(value) {
            Ok(record) if !record.account_id.is_empty() => Some(record),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Skipping account record: {}", e);
                None
            }
        }
    }

    fn owner_data(&self) -> Option<JsonValue> {
        self.account.clone().filter(|v| !v.is_null())
    }
}

/// Account holder name from the first owner record of the first account
///
/// Returns `None` whenever the shape is not what banks usually send.
pub fn display_name(accounts: &[JsonValue]) -> Option<String> {
    accounts
        .first()?
        .get("account")?
        .as_array()?
        .first()?
        .get("name")?
        .as_str()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Live view of one account with its balances, fetched straight from the bank
#[derive(Debug, Clone, Serialize)]
pub struct LiveAccount {
    #[serde(flatten)]
    pub record: JsonValue,
    pub balance: Vec<JsonValue>,
}

/// Live accounts of one connected bank
#[derive(Debug, Clone, Serialize)]
pub struct LiveBankAccounts {
    pub name: String,
    pub account: Vec<LiveAccount>,
}
