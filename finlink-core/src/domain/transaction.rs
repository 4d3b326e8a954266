//! Transaction domain model
//!
//! Transactions are never stored locally. They are read page by page from
//! the bank and parsed into [`ParsedTransaction`] so that one malformed
//! record does not fail a whole fetch.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Amount with its currency, exact decimal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
}

/// Direction of a transaction as reported by the bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditDebit {
    Credit,
    Debit,
    Other(String),
}

impl CreditDebit {
    pub fn parse(indicator: &str) -> Self {
        match indicator.trim().to_lowercase().as_str() {
            "credit" => Self::Credit,
            "debit" => Self::Debit,
            _ => Self::Other(indicator.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Credit => "Credit",
            Self::Debit => "Debit",
            Self::Other(s) => s,
        }
    }
}

impl Serialize for CreditDebit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CreditDebit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransactionCode {
    pub code: String,
}

/// A booked or pending transaction on a bank account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub account_id: String,
    pub transaction_id: String,
    pub amount: Money,
    pub credit_debit_indicator: CreditDebit,
    pub status: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub booking_date_time: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub value_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_information: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_transaction_code: Option<BankTransactionCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Outcome of reading one raw transaction record
#[derive(Debug, Clone)]
pub enum ParsedTransaction {
    Valid(Transaction),
    /// The record could not be read; `transaction_id` is kept when present
    Malformed {
        transaction_id: Option<String>,
        reason: String,
    },
}

impl ParsedTransaction {
    pub fn parse(raw: &JsonValue) -> Self {
        match serde_json::from_value::<Transaction>(raw.clone()) {
            Ok(tx) if tx.transaction_id.is_empty() => Self::Malformed {
                transaction_id: None,
                reason: "empty transactionId".to_string(),
            },
            Ok(tx) => Self::Valid(tx),
            Err(e) => Self::Malformed {
                transaction_id: raw_transaction_id(raw),
                reason: e.to_string(),
            },
        }
    }

    /// Identifier used for de-duplication, if one could be read
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::Valid(tx) => Some(&tx.transaction_id),
            Self::Malformed { transaction_id, .. } => transaction_id.as_deref(),
        }
    }
}

fn raw_transaction_id(raw: &JsonValue) -> Option<String> {
    raw.get("transactionId")
        .and_then(JsonValue::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Deserialize amount that can be number or string
fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    let text = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s,
        _ => return Err(D::Error::custom("expected number or string for amount")),
    };
    let text = text.trim();
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| D::Error::custom(format!("invalid decimal '{}': {}", text, e)))
}

/// Deserialize an RFC 3339 timestamp; offset-less values are taken as UTC
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", s)))
}

/// Parse a bank timestamp, accepting RFC 3339 or a naive ISO datetime (UTC)
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
