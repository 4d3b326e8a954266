//! Credit/debit turnover over a set of transactions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::transaction::{CreditDebit, Transaction};

/// Currency reported when neither transactions nor the account carry one
pub const UNKNOWN_CURRENCY: &str = "N/A";

/// Credit and debit totals in one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnoverSummary {
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub currency: String,
}

impl TurnoverSummary {
    /// Fold transactions into credit/debit totals
    ///
    /// Indicators other than credit or debit are ignored. The currency is
    /// the first non-empty one seen, then `fallback_currency`, then
    /// [`UNKNOWN_CURRENCY`].
    pub fn summarize<'a, I>(transactions: I, fallback_currency: Option<&str>) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut total_credit = Decimal::ZERO;
        let mut total_debit = Decimal::ZERO;
        let mut currency: Option<&str> = None;

        for tx in transactions {
            if currency.is_none() && !tx.amount.currency.trim().is_empty() {
                currency = Some(tx.amount.currency.trim());
            }
            match tx.credit_debit_indicator {
                CreditDebit::Credit => total_credit += tx.amount.amount,
                CreditDebit::Debit => total_debit += tx.amount.amount,
                CreditDebit::Other(_) => {}
            }
        }

        let currency = currency
            .or(fallback_currency.map(str::trim).filter(|c| !c.is_empty()))
            .unwrap_or(UNKNOWN_CURRENCY)
            .to_string();

        Self {
            total_credit,
            total_debit,
            currency,
        }
    }
}

/// Turnover of one account over a requested period
#[derive(Debug, Clone, Serialize)]
pub struct Turnover {
    pub account_id: String,
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub currency: String,
    /// Bounds exactly as requested (not widened)
    pub period_from: Option<DateTime<Utc>>,
    pub period_to: Option<DateTime<Utc>>,
}
