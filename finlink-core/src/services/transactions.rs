//! Transaction service - on-demand transactions and turnover of stored accounts

use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, Connection, Period, Transaction, Turnover, TurnoverSummary};
use crate::ports::{ConsentAccess, Repository};
use crate::services::{TokenService, TransactionAggregator};

pub struct TransactionService {
    repository: Arc<dyn Repository>,
    tokens: Arc<TokenService>,
    aggregator: TransactionAggregator,
}

impl TransactionService {
    pub fn new(
        repository: Arc<dyn Repository>,
        tokens: Arc<TokenService>,
        aggregator: TransactionAggregator,
    ) -> Self {
        Self {
            repository,
            tokens,
            aggregator,
        }
    }

    /// All transactions of a stored account booked within `period`
    ///
    /// `bank_name` narrows the lookup when the same account id is stored
    /// for several banks.
    pub fn list_transactions(
        &self,
        user_id: i64,
        api_account_id: &str,
        bank_name: Option<&str>,
        period: &Period,
    ) -> Result<Vec<Transaction>> {
        let (_, transactions) = self.fetch(user_id, api_account_id, bank_name, period)?;
        Ok(transactions)
    }

    /// Credit and debit totals of a stored account over `period`
    pub fn turnover(
        &self,
        user_id: i64,
        api_account_id: &str,
        bank_name: Option<&str>,
        period: &Period,
    ) -> Result<Turnover> {
        let (account, transactions) = self.fetch(user_id, api_account_id, bank_name, period)?;
        let summary = TurnoverSummary::summarize(&transactions, account.currency.as_deref());

        Ok(Turnover {
            account_id: account.api_account_id,
            total_credit: summary.total_credit,
            total_debit: summary.total_debit,
            currency: summary.currency,
            period_from: period.from,
            period_to: period.to,
        })
    }

    fn fetch(
        &self,
        user_id: i64,
        api_account_id: &str,
        bank_name: Option<&str>,
        period: &Period,
    ) -> Result<(Account, Vec<Transaction>)> {
        let (account, connection) = self.resolve(user_id, api_account_id, bank_name)?;
        let consent_id = connection.active_consent().ok_or_else(|| {
            Error::ConsentRequired(format!(
                "connection to '{}' is {}, not active",
                connection.bank_name, connection.status
            ))
        })?;
        let bank = self
            .repository
            .get_bank(&connection.bank_name)?
            .ok_or_else(|| Error::not_found(format!("bank '{}'", connection.bank_name)))?;

        let token = self.tokens.token_for(&bank)?;
        let access = ConsentAccess {
            token: &token,
            consent_id,
            bank_client_id: &connection.bank_client_id,
        };
        let transactions = self
            .aggregator
            .fetch_all(&bank, access, &account.api_account_id, period)
            .map_err(|e| {
                self.tokens.forget_if_unauthorized(&bank, &e);
                e
            })?;
        Ok((account, transactions))
    }

    fn resolve(
        &self,
        user_id: i64,
        api_account_id: &str,
        bank_name: Option<&str>,
    ) -> Result<(Account, Connection)> {
        self.repository
            .find_user_account(user_id, api_account_id, bank_name)?
            .ok_or_else(|| match bank_name {
                Some(bank) => Error::not_found(format!("account '{}' at '{}'", api_account_id, bank)),
                None => Error::not_found(format!("account '{}'", api_account_id)),
            })
    }
}
