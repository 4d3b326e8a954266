//! Transaction aggregator - paginated transaction fetch
//!
//! Banks page transaction listings but do not agree on how the end is
//! signalled: some return an empty page, others keep answering the last
//! page. The aggregator walks pages from 1 and stops on an empty page or on
//! a page that brings no transaction id it has not seen before.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{BankConfig, ParsedTransaction, Period, Transaction};
use crate::ports::{ConsentAccess, OpenBankingApi, PageQuery};

/// Largest page size banks accept
pub const MAX_PAGE_SIZE: u32 = 100;

pub struct TransactionAggregator {
    api: Arc<dyn OpenBankingApi>,
    page_size: u32,
}

impl TransactionAggregator {
    pub fn new(api: Arc<dyn OpenBankingApi>) -> Self {
        Self {
            api,
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Aggregator requesting `page_size` transactions per page (1..=100)
    pub fn with_page_size(api: Arc<dyn OpenBankingApi>, page_size: u32) -> Result<Self> {
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::validation(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        Ok(Self { api, page_size })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch every transaction of an account booked within `period`
    ///
    /// Transactions keep the order the bank returned them in; a transaction
    /// id seen on an earlier page is dropped. Records without an id or that
    /// fail to parse are skipped.
    pub fn fetch_all(
        &self,
        bank: &BankConfig,
        access: ConsentAccess<'_>,
        account_id: &str,
        period: &Period,
    ) -> Result<Vec<Transaction>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut transactions = Vec::new();
        let mut page = 1u32;

        loop {
            let query = PageQuery {
                page,
                limit: self.page_size,
                period,
            };
            let raw = self
                .api
                .get_transactions_page(bank, access, account_id, query)?;
            if raw.is_empty() {
                break;
            }

            let mut new_ids = 0usize;
            for value in &raw {
                let parsed = ParsedTransaction::parse(value);
                let Some(id) = parsed.transaction_id() else {
                    tracing::debug!(account = %account_id, page, "skipping transaction without id");
                    continue;
                };
                if !seen.insert(id.to_string()) {
                    continue;
                }
                new_ids += 1;

                match parsed {
                    ParsedTransaction::Valid(tx) if period.contains(tx.booking_date_time) => {
                        transactions.push(tx)
                    }
                    ParsedTransaction::Valid(_) => {}
                    ParsedTransaction::Malformed {
                        transaction_id,
                        reason,
                    } => tracing::debug!(
                        account = %account_id,
                        transaction = ?transaction_id,
                        "skipping malformed transaction: {}",
                        reason
                    ),
                }
            }

            if new_ids == 0 {
                tracing::debug!(account = %account_id, page, "page repeated known transactions");
                break;
            }
            page += 1;
        }

        tracing::debug!(
            account = %account_id,
            pages = page,
            count = transactions.len(),
            "fetched transactions"
        );
        Ok(transactions)
    }
}
