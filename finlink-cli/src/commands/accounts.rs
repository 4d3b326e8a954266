//! Accounts commands - stored and live accounts

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use finlink_core::AccountFilter;

use super::{get_context, resolve_user};
use crate::output;

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// List stored accounts
    List {
        /// Only accounts at this bank
        #[arg(long)]
        bank: Option<String>,
        /// Only this bank account ID
        #[arg(long)]
        account_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch a connection's accounts and balances and store them
    Refresh {
        /// Connection ID
        connection_id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show accounts of every active connection straight from the banks
    Live {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// "1000.00 RUB" from the first balance record, if it has the usual shape
fn first_balance(balances: Option<&JsonValue>) -> String {
    balances
        .and_then(JsonValue::as_array)
        .and_then(|b| b.first())
        .and_then(|b| b.get("amount"))
        .map(|amount| {
            let value = match amount.get("amount") {
                Some(JsonValue::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let currency = amount
                .get("currency")
                .and_then(JsonValue::as_str)
                .unwrap_or_default();
            format!("{} {}", value, currency).trim().to_string()
        })
        .unwrap_or_default()
}

pub fn run(user: Option<i64>, command: AccountsCommands) -> Result<()> {
    let ctx = get_context()?;
    let user_id = resolve_user(&ctx, user);

    match command {
        AccountsCommands::List {
            bank,
            account_id,
            json,
        } => {
            let filter = AccountFilter {
                bank_name: bank,
                api_account_id: account_id,
            };
            let accounts = ctx.account_service.list_accounts(user_id, &filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
                return Ok(());
            }
            if accounts.is_empty() {
                println!("No accounts stored. Run 'finlink accounts refresh <connection-id>'.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Bank", "Account ID", "Nickname", "Currency", "Status", "Balance"]);
            for listing in &accounts {
                let account = &listing.account;
                table.add_row(vec![
                    listing.bank_name.clone(),
                    account.api_account_id.clone(),
                    account.nickname.clone().unwrap_or_default(),
                    account.currency.clone().unwrap_or_default(),
                    account.status.clone().unwrap_or_default(),
                    first_balance(account.balance_data.as_ref()),
                ]);
            }
            println!("{}", table);
        }
        AccountsCommands::Refresh {
            connection_id,
            json,
        } => {
            let summary = ctx.account_service.refresh_accounts(user_id, connection_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                output::success(&format!(
                    "Accounts refreshed: {} new, {} updated",
                    summary.created, summary.updated
                ));
            }
        }
        AccountsCommands::Live { json } => {
            let banks = ctx.account_service.live_accounts(user_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&banks)?);
                return Ok(());
            }
            if banks.is_empty() {
                println!("No active connections.");
                return Ok(());
            }

            for bank in &banks {
                println!("{}", bank.name.bold());
                let mut table = output::create_table();
                table.set_header(vec!["Account ID", "Nickname", "Currency", "Balance"]);
                for account in &bank.account {
                    let field = |name: &str| {
                        account
                            .record
                            .get(name)
                            .and_then(JsonValue::as_str)
                            .unwrap_or_default()
                            .to_string()
                    };
                    let balance = JsonValue::Array(account.balance.clone());
                    table.add_row(vec![
                        field("accountId"),
                        field("nickname"),
                        field("currency"),
                        first_balance(Some(&balance)),
                    ]);
                }
                println!("{}", table);
            }
        }
    }
    Ok(())
}
