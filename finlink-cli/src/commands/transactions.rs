//! Transactions and turnover commands

use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;

use finlink_core::domain::period::format_bound;
use finlink_core::Period;

use super::{get_context, resolve_user};
use crate::output;

/// Account lookup and booking period shared by transactions and turnover
#[derive(Args)]
pub struct PeriodArgs {
    /// Bank the account belongs to (when the same ID exists at several banks)
    #[arg(long)]
    pub bank: Option<String>,
    /// Earliest booking time (YYYY-MM-DD or ISO 8601)
    #[arg(long)]
    pub from: Option<String>,
    /// Latest booking date, inclusive of the whole day
    #[arg(long)]
    pub to: Option<String>,
}

impl PeriodArgs {
    fn period(&self) -> Result<Period> {
        Period::parse(self.from.as_deref(), self.to.as_deref()).map_err(|e| anyhow!(e))
    }
}

fn describe(period: &Period) -> String {
    match (period.from, period.to) {
        (Some(from), Some(to)) => format!("{} to {}", format_bound(&from), format_bound(&to)),
        (Some(from), None) => format!("since {}", format_bound(&from)),
        (None, Some(to)) => format!("until {}", format_bound(&to)),
        (None, None) => "all time".to_string(),
    }
}

pub fn list(user: Option<i64>, account_id: &str, args: &PeriodArgs, json: bool) -> Result<()> {
    let period = args.period()?;
    let ctx = get_context()?;
    let user_id = resolve_user(&ctx, user);
    let transactions = ctx.transaction_service.list_transactions(
        user_id,
        account_id,
        args.bank.as_deref(),
        &period,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        println!("No transactions {}.", describe(&period));
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Booked", "ID", "Amount", "Currency", "Status", "Description"]);
    for tx in &transactions {
        let amount = match tx.credit_debit_indicator.as_str() {
            "Credit" => format!("+{}", tx.amount.amount).green().to_string(),
            "Debit" => format!("-{}", tx.amount.amount).red().to_string(),
            _ => tx.amount.amount.to_string(),
        };
        table.add_row(vec![
            tx.booking_date_time.format("%Y-%m-%d %H:%M").to_string(),
            tx.transaction_id.clone(),
            amount,
            tx.amount.currency.clone(),
            tx.status.clone(),
            tx.transaction_information.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);
    println!("{} transaction(s), {}", transactions.len(), describe(&period));
    Ok(())
}

pub fn turnover(user: Option<i64>, account_id: &str, args: &PeriodArgs, json: bool) -> Result<()> {
    let period = args.period()?;
    let ctx = get_context()?;
    let user_id = resolve_user(&ctx, user);
    let turnover =
        ctx.transaction_service
            .turnover(user_id, account_id, args.bank.as_deref(), &period)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&turnover)?);
        return Ok(());
    }

    println!("{}", format!("Turnover of {}", turnover.account_id).bold());
    println!("  Period: {}", describe(&period));
    println!(
        "  Credit: {}",
        format!("{} {}", turnover.total_credit, turnover.currency).green()
    );
    println!(
        "  Debit:  {}",
        format!("{} {}", turnover.total_debit, turnover.currency).red()
    );
    Ok(())
}
