//! Connection commands - connect, status, disconnect and list

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use uuid::Uuid;

use finlink_core::{Connection, ConnectionFilter, ConnectionStatus, InitiateOutcome, StatusOutcome};

use super::{get_context, resolve_user};
use crate::output;

fn status_label(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Active => status.as_str().green().to_string(),
        ConnectionStatus::AwaitingAuthorization => status.as_str().yellow().to_string(),
        ConnectionStatus::Rejected | ConnectionStatus::Revoked => status.as_str().red().to_string(),
        ConnectionStatus::Other(s) => s.dimmed().to_string(),
    }
}

fn print_connection(connection: &Connection) {
    println!("  ID:        {}", connection.id);
    println!("  Bank:      {}", connection.bank_name);
    println!("  Client ID: {}", connection.bank_client_id);
    println!("  Status:    {}", status_label(&connection.status));
    if let Some(name) = &connection.full_name {
        println!("  Holder:    {}", name);
    }
}

pub fn connect(user: Option<i64>, bank: &str, client_id: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user_id = resolve_user(&ctx, user);
    let outcome = ctx.connection_service.initiate(user_id, bank, client_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        InitiateOutcome::AlreadyInitiated(_) => {
            output::info("A connection for this bank and client id already exists.")
        }
        InitiateOutcome::AutoApproved(_) => output::success("Consent granted."),
        InitiateOutcome::AwaitingAuthorization(c) => {
            output::warning("Consent requested. Approve it in your bank, then run:");
            println!("  finlink status {}", c.id);
        }
    }
    print_connection(outcome.connection());
    Ok(())
}

pub fn status(user: Option<i64>, connection_id: Uuid, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user_id = resolve_user(&ctx, user);
    let outcome = ctx.connection_service.check_status(user_id, connection_id)?;

    if json {
        let accounts = match &outcome {
            StatusOutcome::Approved { accounts, .. } => accounts.clone(),
            _ => Vec::new(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "connection": outcome.connection(),
                "accounts": accounts,
            }))?
        );
        return Ok(());
    }

    match &outcome {
        StatusOutcome::Approved { accounts, .. } => {
            output::success(&format!("Consent active, {} account(s) available.", accounts.len()));
            println!("Store them with: finlink accounts refresh {}", connection_id);
        }
        StatusOutcome::Rejected(_) => output::error("Consent was rejected by the bank."),
        StatusOutcome::Pending(_) => output::warning("Consent is not authorized yet."),
        StatusOutcome::Final(_) => output::info("Connection is no longer checked with the bank."),
    }
    print_connection(outcome.connection());
    Ok(())
}

pub fn disconnect(user: Option<i64>, connection_id: Uuid, force: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user_id = resolve_user(&ctx, user);
    let connection = ctx.connection_service.get_connection(user_id, connection_id)?;

    if !force && !json {
        use dialoguer::Confirm;
        if !Confirm::new()
            .with_prompt(format!(
                "Disconnect {} ({}) and delete its stored accounts?",
                connection.bank_name, connection.bank_client_id
            ))
            .default(false)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let outcome = ctx.connection_service.delete(user_id, connection_id)?;

    if json {
        println!(
            "{}",
            json!({"deleted": outcome.connection.id, "revoked": outcome.revoked})
        );
    } else {
        output::success(&format!("Disconnected {}", outcome.connection.bank_name));
        if !outcome.revoked {
            output::warning("The bank did not confirm the revocation; revoke it in your bank if needed.");
        }
    }
    Ok(())
}

pub fn list(
    user: Option<i64>,
    bank: Option<String>,
    client_id: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let user_id = resolve_user(&ctx, user);
    let filter = ConnectionFilter {
        bank_name: bank,
        bank_client_id: client_id,
    };
    let connections = ctx.connection_service.list_connections(user_id, &filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&connections)?);
        return Ok(());
    }

    if connections.is_empty() {
        println!("No connections found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Bank", "Client ID", "Status", "Holder", "Updated"]);
    for c in &connections {
        table.add_row(vec![
            c.id.to_string(),
            c.bank_name.clone(),
            c.bank_client_id.clone(),
            status_label(&c.status),
            c.full_name.clone().unwrap_or_default(),
            c.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    println!("{}", table);
    Ok(())
}
