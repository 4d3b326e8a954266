//! Banks command - list configured banks

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let banks = ctx.banks()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&banks)?);
        return Ok(());
    }

    if banks.is_empty() {
        output::warning("No banks configured.");
        println!(
            "Add banks to {}",
            ctx.data_dir.join(finlink_core::config::SETTINGS_FILE).display()
        );
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Bank", "Client ID", "Base URL", "Consent"]);
    for bank in &banks {
        let consent = if bank.auto_approve {
            "auto-approved".green().to_string()
        } else {
            "manual approval".yellow().to_string()
        };
        table.add_row(vec![
            bank.name.clone(),
            bank.client_id.clone(),
            bank.base_url.clone(),
            consent,
        ]);
    }
    println!("{}", table);
    Ok(())
}
