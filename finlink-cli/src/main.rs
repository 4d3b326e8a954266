//! Finlink CLI - Open Banking account aggregation in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;
mod output;

use commands::{accounts, banks, connections, logs, transactions};

/// Finlink - bank accounts from every bank in one place
#[derive(Parser)]
#[command(name = "finlink", version, about, long_about = None)]
struct Cli {
    /// User to act as (defaults to app.userId in settings.json)
    #[arg(long, global = true, env = "FINLINK_USER_ID")]
    user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured banks
    Banks {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Request account access at a bank
    Connect {
        /// Bank name, e.g. vbank
        bank: String,
        /// Your client id at the bank
        client_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a connection's consent with the bank
    Status {
        /// Connection ID
        connection_id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Revoke a connection's consent and forget it
    Disconnect {
        /// Connection ID
        connection_id: Uuid,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List connections
    Connections {
        /// Only connections to this bank
        #[arg(long)]
        bank: Option<String>,
        /// Only connections for this client id
        #[arg(long)]
        client_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage accounts
    Accounts {
        #[command(subcommand)]
        command: accounts::AccountsCommands,
    },

    /// List transactions of an account
    Transactions {
        /// Bank account ID
        account_id: String,
        #[command(flatten)]
        query: transactions::PeriodArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show credit/debit turnover of an account
    Turnover {
        /// Bank account ID
        account_id: String,
        #[command(flatten)]
        query: transactions::PeriodArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Banks { .. } => "banks",
            Commands::Connect { .. } => "connect",
            Commands::Status { .. } => "status",
            Commands::Disconnect { .. } => "disconnect",
            Commands::Connections { .. } => "connections",
            Commands::Accounts { .. } => "accounts",
            Commands::Transactions { .. } => "transactions",
            Commands::Turnover { .. } => "turnover",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FINLINK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let logger = commands::get_logger();
    let command = cli.command.name();
    if command != "logs" {
        commands::log_event(
            &logger,
            finlink_core::LogEvent::new("command_executed").with_command(command),
        );
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::log_failure(&logger, command, &e);
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let user = cli.user;
    match cli.command {
        Commands::Banks { json } => banks::run(json),
        Commands::Connect {
            bank,
            client_id,
            json,
        } => connections::connect(user, &bank, &client_id, json),
        Commands::Status {
            connection_id,
            json,
        } => connections::status(user, connection_id, json),
        Commands::Disconnect {
            connection_id,
            force,
            json,
        } => connections::disconnect(user, connection_id, force, json),
        Commands::Connections {
            bank,
            client_id,
            json,
        } => connections::list(user, bank, client_id, json),
        Commands::Accounts { command } => accounts::run(user, command),
        Commands::Transactions {
            account_id,
            query,
            json,
        } => transactions::list(user, &account_id, &query, json),
        Commands::Turnover {
            account_id,
            query,
            json,
        } => transactions::turnover(user, &account_id, &query, json),
        Commands::Logs { command } => logs::run(command),
    }
}
