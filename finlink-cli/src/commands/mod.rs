//! CLI command implementations

pub mod accounts;
pub mod banks;
pub mod connections;
pub mod logs;
pub mod transactions;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use finlink_core::{Error, FinlinkContext, LogEvent, LoggingService};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let finlink_dir = get_finlink_dir().ok()?;
    std::fs::create_dir_all(&finlink_dir).ok()?;
    LoggingService::new(&finlink_dir, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Record a failed command with the error kind, never with account data
pub fn log_failure(logger: &Option<LoggingService>, command: &str, error: &anyhow::Error) {
    let mut event = LogEvent::new(format!("{}_failed", command)).with_command(command);
    match error.downcast_ref::<Error>() {
        Some(Error::UpstreamAuth { bank, status, .. }) => {
            event = event
                .with_bank(bank)
                .with_error("bank token request failed")
                .with_error_details(format!("status: {:?}", status));
        }
        Some(Error::UpstreamRequest {
            bank,
            status,
            timed_out,
            ..
        }) => {
            event = event
                .with_bank(bank)
                .with_error("bank request failed")
                .with_error_details(format!("status: {:?}, timed out: {}", status, timed_out));
        }
        Some(Error::NotFound(_)) => event = event.with_error("not found"),
        Some(Error::ConsentRequired(_)) => event = event.with_error("consent required"),
        Some(Error::Validation(msg)) | Some(Error::Config(msg)) => event = event.with_error(msg),
        Some(Error::Database(msg)) => event = event.with_error(format!("database: {}", msg)),
        _ => event = event.with_error(error.to_string()),
    }
    log_event(logger, event);
}

/// Get the Finlink data directory from environment or default
pub fn get_finlink_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FINLINK_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".finlink"))
        .ok_or_else(|| anyhow!("Could not find home directory; set FINLINK_DIR"))
}

/// Get or create the Finlink context
pub fn get_context() -> Result<FinlinkContext> {
    let finlink_dir = get_finlink_dir()?;
    std::fs::create_dir_all(&finlink_dir)
        .with_context(|| format!("Failed to create finlink directory: {:?}", finlink_dir))?;

    FinlinkContext::new(&finlink_dir).context("Failed to initialize finlink context")
}

/// The `--user` flag if given, else the configured user
pub fn resolve_user(ctx: &FinlinkContext, user: Option<i64>) -> i64 {
    user.unwrap_or(ctx.config.user_id)
}
