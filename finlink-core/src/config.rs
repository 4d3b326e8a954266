//! Configuration management
//!
//! Settings live in `settings.json` in the data directory:
//! ```json
//! {
//!   "app": { "requestingBank": "FinApp", "userId": 1, "requestTimeoutSecs": 30, "pageSize": 100 },
//!   "banks": [
//!     { "name": "vbank", "clientId": "team1", "clientSecret": "...",
//!       "baseUrl": "https://vbank.example", "autoApprove": true }
//!   ]
//! }
//! ```
//! A bank without `clientSecret` takes it from `FINLINK_<NAME>_CLIENT_SECRET`
//! or `FINLINK_CLIENT_SECRET`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::BankConfig;
use crate::services::MAX_PAGE_SIZE;

pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_REQUESTING_BANK: &str = "FinApp";
const DEFAULT_USER_ID: i64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    /// Kept raw so secrets and unknown bank fields survive a save
    #[serde(default)]
    banks: Vec<serde_json::Value>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requesting_bank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BankSettings {
    name: String,
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    base_url: String,
    #[serde(default)]
    auto_approve: bool,
}

impl BankSettings {
    fn into_bank(self) -> BankConfig {
        let client_secret = self
            .client_secret
            .filter(|s| !s.is_empty())
            .or_else(|| secret_from_env(&self.name))
            .unwrap_or_default();

        let mut bank = BankConfig::new(self.name, self.client_id, client_secret, self.base_url);
        bank.auto_approve = self.auto_approve;
        bank
    }
}

fn secret_from_env(bank_name: &str) -> Option<String> {
    let per_bank = format!(
        "FINLINK_{}_CLIENT_SECRET",
        bank_name.to_uppercase().replace('-', "_")
    );
    std::env::var(per_bank)
        .or_else(|_| std::env::var("FINLINK_CLIENT_SECRET"))
        .ok()
        .filter(|s| !s.is_empty())
}

/// Finlink configuration (resolved view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Name sent as `requesting_bank` in consent requests
    pub requesting_bank: String,
    /// User whose connections the CLI operates on
    pub user_id: i64,
    pub request_timeout_secs: u64,
    pub page_size: u32,
    pub banks: Vec<BankConfig>,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            requesting_bank: DEFAULT_REQUESTING_BANK.to_string(),
            user_id: DEFAULT_USER_ID,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_size: MAX_PAGE_SIZE,
            banks: Vec::new(),
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// A missing settings file yields defaults. `FINLINK_USER_ID` and
    /// `FINLINK_REQUEST_TIMEOUT_SECS` override the file.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {:?}", settings_path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings file {:?}", settings_path))?
        } else {
            SettingsFile::default()
        };

        let banks = raw
            .banks
            .iter()
            .map(|value| {
                serde_json::from_value::<BankSettings>(value.clone())
                    .map(BankSettings::into_bank)
                    .context("Invalid bank entry in settings")
            })
            .collect::<Result<Vec<_>>>()?;

        let user_id = match env_override::<i64>("FINLINK_USER_ID")? {
            Some(id) => id,
            None => raw.app.user_id.unwrap_or(DEFAULT_USER_ID),
        };
        let request_timeout_secs = match env_override::<u64>("FINLINK_REQUEST_TIMEOUT_SECS")? {
            Some(secs) => secs,
            None => raw.app.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let config = Self {
            requesting_bank: raw
                .app
                .requesting_bank
                .clone()
                .unwrap_or_else(|| DEFAULT_REQUESTING_BANK.to_string()),
            user_id,
            request_timeout_secs,
            page_size: raw.app.page_size.unwrap_or(MAX_PAGE_SIZE),
            banks,
            _raw_settings: raw,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to the data directory
    ///
    /// Only the app settings are written back; banks and any settings Finlink
    /// does not manage are preserved as found on disk.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_else(|_| self._raw_settings.clone())
        } else {
            self._raw_settings.clone()
        };

        settings.app.requesting_bank = Some(self.requesting_bank.clone());
        settings.app.user_id = Some(self.user_id);
        settings.app.request_timeout_secs = Some(self.request_timeout_secs);
        settings.app.page_size = Some(self.page_size);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.requesting_bank.trim().is_empty() {
            bail!("app.requestingBank cannot be empty");
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            bail!(
                "app.pageSize must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                self.page_size
            );
        }
        if self.request_timeout_secs == 0 {
            bail!("app.requestTimeoutSecs must be greater than zero");
        }

        let mut names = HashSet::new();
        for bank in &self.banks {
            if let Err(reason) = bank.validate() {
                bail!("invalid bank '{}': {}", bank.name, reason);
            }
            if !names.insert(bank.name.as_str()) {
                bail!("bank '{}' is configured more than once", bank.name);
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", name, value)),
        _ => Ok(None),
    }
}
