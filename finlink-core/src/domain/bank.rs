//! Bank reference data

use serde::{Deserialize, Serialize};

/// A bank Finlink can connect to
///
/// Immutable reference data: the credential pair identifies Finlink (the
/// requesting bank) towards this bank's Open Banking API.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BankConfig {
    /// Bank identifier, e.g. "vbank"
    pub name: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub base_url: String,
    /// Consent is granted synchronously without end-user interaction
    #[serde(default)]
    pub auto_approve: bool,
}

impl BankConfig {
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: Self::normalize_base_url(&base_url.into()),
            auto_approve: false,
        }
    }

    /// Trim whitespace and trailing slashes so endpoint paths join cleanly
    pub fn normalize_base_url(url: &str) -> String {
        url.trim().trim_end_matches('/').to_string()
    }

    /// Build an absolute endpoint URL from a path starting with '/'
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", Self::normalize_base_url(&self.base_url), path)
    }

    /// Validate bank data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("bank name cannot be empty");
        }
        if self.client_id.trim().is_empty() {
            return Err("bank client id cannot be empty");
        }
        if self.base_url.trim().is_empty() {
            return Err("bank base URL cannot be empty");
        }
        Ok(())
    }
}

// Hand-written so the client secret never reaches logs
impl std::fmt::Debug for BankConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("base_url", &self.base_url)
            .field("auto_approve", &self.auto_approve)
            .finish()
    }
}
