//! Bank technical tokens

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

/// Seconds shaved off the bank-reported lifetime before a token is reused
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token response of a bank's `/auth/bank-token` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// A technical token held in the token store
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Cache an issued token, expiring one margin before the bank says it does
    ///
    /// `None` when the lifetime does not fit a timestamp.
    pub fn from_issued(issued: IssuedToken, now: DateTime<Utc>) -> Option<Self> {
        let lifetime = issued
            .expires_in
            .checked_sub(EXPIRY_MARGIN_SECS)
            .and_then(TimeDelta::try_seconds)?;
        Some(Self {
            expires_at: now.checked_add_signed(lifetime)?,
            token: issued.access_token,
        })
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
