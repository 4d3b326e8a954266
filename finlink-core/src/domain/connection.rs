//! Connection (bank consent) domain model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local lifecycle status of a bank connection
///
/// A connection record only exists once it has been initiated, so there is
/// no "uninitiated" variant. Statuses the bank reports that Finlink does not
/// model are mirrored verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    AwaitingAuthorization,
    Active,
    Rejected,
    Revoked,
    Other(String),
}

impl ConnectionStatus {
    /// Parse a stored or bank-reported status (case-insensitive)
    pub fn parse(status: &str) -> Self {
        let normalized = status.trim().to_lowercase();
        match normalized.as_str() {
            "awaiting_authorization" | "awaitingauthorization" => Self::AwaitingAuthorization,
            "active" => Self::Active,
            "rejected" => Self::Rejected,
            "revoked" => Self::Revoked,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AwaitingAuthorization => "awaiting_authorization",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
            Self::Other(s) => s,
        }
    }

    /// Whether polling the bank can still change this status
    pub fn is_pollable(&self) -> bool {
        matches!(self, Self::AwaitingAuthorization | Self::Active)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Consent status as reported by the bank's consent endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankConsentStatus {
    Authorized,
    Rejected,
    /// Any other status, lowercased
    Other(String),
}

impl BankConsentStatus {
    /// Parse the bank's status string; a missing status reads as "unknown"
    pub fn parse(status: Option<&str>) -> Self {
        let normalized = status.unwrap_or("unknown").trim().to_lowercase();
        match normalized.as_str() {
            "authorized" => Self::Authorized,
            "rejected" => Self::Rejected,
            _ => Self::Other(normalized),
        }
    }
}

/// Which identifier (and therefore which request shape) a consent poll uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentLookup<'a> {
    /// Before authorization: poll the consent request
    Request(&'a str),
    /// After authorization: poll the granted consent
    Consent(&'a str),
}

impl ConsentLookup<'_> {
    pub fn id(&self) -> &str {
        match self {
            Self::Request(id) | Self::Consent(id) => id,
        }
    }
}

/// A user's connection to one bank, identified at the bank by `bank_client_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub user_id: i64,
    pub bank_name: String,
    /// The user's client id at the bank
    pub bank_client_id: String,
    /// Consent request id, authoritative while awaiting authorization
    pub request_id: Option<String>,
    /// Granted consent id, authoritative once active
    pub consent_id: Option<String>,
    pub status: ConnectionStatus,
    /// Account holder name captured from the first account record
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// A connection whose consent was granted synchronously
    pub fn auto_approved(
        user_id: i64,
        bank_name: impl Into<String>,
        bank_client_id: impl Into<String>,
        consent_id: impl Into<String>,
    ) -> Self {
        let mut connection = Self::blank(user_id, bank_name.into(), bank_client_id.into());
        connection.consent_id = Some(consent_id.into());
        connection.status = ConnectionStatus::Active;
        connection
    }

    /// A connection waiting for the end user to approve the consent request
    pub fn awaiting_authorization(
        user_id: i64,
        bank_name: impl Into<String>,
        bank_client_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        let mut connection = Self::blank(user_id, bank_name.into(), bank_client_id.into());
        connection.request_id = Some(request_id.into());
        connection
    }

    fn blank(user_id: i64, bank_name: String, bank_client_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            bank_name,
            bank_client_id,
            request_id: None,
            consent_id: None,
            status: ConnectionStatus::AwaitingAuthorization,
            full_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identifier to poll the bank with, depending on the current phase
    pub fn consent_lookup(&self) -> Option<ConsentLookup<'_>> {
        match self.status {
            ConnectionStatus::AwaitingAuthorization => {
                self.request_id.as_deref().map(ConsentLookup::Request)
            }
            ConnectionStatus::Active => self.consent_id.as_deref().map(ConsentLookup::Consent),
            _ => None,
        }
    }

    /// Identifier to revoke at the bank: the consent if granted, else the request
    pub fn revocation_id(&self) -> Option<&str> {
        self.consent_id.as_deref().or(self.request_id.as_deref())
    }

    /// The consent id, if this connection may read account data
    pub fn active_consent(&self) -> Option<&str> {
        match self.status {
            ConnectionStatus::Active => self.consent_id.as_deref(),
            _ => None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(
            ConnectionStatus::parse("AwaitingAuthorization"),
            ConnectionStatus::AwaitingAuthorization
        );
        assert_eq!(
            ConnectionStatus::parse("awaiting_authorization"),
            ConnectionStatus::AwaitingAuthorization
        );
        assert_eq!(ConnectionStatus::parse(" ACTIVE "), ConnectionStatus::Active);
        assert_eq!(
            ConnectionStatus::parse("Expired"),
            ConnectionStatus::Other("expired".to_string())
        );
    }

    #[test]
    fn test_status_round_trips_through_storage_string() {
        for status in [
            ConnectionStatus::AwaitingAuthorization,
            ConnectionStatus::Active,
            ConnectionStatus::Rejected,
            ConnectionStatus::Revoked,
            ConnectionStatus::Other("suspended".to_string()),
        ] {
            assert_eq!(ConnectionStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_pollable_statuses() {
        assert!(ConnectionStatus::AwaitingAuthorization.is_pollable());
        assert!(ConnectionStatus::Active.is_pollable());
        assert!(!ConnectionStatus::Rejected.is_pollable());
        assert!(!ConnectionStatus::Other("expired".to_string()).is_pollable());
    }

    #[test]
    fn test_bank_status_parse() {
        assert_eq!(
            BankConsentStatus::parse(Some("Authorized")),
            BankConsentStatus::Authorized
        );
        assert_eq!(
            BankConsentStatus::parse(Some("REJECTED")),
            BankConsentStatus::Rejected
        );
        assert_eq!(
            BankConsentStatus::parse(None),
            BankConsentStatus::Other("unknown".to_string())
        );
    }

    #[test]
    fn test_consent_lookup_follows_phase() {
        let mut connection = Connection::awaiting_authorization(1, "vbank", "team1-1", "req-1");
        assert_eq!(connection.consent_lookup(), Some(ConsentLookup::Request("req-1")));

        connection.status = ConnectionStatus::Active;
        connection.consent_id = Some("consent-1".to_string());
        assert_eq!(
            connection.consent_lookup(),
            Some(ConsentLookup::Consent("consent-1"))
        );

        connection.status = ConnectionStatus::Rejected;
        assert_eq!(connection.consent_lookup(), None);
    }

    #[test]
    fn test_revocation_prefers_consent() {
        let mut connection = Connection::awaiting_authorization(1, "vbank", "team1-1", "req-1");
        assert_eq!(connection.revocation_id(), Some("req-1"));
        connection.consent_id = Some("consent-1".to_string());
        assert_eq!(connection.revocation_id(), Some("consent-1"));
    }

    #[test]
    fn test_auto_approved_is_active() {
        let connection = Connection::auto_approved(7, "abank", "team1-7", "consent-9");
        assert_eq!(connection.status, ConnectionStatus::Active);
        assert_eq!(connection.active_consent(), Some("consent-9"));
        assert!(connection.request_id.is_none());
    }
}
