//! Connection service - consent lifecycle of a user's bank connections
//!
//! A connection moves `awaiting_authorization -> active | rejected` while the
//! user approves the consent at the bank; auto-approving banks start out
//! `active`. Active connections are re-polled and mirror whatever status the
//! bank reports. Deleting a connection revokes the consent on a best-effort
//! basis and always removes the local record.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{display_name, BankConfig, BankConsentStatus, Connection, ConnectionStatus};
use crate::ports::{
    ConnectionFilter, ConsentAccess, ConsentRequest, ConsentRequestOutcome, OpenBankingApi,
    Repository, RevokeOutcome,
};
use crate::services::TokenService;

/// Result of initiating a connection
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "connection", rename_all = "snake_case")]
pub enum InitiateOutcome {
    /// A connection for this bank and client id already existed
    AlreadyInitiated(Connection),
    AutoApproved(Connection),
    /// The user still has to approve the consent at the bank
    AwaitingAuthorization(Connection),
}

impl InitiateOutcome {
    pub fn connection(&self) -> &Connection {
        match self {
            Self::AlreadyInitiated(c) | Self::AutoApproved(c) | Self::AwaitingAuthorization(c) => c,
        }
    }
}

/// Result of polling a connection's consent
#[derive(Debug, Clone)]
pub enum StatusOutcome {
    /// Connection is in a state that is no longer polled
    Final(Connection),
    /// Consent is authorized; `accounts` are the raw records fetched with it
    Approved {
        connection: Connection,
        accounts: Vec<JsonValue>,
    },
    Rejected(Connection),
    /// Anything else the bank reported, mirrored onto the connection
    Pending(Connection),
}

impl StatusOutcome {
    pub fn connection(&self) -> &Connection {
        match self {
            Self::Final(c) | Self::Rejected(c) | Self::Pending(c) => c,
            Self::Approved { connection, .. } => connection,
        }
    }
}

/// Result of deleting a connection
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub connection: Connection,
    /// True when the bank confirmed the revocation or no longer knew it
    pub revoked: bool,
}

/// Service for the consent state machine
pub struct ConnectionService {
    repository: Arc<dyn Repository>,
    api: Arc<dyn OpenBankingApi>,
    tokens: Arc<TokenService>,
    requesting_bank: String,
}

impl ConnectionService {
    pub fn new(
        repository: Arc<dyn Repository>,
        api: Arc<dyn OpenBankingApi>,
        tokens: Arc<TokenService>,
        requesting_bank: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            api,
            tokens,
            requesting_bank: requesting_bank.into(),
        }
    }

    /// Request a consent for `bank_client_id` at `bank_name`
    ///
    /// Idempotent per (user, bank, client id): an existing connection is
    /// returned unchanged without contacting the bank.
    pub fn initiate(
        &self,
        user_id: i64,
        bank_name: &str,
        bank_client_id: &str,
    ) -> Result<InitiateOutcome> {
        let bank_client_id = bank_client_id.trim();
        if bank_client_id.is_empty() {
            return Err(Error::validation("client id cannot be empty"));
        }
        let bank = self.bank(bank_name)?;

        if let Some(existing) = self
            .repository
            .find_connection(user_id, &bank.name, bank_client_id)?
        {
            tracing::debug!(connection = %existing.id, "connection already initiated");
            return Ok(InitiateOutcome::AlreadyInitiated(existing));
        }

        let token = self.tokens.token_for(&bank)?;
        let request = ConsentRequest::new(bank_client_id, &self.requesting_bank);
        let outcome = self
            .api
            .request_consent(&bank, &token, &request)
            .map_err(|e| self.after_failure(&bank, e))?;

        let (connection, outcome) = match outcome {
            ConsentRequestOutcome::AutoApproved { consent_id } => {
                let connection =
                    Connection::auto_approved(user_id, &bank.name, bank_client_id, consent_id);
                (connection.clone(), InitiateOutcome::AutoApproved(connection))
            }
            ConsentRequestOutcome::Pending { request_id } => {
                let connection = Connection::awaiting_authorization(
                    user_id,
                    &bank.name,
                    bank_client_id,
                    request_id,
                );
                (
                    connection.clone(),
                    InitiateOutcome::AwaitingAuthorization(connection),
                )
            }
        };

        self.repository.insert_connection(&connection)?;
        tracing::info!(
            connection = %connection.id,
            bank = %bank.name,
            status = %connection.status,
            "connection initiated"
        );
        Ok(outcome)
    }

    /// Poll the bank for the consent state of a connection
    ///
    /// Upstream failures leave the stored connection untouched; a promotion
    /// to `active` is only written once the accounts have been fetched.
    pub fn check_status(&self, user_id: i64, connection_id: Uuid) -> Result<StatusOutcome> {
        let connection = self.get_connection(user_id, connection_id)?;
        if !connection.status.is_pollable() {
            return Ok(StatusOutcome::Final(connection));
        }

        let lookup = connection.consent_lookup().ok_or_else(|| {
            Error::ConsentRequired(format!(
                "connection {} has no consent or request id to poll",
                connection.id
            ))
        })?;
        let bank = self.bank(&connection.bank_name)?;
        let token = self.tokens.token_for(&bank)?;
        let state = self
            .api
            .get_consent(&bank, &token, lookup)
            .map_err(|e| self.after_failure(&bank, e))?;

        let mut updated = connection.clone();
        match BankConsentStatus::parse(state.status.as_deref()) {
            BankConsentStatus::Authorized => {
                if updated.status == ConnectionStatus::AwaitingAuthorization {
                    let consent_id = state.consent_id.ok_or_else(|| {
                        Error::upstream_status(
                            &bank.name,
                            200,
                            "consent authorized without a consentId",
                        )
                    })?;
                    updated.consent_id = Some(consent_id);
                    updated.status = ConnectionStatus::Active;
                }

                let consent_id = updated.consent_id.clone().unwrap_or_default();
                let access = ConsentAccess {
                    token: &token,
                    consent_id: &consent_id,
                    bank_client_id: &updated.bank_client_id,
                };
                let accounts = self
                    .api
                    .get_accounts(&bank, access)
                    .map_err(|e| self.after_failure(&bank, e))?;

                if let Some(name) = display_name(&accounts) {
                    updated.full_name = Some(name);
                }
                self.save_transition(&connection, &mut updated)?;
                Ok(StatusOutcome::Approved {
                    connection: updated,
                    accounts,
                })
            }
            BankConsentStatus::Rejected => {
                updated.status = ConnectionStatus::Rejected;
                self.save_transition(&connection, &mut updated)?;
                Ok(StatusOutcome::Rejected(updated))
            }
            BankConsentStatus::Other(status) => {
                let reported = ConnectionStatus::parse(&status);
                if reported != updated.status {
                    updated.status = reported;
                    self.save_transition(&connection, &mut updated)?;
                }
                Ok(StatusOutcome::Pending(updated))
            }
        }
    }

    /// Revoke the consent at the bank and delete the connection locally
    ///
    /// Revocation problems are logged; the local delete always happens.
    pub fn delete(&self, user_id: i64, connection_id: Uuid) -> Result<DeleteOutcome> {
        let connection = self.get_connection(user_id, connection_id)?;
        let revoked = match connection.revocation_id() {
            Some(id) => self.revoke(&connection, id),
            None => false,
        };

        self.repository.delete_connection(user_id, connection.id)?;
        tracing::info!(connection = %connection.id, revoked, "connection deleted");
        Ok(DeleteOutcome {
            connection,
            revoked,
        })
    }

    fn revoke(&self, connection: &Connection, id: &str) -> bool {
        let bank = match self.bank(&connection.bank_name) {
            Ok(bank) => bank,
            Err(e) => {
                tracing::warn!(connection = %connection.id, "cannot revoke consent: {}", e);
                return false;
            }
        };

        match self.api.revoke_consent(&bank, id) {
            Ok(RevokeOutcome::Revoked) => true,
            Ok(RevokeOutcome::AlreadyGone) => {
                tracing::info!(bank = %bank.name, "consent already gone at bank");
                true
            }
            Ok(RevokeOutcome::Unexpected { status, body }) => {
                tracing::warn!(bank = %bank.name, status, body = %body, "unexpected revoke response");
                false
            }
            Err(e) => {
                tracing::warn!(bank = %bank.name, "failed to revoke consent: {}", e);
                false
            }
        }
    }

    pub fn list_connections(
        &self,
        user_id: i64,
        filter: &ConnectionFilter,
    ) -> Result<Vec<Connection>> {
        self.repository.list_connections(user_id, filter)
    }

    pub fn get_connection(&self, user_id: i64, connection_id: Uuid) -> Result<Connection> {
        self.repository
            .get_connection(user_id, connection_id)?
            .ok_or_else(|| Error::not_found(format!("connection {}", connection_id)))
    }

    fn bank(&self, bank_name: &str) -> Result<BankConfig> {
        self.repository
            .get_bank(bank_name)?
            .ok_or_else(|| Error::not_found(format!("bank '{}'", bank_name)))
    }

    fn save_transition(&self, before: &Connection, after: &mut Connection) -> Result<()> {
        after.touch();
        self.repository.update_connection(after)?;
        if before.status != after.status {
            tracing::info!(
                connection = %after.id,
                from = %before.status,
                to = %after.status,
                "connection status changed"
            );
        }
        Ok(())
    }

    fn after_failure(&self, bank: &BankConfig, error: Error) -> Error {
        self.tokens.forget_if_unauthorized(bank, &error);
        error
    }
}
