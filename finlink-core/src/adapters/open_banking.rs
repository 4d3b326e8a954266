//! Open Banking HTTP client
//!
//! Talks to a bank's Open Banking sandbox API: technical tokens, consent
//! requests and consent-scoped account data. One client serves every bank;
//! the base URL and credentials come from the [`BankConfig`] of each call.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::domain::{BankConfig, ConsentLookup, IssuedToken};
use crate::ports::{
    ConsentAccess, ConsentRequest, ConsentRequestOutcome, ConsentState, OpenBankingApi, PageQuery,
    RevokeOutcome,
};

/// Default timeout for every bank call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const REQUESTING_BANK_HEADER: &str = "X-Requesting-Bank";
const CONSENT_ID_HEADER: &str = "X-Consent-Id";
const INTERACTION_ID_HEADER: &str = "x-fapi-interaction-id";

// =============================================================================
// API Response Models
// =============================================================================

#[derive(Debug, Deserialize)]
struct ConsentRequestResponse {
    #[serde(default)]
    auto_approved: bool,
    #[serde(default)]
    consent_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConsentEnvelope {
    #[serde(default)]
    data: ConsentData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsentData {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    consent_id: Option<String>,
}

// =============================================================================
// HTTP Client
// =============================================================================

/// Blocking Open Banking client
#[derive(Debug, Clone)]
pub struct OpenBankingClient {
    client: Client,
    timeout: Duration,
}

impl OpenBankingClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client whose every request fails after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    fn request(&self, method: Method, bank: &BankConfig, path: &str) -> RequestBuilder {
        let url = bank.endpoint(path);
        tracing::debug!(bank = %bank.name, method = %method, url = %url, "bank request");
        self.client.request(method, url)
    }

    fn send(&self, bank: &BankConfig, request: RequestBuilder) -> Result<Response> {
        let response = request.send().map_err(|e| self.map_request_error(bank, e))?;
        tracing::debug!(
            bank = %bank.name,
            status = response.status().as_u16(),
            url = %response.url(),
            "bank response"
        );
        Ok(response)
    }

    /// Read a successful JSON body, or turn the response into an upstream error
    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        bank: &BankConfig,
        response: Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| self.map_request_error(bank, e))?;

        if !status.is_success() {
            return Err(Error::upstream_status(&bank.name, status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::upstream_status(
                &bank.name,
                status.as_u16(),
                format!("unreadable response ({}): {}", e, body),
            )
        })
    }

    /// Map request errors to upstream errors that keep the cause
    fn map_request_error(&self, bank: &BankConfig, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::upstream_transport(
                &bank.name,
                format!("timed out after {} seconds", self.timeout.as_secs_f64()),
                true,
            )
        } else if error.is_connect() {
            Error::upstream_transport(&bank.name, format!("unable to connect: {}", error), false)
        } else {
            Error::upstream_transport(&bank.name, error.to_string(), false)
        }
    }

    fn data_request(
        &self,
        method: Method,
        bank: &BankConfig,
        path: &str,
        access: ConsentAccess<'_>,
    ) -> RequestBuilder {
        self.request(method, bank, path)
            .bearer_auth(access.token)
            .header(REQUESTING_BANK_HEADER, &bank.client_id)
            .header(CONSENT_ID_HEADER, access.consent_id)
            .header(reqwest::header::ACCEPT, "application/json")
    }
}

/// Pull `data.<key>` out of a listing response; absent means empty
fn extract_list(mut body: JsonValue, key: &str) -> Vec<JsonValue> {
    match body
        .get_mut("data")
        .and_then(|data| data.get_mut(key))
        .map(JsonValue::take)
    {
        Some(JsonValue::Array(items)) => items,
        _ => Vec::new(),
    }
}

impl OpenBankingApi for OpenBankingClient {
    fn request_bank_token(&self, bank: &BankConfig) -> Result<IssuedToken> {
        let request = self
            .request(Method::POST, bank, "/auth/bank-token")
            .query(&[
                ("client_id", bank.client_id.as_str()),
                ("client_secret", bank.client_secret.as_str()),
            ]);
        let response = self.send(bank, request)?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| self.map_request_error(bank, e))?;

        if !status.is_success() {
            return Err(Error::UpstreamAuth {
                bank: bank.name.clone(),
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::UpstreamAuth {
            bank: bank.name.clone(),
            status: Some(status.as_u16()),
            body: format!("unreadable token response: {}", e),
        })
    }

    fn request_consent(
        &self,
        bank: &BankConfig,
        token: &str,
        consent: &ConsentRequest,
    ) -> Result<ConsentRequestOutcome> {
        let request = self
            .request(Method::POST, bank, "/account-consents/request")
            .bearer_auth(token)
            .header(REQUESTING_BANK_HEADER, &bank.client_id)
            .json(consent);
        let response = self.send(bank, request)?;
        let parsed: ConsentRequestResponse = self.read_json(bank, response)?;

        match parsed {
            ConsentRequestResponse {
                auto_approved: true,
                consent_id: Some(consent_id),
                ..
            } => Ok(ConsentRequestOutcome::AutoApproved { consent_id }),
            ConsentRequestResponse {
                auto_approved: false,
                request_id: Some(request_id),
                ..
            } => Ok(ConsentRequestOutcome::Pending { request_id }),
            other => Err(Error::upstream_status(
                &bank.name,
                200,
                format!("consent response without usable id: {:?}", other),
            )),
        }
    }

    fn get_consent(
        &self,
        bank: &BankConfig,
        token: &str,
        lookup: ConsentLookup<'_>,
    ) -> Result<ConsentState> {
        let path = format!("/account-consents/{}", lookup.id());
        let request = self.request(Method::GET, bank, &path).bearer_auth(token);
        let request = match lookup {
            ConsentLookup::Request(_) => request.header(REQUESTING_BANK_HEADER, &bank.client_id),
            ConsentLookup::Consent(_) => request.header(INTERACTION_ID_HEADER, &bank.client_id),
        };
        let response = self.send(bank, request)?;
        let envelope: ConsentEnvelope = self.read_json(bank, response)?;

        Ok(ConsentState {
            status: envelope.data.status,
            consent_id: envelope.data.consent_id,
        })
    }

    fn revoke_consent(&self, bank: &BankConfig, id: &str) -> Result<RevokeOutcome> {
        let path = format!("/account-consents/{}", id);
        let request = self
            .request(Method::DELETE, bank, &path)
            .header(INTERACTION_ID_HEADER, &bank.client_id);
        let response = self.send(bank, request)?;

        Ok(match response.status().as_u16() {
            204 => RevokeOutcome::Revoked,
            404 => RevokeOutcome::AlreadyGone,
            status => RevokeOutcome::Unexpected {
                status,
                body: response.text().unwrap_or_default(),
            },
        })
    }

    fn get_accounts(&self, bank: &BankConfig, access: ConsentAccess<'_>) -> Result<Vec<JsonValue>> {
        let request = self
            .data_request(Method::GET, bank, "/accounts", access)
            .query(&[("client_id", access.bank_client_id)]);
        let response = self.send(bank, request)?;
        let body: JsonValue = self.read_json(bank, response)?;
        Ok(extract_list(body, "account"))
    }

    fn get_balances(
        &self,
        bank: &BankConfig,
        access: ConsentAccess<'_>,
        account_id: &str,
    ) -> Result<Vec<JsonValue>> {
        let path = format!("/accounts/{}/balances", account_id);
        let request = self
            .data_request(Method::GET, bank, &path, access)
            .query(&[("client_id", access.bank_client_id)]);
        let response = self.send(bank, request)?;
        let body: JsonValue = self.read_json(bank, response)?;
        Ok(extract_list(body, "balance"))
    }

    fn get_transactions_page(
        &self,
        bank: &BankConfig,
        access: ConsentAccess<'_>,
        account_id: &str,
        query: PageQuery<'_>,
    ) -> Result<Vec<JsonValue>> {
        let path = format!("/accounts/{}/transactions", account_id);
        let mut params = vec![
            ("page", query.page.to_string()),
            ("limit", query.limit.to_string()),
        ];
        params.extend(query.period.query_params());

        let request = self
            .data_request(Method::GET, bank, &path, access)
            .query(&params);
        let response = self.send(bank, request)?;
        let body: JsonValue = self.read_json(bank, response)?;
        Ok(extract_list(body, "transaction"))
    }
}

// =============================================================================
// Tests
// =============================================================================
