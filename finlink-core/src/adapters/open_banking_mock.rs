//! Mock Open Banking server for testing
//!
//! Serves the bank endpoints Finlink calls with deterministic data:
//! - POST /auth/bank-token returns { access_token, expires_in }
//! - POST /account-consents/request returns { consent_id, auto_approved } or { request_id }
//! - GET/DELETE /account-consents/{id}
//! - GET /accounts, /accounts/{id}/balances, /accounts/{id}/transactions
//!   wrapped in { data: { account | balance | transaction: [...] } }
//!
//! Every request is recorded so tests can assert on headers and query strings.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value as JsonValue};

/// Mock bank server for testing
pub struct MockBankServer {
    port: u16,
    running: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    token_requests: Arc<AtomicUsize>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

/// Behaviour of the mock bank
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub num_accounts: usize,
    /// Total number of distinct transactions per account
    pub num_transactions: usize,
    /// Keep answering the last page for page numbers past the end
    pub repeat_last_page: bool,
    pub auto_approve: bool,
    /// Status reported by GET /account-consents/{id}
    pub consent_status: String,
    /// Status answered to DELETE /account-consents/{id}
    pub revoke_status: u16,
    /// Reject the token request with 401
    pub fail_token: bool,
    /// Answer data endpoints with 500
    pub fail_data: bool,
    /// Answer only the balances endpoint with 500
    pub fail_balances: bool,
    /// Delay in milliseconds before responding
    pub delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            num_accounts: 2,
            num_transactions: 5,
            repeat_last_page: false,
            auto_approve: false,
            consent_status: "Authorized".to_string(),
            revoke_status: 204,
            fail_token: false,
            fail_data: false,
            fail_balances: false,
            delay_ms: 0,
        }
    }
}

/// A request as seen by the mock server
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    /// Header names lowercased
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Percent-decoded query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| percent_decode(value))
        })
    }
}

impl MockBankServer {
    /// Start a new mock server on a random available port
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let token_requests = Arc::new(AtomicUsize::new(0));

        // Non-blocking accept so stop() can end the loop
        listener.set_nonblocking(true)?;

        let state = ServerState {
            config,
            requests: requests.clone(),
            token_requests: token_requests.clone(),
        };
        let running_clone = running.clone();
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let state = state.clone();
                        thread::spawn(move || handle_connection(stream, &state));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            requests,
            token_requests,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get the base URL for this mock server
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// All requests received so far, in arrival order
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Requests whose path starts with `prefix`
    pub fn requests_to(&self, prefix: &str) -> Vec<MockRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .collect()
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockBankServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Clone)]
struct ServerState {
    config: MockConfig,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    token_requests: Arc<AtomicUsize>,
}

fn handle_connection(mut stream: TcpStream, state: &ServerState) {
    let _ = stream.set_nonblocking(false);
    let Some(request) = read_request(&mut stream) else {
        send_response(&mut stream, 400, r#"{"error": "Invalid request"}"#);
        return;
    };

    if let Ok(mut requests) = state.requests.lock() {
        requests.push(request.clone());
    }

    if state.config.delay_ms > 0 {
        thread::sleep(std::time::Duration::from_millis(state.config.delay_ms));
    }

    let (status, body) = route(&request, state);
    send_response(&mut stream, status, &body);
}

/// Read the request line, headers and a Content-Length body
fn read_request(stream: &mut TcpStream) -> Option<MockRequest> {
    let mut data = Vec::new();
    let mut buffer = [0; 4096];
    let header_end = loop {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buffer[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.lines();
    let mut parts = lines.next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buffer[..n]);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target, String::new()),
    };

    Some(MockRequest {
        method,
        path,
        query,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn route(request: &MockRequest, state: &ServerState) -> (u16, String) {
    let config = &state.config;
    let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
    let authorized = request
        .header("authorization")
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false);

    match (request.method.as_str(), segments.as_slice()) {
        ("POST", ["auth", "bank-token"]) => {
            let count = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
            if config.fail_token || request.query_param("client_secret").is_none() {
                return (401, r#"{"detail": "Invalid credentials"}"#.to_string());
            }
            let body = json!({"access_token": format!("mock-token-{}", count), "expires_in": 3600});
            (200, body.to_string())
        }
        ("DELETE", ["account-consents", _]) => {
            let body = if config.revoke_status == 204 {
                String::new()
            } else {
                r#"{"detail": "Consent not found"}"#.to_string()
            };
            (config.revoke_status, body)
        }
        _ if !authorized => (401, r#"{"detail": "Missing bearer token"}"#.to_string()),
        ("POST", ["account-consents", "request"]) => {
            let body = if config.auto_approve {
                json!({"consent_id": "consent-1", "auto_approved": true, "status": "approved"})
            } else {
                json!({"request_id": "req-1", "status": "pending"})
            };
            (200, body.to_string())
        }
        ("GET", ["account-consents", _]) => {
            let body = json!({"data": {"status": config.consent_status, "consentId": "consent-1"}});
            (200, body.to_string())
        }
        _ if config.fail_data => (500, r#"{"detail": "Internal error"}"#.to_string()),
        ("GET", ["accounts"]) => {
            let accounts: Vec<JsonValue> = (1..=config.num_accounts).map(mock_account).collect();
            (200, json!({"data": {"account": accounts}}).to_string())
        }
        ("GET", ["accounts", _, "balances"]) if config.fail_balances => {
            (500, r#"{"detail": "Balance service unavailable"}"#.to_string())
        }
        ("GET", ["accounts", _, "balances"]) => {
            let balance = json!([{
                "type": "InterimAvailable",
                "amount": {"amount": "1000.00", "currency": "RUB"}
            }]);
            (200, json!({"data": {"balance": balance}}).to_string())
        }
        ("GET", ["accounts", account_id, "transactions"]) => {
            let page = request
                .query_param("page")
                .and_then(|p| p.parse::<usize>().ok())
                .unwrap_or(1);
            let limit = request
                .query_param("limit")
                .and_then(|l| l.parse::<usize>().ok())
                .unwrap_or(100)
                .max(1);
            let txs = transaction_page(account_id, config, page, limit);
            (200, json!({"data": {"transaction": txs}}).to_string())
        }
        _ => (404, r#"{"detail": "Endpoint not found"}"#.to_string()),
    }
}

fn mock_account(n: usize) -> JsonValue {
    json!({
        "accountId": format!("acc-{}", n),
        "status": "Enabled",
        "currency": "RUB",
        "accountType": "Personal",
        "accountSubType": "Checking",
        "nickname": format!("Account {}", n),
        "openingDate": "2023-01-15",
        "account": [{"schemeName": "RU.CBR.PAN", "identification": format!("40817810{}", n), "name": "Ivan Ivanov"}]
    })
}

fn mock_transaction(account_id: &str, n: usize) -> JsonValue {
    let day = 1 + (n - 1) % 28;
    json!({
        "accountId": account_id,
        "transactionId": format!("tx-{}", n),
        "amount": {"amount": format!("{}.50", n), "currency": "RUB"},
        "creditDebitIndicator": if n % 2 == 1 { "Credit" } else { "Debit" },
        "status": "Booked",
        "bookingDateTime": format!("2024-03-{:02}T12:00:00Z", day),
        "valueDateTime": format!("2024-03-{:02}T12:00:00Z", day),
        "transactionInformation": format!("Payment #{}", n),
        "bankTransactionCode": {"code": "PMNT"}
    })
}

fn transaction_page(account_id: &str, config: &MockConfig, page: usize, limit: usize) -> Vec<JsonValue> {
    let total = config.num_transactions;
    let last_page = total.div_ceil(limit).max(1);
    let page = if page > last_page && config.repeat_last_page {
        last_page
    } else {
        page
    };
    let start = (page - 1) * limit + 1;
    let end = (page * limit).min(total);
    (start..=end).map(|n| mock_transaction(account_id, n)).collect()
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

fn send_response(stream: &mut TcpStream, status: u16, body: &str) {
    let status_text = match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::adapters::open_banking::OpenBankingClient;
    use crate::domain::result::Error;
    use crate::domain::{BankConfig, ConsentLookup, Period};
    use crate::ports::{
        ConsentAccess, ConsentRequest, ConsentRequestOutcome, OpenBankingApi, PageQuery,
        RevokeOutcome,
    };

    fn bank(server: &MockBankServer) -> BankConfig {
        BankConfig::new("vbank", "team042", "secret", format!("{}/", server.base_url()))
    }

    fn access() -> ConsentAccess<'static> {
        ConsentAccess {
            token: "mock-token-1",
            consent_id: "consent-1",
            bank_client_id: "team042-1",
        }
    }

    #[test]
    fn test_token_request_sends_credentials() {
        let server = MockBankServer::start(MockConfig::default()).unwrap();
        let client = OpenBankingClient::new().unwrap();

        let token = client.request_bank_token(&bank(&server)).unwrap();
        assert_eq!(token.access_token, "mock-token-1");
        assert_eq!(token.expires_in, 3600);

        let requests = server.requests_to("/auth/bank-token");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query_param("client_id").as_deref(), Some("team042"));
        assert_eq!(requests[0].query_param("client_secret").as_deref(), Some("secret"));
    }

    #[test]
    fn test_token_failure_is_upstream_auth() {
        let server = MockBankServer::start(MockConfig {
            fail_token: true,
            ..Default::default()
        })
        .unwrap();
        let client = OpenBankingClient::new().unwrap();

        match client.request_bank_token(&bank(&server)) {
            Err(Error::UpstreamAuth { status, body, .. }) => {
                assert_eq!(status, Some(401));
                assert!(body.contains("Invalid credentials"));
            }
            other => panic!("expected UpstreamAuth, got {:?}", other),
        }
    }

    #[test]
    fn test_consent_request_pending() {
        let server = MockBankServer::start(MockConfig::default()).unwrap();
        let client = OpenBankingClient::new().unwrap();

        let outcome = client
            .request_consent(&bank(&server), "tok", &ConsentRequest::new("team042-1", "FinApp"))
            .unwrap();
        assert_eq!(
            outcome,
            ConsentRequestOutcome::Pending {
                request_id: "req-1".to_string()
            }
        );

        let request = &server.requests_to("/account-consents/request")[0];
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
        assert_eq!(request.header("x-requesting-bank"), Some("team042"));
        let body: JsonValue = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["client_id"], "team042-1");
        assert_eq!(body["requesting_bank"], "FinApp");
        assert_eq!(body["permissions"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_consent_request_auto_approved() {
        let server = MockBankServer::start(MockConfig {
            auto_approve: true,
            ..Default::default()
        })
        .unwrap();
        let client = OpenBankingClient::new().unwrap();

        let outcome = client
            .request_consent(&bank(&server), "tok", &ConsentRequest::new("team042-1", "FinApp"))
            .unwrap();
        assert_eq!(
            outcome,
            ConsentRequestOutcome::AutoApproved {
                consent_id: "consent-1".to_string()
            }
        );
    }

    #[test]
    fn test_consent_lookup_headers_follow_phase() {
        let server = MockBankServer::start(MockConfig::default()).unwrap();
        let client = OpenBankingClient::new().unwrap();
        let bank = bank(&server);

        let state = client
            .get_consent(&bank, "tok", ConsentLookup::Request("req-1"))
            .unwrap();
        assert_eq!(state.status.as_deref(), Some("Authorized"));
        assert_eq!(state.consent_id.as_deref(), Some("consent-1"));

        client
            .get_consent(&bank, "tok", ConsentLookup::Consent("consent-1"))
            .unwrap();

        let requests = server.requests_to("/account-consents/");
        assert_eq!(requests[0].path, "/account-consents/req-1");
        assert_eq!(requests[0].header("x-requesting-bank"), Some("team042"));
        assert_eq!(requests[0].header("x-fapi-interaction-id"), None);
        assert_eq!(requests[1].path, "/account-consents/consent-1");
        assert_eq!(requests[1].header("x-fapi-interaction-id"), Some("team042"));
    }

    #[test]
    fn test_revoke_outcomes() {
        let client = OpenBankingClient::new().unwrap();
        for (status, expected) in [(204, RevokeOutcome::Revoked), (404, RevokeOutcome::AlreadyGone)] {
            let server = MockBankServer::start(MockConfig {
                revoke_status: status,
                ..Default::default()
            })
            .unwrap();
            assert_eq!(client.revoke_consent(&bank(&server), "consent-1").unwrap(), expected);
        }

        let server = MockBankServer::start(MockConfig {
            revoke_status: 500,
            ..Default::default()
        })
        .unwrap();
        match client.revoke_consent(&bank(&server), "consent-1").unwrap() {
            RevokeOutcome::Unexpected { status, .. } => assert_eq!(status, 500),
            other => panic!("expected unexpected outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_accounts_and_balances() {
        let server = MockBankServer::start(MockConfig {
            num_accounts: 3,
            ..Default::default()
        })
        .unwrap();
        let client = OpenBankingClient::new().unwrap();
        let bank = bank(&server);

        let accounts = client.get_accounts(&bank, access()).unwrap();
        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts[0]["accountId"], "acc-1");

        let balances = client.get_balances(&bank, access(), "acc-1").unwrap();
        assert_eq!(balances.len(), 1);

        let request = &server.requests_to("/accounts")[0];
        assert_eq!(request.query_param("client_id").as_deref(), Some("team042-1"));
        assert_eq!(request.header("x-consent-id"), Some("consent-1"));
        assert_eq!(request.header("x-requesting-bank"), Some("team042"));
        assert_eq!(request.header("accept"), Some("application/json"));
    }

    #[test]
    fn test_transaction_page_forwards_period() {
        let server = MockBankServer::start(MockConfig {
            num_transactions: 5,
            ..Default::default()
        })
        .unwrap();
        let client = OpenBankingClient::new().unwrap();
        let period = Period::parse(Some("2024-03-01"), Some("2024-03-10")).unwrap();

        let page = client
            .get_transactions_page(
                &bank(&server),
                access(),
                "acc-1",
                PageQuery {
                    page: 2,
                    limit: 2,
                    period: &period,
                },
            )
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["transactionId"], "tx-3");

        let request = &server.requests_to("/accounts/acc-1/transactions")[0];
        assert_eq!(request.query_param("page").as_deref(), Some("2"));
        assert_eq!(request.query_param("limit").as_deref(), Some("2"));
        assert_eq!(
            request.query_param("from_booking_date_time").as_deref(),
            Some("2024-03-01T00:00:00Z")
        );
        assert_eq!(
            request.query_param("to_booking_date_time").as_deref(),
            Some("2024-03-10T00:00:00Z")
        );
    }

    #[test]
    fn test_data_failure_carries_status_and_body() {
        let server = MockBankServer::start(MockConfig {
            fail_data: true,
            ..Default::default()
        })
        .unwrap();
        let client = OpenBankingClient::new().unwrap();

        let err = client.get_accounts(&bank(&server), access()).unwrap_err();
        assert!(err.is_upstream());
        assert!(err.is_retryable());
        match err {
            Error::UpstreamRequest { status, body, .. } => {
                assert_eq!(status, Some(500));
                assert!(body.contains("Internal error"));
            }
            other => panic!("expected UpstreamRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_is_retryable() {
        let server = MockBankServer::start(MockConfig {
            delay_ms: 1500,
            ..Default::default()
        })
        .unwrap();
        let client = OpenBankingClient::with_timeout(Duration::from_millis(200)).unwrap();

        match client.get_accounts(&bank(&server), access()) {
            Err(Error::UpstreamRequest { timed_out, .. }) => assert!(timed_out),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("2024-03-01T00%3A00%3A00Z"), "2024-03-01T00:00:00Z");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
    }
}
