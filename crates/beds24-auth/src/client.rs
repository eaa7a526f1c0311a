//! Beds24 authentication endpoint client
//!
//! Handles the three authentication endpoint interactions:
//! 1. Invite code exchange (`/authentication/setup`, header `code`)
//! 2. Access token refresh (`/authentication/token`, header `refreshToken`)
//! 3. Token introspection (`/authentication/details`, header `token`)
//!
//! All three are GET requests that carry the credential in a header. Every
//! request is bounded by the client's timeout.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{DETAILS_PATH, SETUP_PATH, TOKEN_PATH};
use crate::error::{Error, Result};

/// Response from `/authentication/setup`.
///
/// `expires_in` is a delta in seconds for the access token. The caller turns
/// it into an absolute expiration when storing the record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResponse {
    pub token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Response from `/authentication/token`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Response from `/authentication/details`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    #[serde(default)]
    pub valid_token: bool,
}

/// The remote side of the credential lifecycle.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn RemoteAuth>`).
pub trait RemoteAuth: Send + Sync {
    /// Exchange an invite code for an access + refresh token pair.
    fn setup<'a>(
        &'a self,
        invite_code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SetupResponse>> + Send + 'a>>;

    /// Mint a new access token. A 401 maps to `Error::AuthRejected`.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RefreshResponse>> + Send + 'a>>;

    /// Ask the server whether `token` is currently accepted.
    fn details<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenDetails>> + Send + 'a>>;
}

/// `RemoteAuth` over HTTPS with reqwest.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    /// Build a client for `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Wrap an existing reqwest client (timeouts are the caller's responsibility).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, header: &str, value: &str) -> Result<reqwest::Response> {
        debug!(path, "calling authentication endpoint");
        self.client
            .get(self.url(path))
            .header(ACCEPT, "application/json")
            .header(header, value)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{path} request failed: {e}")))
    }

    async fn exchange_invite(&self, invite_code: &str) -> Result<SetupResponse> {
        let response = self.get(SETUP_PATH, "code", invite_code).await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::Transport(format!(
                "setup endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<SetupResponse>()
            .await
            .map_err(|e| Error::MalformedResponse(format!("invalid setup response: {e}")))
    }

    async fn refresh_access(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let response = self.get(TOKEN_PATH, "refreshToken", refresh_token).await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;

            // 401 means the refresh token itself is revoked, expired or invalid
            if status == StatusCode::UNAUTHORIZED {
                return Err(Error::AuthRejected(format!(
                    "refresh token rejected ({status}): {body}"
                )));
            }

            return Err(Error::Transport(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| Error::MalformedResponse(format!("invalid refresh response: {e}")))
    }

    async fn token_details(&self, token: &str) -> Result<TokenDetails> {
        let response = self.get(DETAILS_PATH, "token", token).await?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::Transport(format!(
                "details endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<TokenDetails>()
            .await
            .map_err(|e| Error::MalformedResponse(format!("invalid details response: {e}")))
    }
}

impl RemoteAuth for HttpAuthClient {
    fn setup<'a>(
        &'a self,
        invite_code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SetupResponse>> + Send + 'a>> {
        Box::pin(self.exchange_invite(invite_code))
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RefreshResponse>> + Send + 'a>> {
        Box::pin(self.refresh_access(refresh_token))
    }

    fn details<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenDetails>> + Send + 'a>> {
        Box::pin(self.token_details(token))
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpAuthClient {
        HttpAuthClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn setup_response_defaults_expires_in() {
        let json = r#"{"token":"at_abc","refreshToken":"rt_def"}"#;
        let response: SetupResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.token, "at_abc");
        assert_eq!(response.refresh_token, "rt_def");
        assert_eq!(response.expires_in, None);
    }

    #[test]
    fn details_defaults_to_invalid() {
        let details: TokenDetails = serde_json::from_str("{}").unwrap();
        assert!(!details.valid_token);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpAuthClient::with_client(reqwest::Client::new(), "https://example.test/api/v2/");
        assert_eq!(client.url(SETUP_PATH), "https://example.test/api/v2/authentication/setup");
    }

    #[tokio::test]
    async fn setup_sends_code_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authentication/setup"))
            .and(header("code", "inv-123"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "at_1",
                "refreshToken": "rt_1",
                "expiresIn": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).setup("inv-123").await.unwrap();
        assert_eq!(response.token, "at_1");
        assert_eq!(response.refresh_token, "rt_1");
        assert_eq!(response.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn setup_non_success_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(path("/authentication/setup"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid code"))
            .mount(&server)
            .await;

        let err = client_for(&server).setup("bad").await.unwrap_err();
        assert!(matches!(err, Error::Transport(ref msg) if msg.contains("invalid code")), "got {err:?}");
    }

    #[tokio::test]
    async fn setup_missing_refresh_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(path("/authentication/setup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "at_1"})))
            .mount(&server)
            .await;

        let err = client_for(&server).setup("inv").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refresh_sends_refresh_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authentication/token"))
            .and(header("refreshToken", "rt_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "at_2",
                "expiresIn": 86400
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).refresh("rt_1").await.unwrap();
        assert_eq!(response.token, "at_2");
        assert_eq!(response.expires_in, Some(86400));
    }

    #[tokio::test]
    async fn refresh_401_is_auth_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/authentication/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh("rt_old").await.unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refresh_500_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(path("/authentication/token"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh("rt_1").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refresh_without_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(path("/authentication/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"expiresIn": 60})))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh("rt_1").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn details_reads_valid_token_flag() {
        let server = MockServer::start().await;
        Mock::given(path("/authentication/details"))
            .and(header("token", "at_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "validToken": true,
                "token": {"expiresIn": 1200}
            })))
            .mount(&server)
            .await;

        let details = client_for(&server).details("at_1").await.unwrap();
        assert!(details.valid_token);
    }

    #[tokio::test]
    async fn slow_server_hits_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/authentication/details"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"validToken": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = HttpAuthClient::new(server.uri(), Duration::from_millis(200)).unwrap();
        let err = client.details("at_1").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let client = HttpAuthClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.setup("inv").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    }
}
