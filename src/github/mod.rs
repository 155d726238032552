//! Authenticated client for the GitHub REST API.
//!
//! Every request re-reads the shared token holder and attaches a bearer
//! header when a token is held. A 401 response triggers one re-validation
//! of the token (a `GET /user` probe) followed by at most one retry of the
//! original request; a 401 that survives that is reported as
//! [`Error::AuthExpired`] for that call only.

use crate::credentials::TokenHolder;
use crate::error::{Error, Result};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://api.github.com";

/// The authenticated user's profile, as returned by `GET /user`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// HTTP client for the GitHub REST API.
pub struct GitHubClient {
    http: Client,
    holder: TokenHolder,
    base_url: String,
}

impl GitHubClient {
    /// Create a client using the default GitHub API base URL.
    pub fn new(holder: TokenHolder) -> Self {
        Self::with_base_url(holder, API_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(holder: TokenHolder, base_url: String) -> Self {
        let http = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            holder,
            base_url,
        }
    }

    /// Whether the currently held token is accepted by GitHub.
    ///
    /// False when no token is held, when the probe is rejected, or on any
    /// network failure. Never returns an error.
    pub async fn validate_token(&self) -> bool {
        if !self.holder.is_present() {
            return false;
        }
        self.probe().await
    }

    /// Fetch the authenticated user's profile.
    pub async fn get_current_user(&self) -> Result<GitHubUser> {
        let response = self.get(format!("{}/user", self.base_url)).await?;
        response
            .json::<GitHubUser>()
            .await
            .map_err(|e| Error::Api(format!("Failed to parse user profile: {}", e)))
    }

    /// Whether `url` names a GitHub repository the current credentials can
    /// see.
    ///
    /// A URL that does not match the `https://github.com/{owner}/{repo}`
    /// pattern is false without any network call; otherwise the repository
    /// metadata is fetched and anything but a 200 (nonexistent repository,
    /// private repository without access, network failure) is false.
    pub async fn validate_repository_url(&self, url: &str) -> bool {
        let Some((owner, repo)) = parse_owner_repo(url) else {
            return false;
        };

        self.get(format!("{}/repos/{}/{}", self.base_url, owner, repo))
            .await
            .is_ok()
    }

    /// Issue a GET with bearer auth and the one-shot 401 recovery policy.
    async fn get(&self, url: String) -> Result<reqwest::Response> {
        let response = self.send_get(&url).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_response_status(response);
        }

        if !self.holder.is_present() {
            // Nothing to re-validate without a token
            return Err(Error::AuthExpired);
        }

        debug!(url = %url, "Got 401, re-validating token before one retry");
        if !self.probe().await {
            warn!("Token re-validation failed, propagating 401");
            return Err(Error::AuthExpired);
        }

        // The token still probes fine; retry the original request once
        let retry = self.send_get(&url).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::AuthExpired);
        }
        check_response_status(retry)
    }

    /// Send a GET, attaching the current token if one is held.
    ///
    /// The holder is re-read on every send so a token swapped in (or
    /// cleared) mid-operation takes effect immediately.
    async fn send_get(&self, url: &str) -> Result<reqwest::Response> {
        let mut request = self.http.get(url).header("Accept", "application/json");
        if let Some(token) = self.holder.get() {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| Error::Api(format!("Request to {} failed: {}", url, e)))
    }

    /// Cheap authenticated probe: does `GET /user` answer 200?
    async fn probe(&self) -> bool {
        match self.send_get(&format!("{}/user", self.base_url)).await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }
}

/// Check the response status and map known error codes.
///
/// - 401 → [`Error::AuthExpired`]
/// - 403 → rate limit (logs X-RateLimit-Remaining)
/// - Other non-2xx → generic API error
fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(Error::AuthExpired),
        StatusCode::FORBIDDEN => {
            let remaining = response
                .headers()
                .get("X-RateLimit-Remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            if let Some(remaining) = remaining {
                warn!(remaining, "GitHub request forbidden, possible rate limit");
            }
            Err(Error::Api(format!(
                "GitHub API error: 403 Forbidden (X-RateLimit-Remaining: {})",
                remaining.map_or_else(|| "unknown".to_string(), |r| r.to_string())
            )))
        }
        s if !s.is_success() => Err(Error::Api(format!("GitHub API error: {}", s))),
        _ => Ok(response),
    }
}

/// Parse an `owner/repo` pair out of a GitHub repository URL.
///
/// Tolerates a trailing `.git` suffix and a trailing slash. Returns `None`
/// for anything that is not an `https://github.com/...` repository URL.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^https://(?:www\.)?github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$")
            .expect("repository URL pattern is valid")
    });

    let captures = pattern.captures(url)?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_token(base_url: &str, token: Option<&str>) -> GitHubClient {
        let holder = TokenHolder::new();
        if let Some(token) = token {
            holder.set(token.to_string());
        }
        GitHubClient::with_base_url(holder, base_url.to_string())
    }

    const USER_BODY: &str = r#"{
        "login": "octocat",
        "id": 583231,
        "name": "The Octocat",
        "avatar_url": "https://avatars.githubusercontent.com/u/583231"
    }"#;

    #[test]
    fn test_parse_owner_repo() {
        assert_eq!(
            parse_owner_repo("https://github.com/acme/widgets"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_owner_repo("https://github.com/acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_owner_repo("https://github.com/acme/widgets/"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_owner_repo("https://www.github.com/rust-lang/rust"),
            Some(("rust-lang".to_string(), "rust".to_string()))
        );

        assert!(parse_owner_repo("not-a-url").is_none());
        assert!(parse_owner_repo("https://gitlab.com/acme/widgets").is_none());
        assert!(parse_owner_repo("https://github.com/acme").is_none());
        assert!(parse_owner_repo("https://github.com/acme/widgets/tree/main").is_none());
        assert!(parse_owner_repo("http://github.com/acme/widgets").is_none());
    }

    #[tokio::test]
    async fn test_get_current_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(USER_BODY)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("test_token"));
        let user = client.get_current_user().await.unwrap();

        assert_eq!(user.login, "octocat");
        assert_eq!(user.id, 583231);
        assert_eq!(user.name.as_deref(), Some("The Octocat"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_validate_token_without_token() {
        // Must answer false without a network call; point at an unroutable
        // base URL to prove no request is attempted
        let client = client_with_token("http://127.0.0.1:1", None);
        assert!(!client.validate_token().await);
    }

    #[tokio::test]
    async fn test_validate_token_accepted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_BODY)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("good"));
        assert!(client.validate_token().await);
    }

    #[tokio::test]
    async fn test_validate_token_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("bad"));
        assert!(!client.validate_token().await);
    }

    #[tokio::test]
    async fn test_successful_request_skips_probe() {
        let mut server = mockito::Server::new_async().await;
        let repo_mock = server
            .mock("GET", "/repos/acme/widgets")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let probe_mock = server
            .mock("GET", "/user")
            .expect(0)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("good"));
        assert!(
            client
                .validate_repository_url("https://github.com/acme/widgets")
                .await
        );

        repo_mock.assert_async().await;
        probe_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_with_live_token_retries_exactly_once() {
        let mut server = mockito::Server::new_async().await;
        // The repo endpoint keeps rejecting; the probe says the token is
        // fine. The client must retry exactly once, then give up.
        let repo_mock = server
            .mock("GET", "/repos/acme/widgets")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .expect(2)
            .create_async()
            .await;
        let probe_mock = server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("flaky"));
        let err = client
            .get(format!("{}/repos/acme/widgets", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthExpired));
        repo_mock.assert_async().await;
        probe_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_with_live_token_retry_result_is_returned() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut server = mockito::Server::new_async().await;
        let hits = Arc::new(AtomicUsize::new(0));

        // The repo endpoint 401s once (a transient rejection) and then
        // answers normally; the caller must receive the retry's response
        let first = {
            let hits = Arc::clone(&hits);
            server
                .mock("GET", "/repos/acme/widgets")
                .match_request(move |_| hits.fetch_add(1, Ordering::SeqCst) == 0)
                .with_status(401)
                .with_body(r#"{"message": "Bad credentials"}"#)
                .expect(1)
                .create_async()
                .await
        };
        let retry = {
            let hits = Arc::clone(&hits);
            server
                .mock("GET", "/repos/acme/widgets")
                .match_request(move |_| hits.load(Ordering::SeqCst) >= 1)
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(r#"{"full_name": "acme/widgets"}"#)
                .expect(1)
                .create_async()
                .await
        };
        let probe_mock = server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("hiccup"));
        let response = client
            .get(format!("{}/repos/acme/widgets", server.url()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["full_name"], "acme/widgets");

        first.assert_async().await;
        retry.assert_async().await;
        probe_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_with_dead_token_does_not_retry() {
        let mut server = mockito::Server::new_async().await;
        let repo_mock = server
            .mock("GET", "/repos/acme/widgets")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .expect(1)
            .create_async()
            .await;
        let probe_mock = server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("dead"));
        let err = client
            .get(format!("{}/repos/acme/widgets", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthExpired));
        repo_mock.assert_async().await;
        probe_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_validate_repository_url_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/missing")
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;

        let client = client_with_token(&server.url(), Some("good"));
        assert!(
            !client
                .validate_repository_url("https://github.com/acme/missing")
                .await
        );
    }

    #[tokio::test]
    async fn test_validate_repository_url_garbage_makes_no_request() {
        // Unroutable base URL: a network attempt would error the test via
        // the mock framework instead of returning cleanly
        let client = client_with_token("http://127.0.0.1:1", Some("good"));
        assert!(!client.validate_repository_url("not-a-url").await);
        assert!(
            !client
                .validate_repository_url("ssh://git@github.com/acme/widgets")
                .await
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_request_omits_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/widgets")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_with_token(&server.url(), None);
        assert!(
            client
                .validate_repository_url("https://github.com/acme/widgets")
                .await
        );
        mock.assert_async().await;
    }
}
