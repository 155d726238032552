//! OAuth 2.0 authorization-code flow for GitHub sign-in.
//!
//! The flow is: `initiate_oauth` generates an anti-forgery state token,
//! builds the authorization URL, and hands off to the system browser. The
//! OS later redirects back through the app's custom URL scheme, and the
//! host calls `handle_callback` with the returned `code` and `state`. On a
//! state match the code is exchanged for an access token, which is
//! persisted encrypted and published to the in-memory holder.
//!
//! At most one flow is pending per process. Starting a new flow discards
//! the previous one (last wins); a callback is single-use, so a second
//! callback for the same flow is rejected as a state mismatch.

mod exchange;

use crate::config::AuthConfig;
use crate::credentials::{TokenHolder, TokenStore};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a pending flow remains valid.
const FLOW_EXPIRY_MINUTES: i64 = 10;

/// Notifications emitted to UI collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    /// Sign-in completed and the token is persisted.
    OAuthSuccess,
    /// Sign-in failed; the message is suitable for display.
    OAuthError(String),
    /// The credential was removed (explicit logout or failed validation).
    Logout,
}

/// The single pending authorization attempt.
#[derive(Debug)]
struct FlowState {
    state_token: String,
    started_at: DateTime<Utc>,
}

/// Drives the browser-redirect OAuth flow.
pub struct OAuthFlow {
    config: Arc<AuthConfig>,
    store: Arc<TokenStore>,
    holder: TokenHolder,
    events: broadcast::Sender<AuthEvent>,
    http: reqwest::Client,
    pending: Mutex<Option<FlowState>>,
    open_browser: bool,
}

impl OAuthFlow {
    pub fn new(
        config: Arc<AuthConfig>,
        store: Arc<TokenStore>,
        holder: TokenHolder,
        events: broadcast::Sender<AuthEvent>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            config,
            store,
            holder,
            events,
            http,
            pending: Mutex::new(None),
            open_browser: true,
        }
    }

    /// Disable the system-browser handoff; `initiate_oauth` still returns
    /// the authorization URL for the host to open itself.
    pub fn with_browser_disabled(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Start a sign-in attempt.
    ///
    /// Generates a fresh anti-forgery state token (replacing any pending
    /// flow), opens the authorization URL in the OS default browser, and
    /// returns the URL. A browser that fails to open is logged but not
    /// fatal; the returned URL can be opened manually.
    pub fn initiate_oauth(&self) -> Result<String> {
        let state_token = Uuid::new_v4().to_string();
        let url = self.build_authorize_url(&state_token);

        {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_some() {
                debug!("Discarding previous pending OAuth flow");
            }
            *pending = Some(FlowState {
                state_token,
                started_at: Utc::now(),
            });
        }

        if self.open_browser {
            if let Err(e) = webbrowser::open(&url) {
                warn!(error = %e, "Failed to open browser, authorization URL must be opened manually");
            }
        }

        info!("OAuth flow started, awaiting callback");
        Ok(url)
    }

    /// Complete a sign-in attempt with the values the OS redirect carried.
    ///
    /// The pending flow is consumed whatever the outcome. A missing,
    /// mismatched, or expired state aborts with [`Error::StateMismatch`]
    /// and performs no token exchange; an exchange failure leaves any
    /// previously stored token untouched. Both outcomes are also surfaced
    /// as [`AuthEvent`]s.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<()> {
        let flow = self.pending.lock().unwrap().take();

        let flow = match flow {
            Some(flow) => flow,
            None => {
                warn!("OAuth callback received with no pending flow");
                self.emit(AuthEvent::OAuthError(
                    "No sign-in attempt is in progress".to_string(),
                ));
                return Err(Error::StateMismatch);
            }
        };

        if flow.state_token != state {
            warn!("OAuth callback state does not match pending flow, rejecting");
            self.emit(AuthEvent::OAuthError(
                "Sign-in was rejected: callback did not match this session".to_string(),
            ));
            return Err(Error::StateMismatch);
        }

        if Utc::now() - flow.started_at > Duration::minutes(FLOW_EXPIRY_MINUTES) {
            warn!("OAuth callback arrived after the flow expired, rejecting");
            self.emit(AuthEvent::OAuthError(
                "Sign-in attempt expired, please try again".to_string(),
            ));
            return Err(Error::StateMismatch);
        }

        debug!("OAuth state validated, exchanging code");

        let token = match exchange::exchange_code_for_token(
            &self.http,
            &self.config.oauth_base_url,
            &self.config.client_id,
            &self.config.client_secret,
            code,
            &self.config.redirect_uri,
        )
        .await
        {
            Ok(token) => token,
            Err(e) => {
                self.emit(AuthEvent::OAuthError(e.to_string()));
                return Err(e);
            }
        };

        if let Err(e) = self.store.save_token(&token) {
            self.emit(AuthEvent::OAuthError(e.to_string()));
            return Err(e);
        }
        self.holder.set(token);

        info!("OAuth flow completed successfully");
        self.emit(AuthEvent::OAuthSuccess);
        Ok(())
    }

    /// Whether a flow is currently awaiting its callback.
    pub fn is_awaiting_callback(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    fn build_authorize_url(&self, state: &str) -> String {
        format!(
            "{}/login/oauth/authorize?client_id={}&redirect_uri={}&scope={}&state={}",
            self.config.oauth_base_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scope),
            urlencoding::encode(state)
        )
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers is fine; the host may not be listening yet
        let _ = self.events.send(event);
    }

    #[cfg(test)]
    fn backdate_pending(&self, minutes: i64) {
        if let Some(flow) = self.pending.lock().unwrap().as_mut() {
            flow.started_at = Utc::now() - Duration::minutes(minutes);
        }
    }
}
