//! Wiring of the access-layer services and the sign-in lifecycle.
//!
//! [`Session`] owns one of each collaborator: the encrypted token store,
//! the in-memory token holder, the OAuth flow, the API client, and the
//! clone orchestrator. All of them are built from a single [`AuthConfig`]
//! and injected explicitly; nothing here is a process-wide global.

use crate::config::AuthConfig;
use crate::credentials::{TokenHolder, TokenStore};
use crate::error::Result;
use crate::gitops::CloneOrchestrator;
use crate::github::GitHubClient;
use crate::oauth::{AuthEvent, OAuthFlow};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the collaborator notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// The assembled GitHub access layer.
pub struct Session {
    config: Arc<AuthConfig>,
    store: Arc<TokenStore>,
    holder: TokenHolder,
    github: GitHubClient,
    oauth: OAuthFlow,
    cloner: CloneOrchestrator,
    events: broadcast::Sender<AuthEvent>,
}

impl Session {
    /// Build the full service graph from a validated configuration.
    ///
    /// Fails if the credential database cannot be opened. Logs a warning
    /// when the development fallback passphrase is in use.
    pub fn new(config: AuthConfig) -> Result<Self> {
        if config.uses_default_passphrase() {
            warn!(
                "No encryption passphrase configured; falling back to the built-in \
                 development passphrase. Set OCTOCLONE_PASSPHRASE in production."
            );
        }

        let config = Arc::new(config);
        let store = Arc::new(TokenStore::open(&config.storage_path, config.passphrase())?);
        let holder = TokenHolder::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let github = GitHubClient::with_base_url(holder.clone(), config.api_base_url.clone());
        let mut oauth = OAuthFlow::new(
            Arc::clone(&config),
            Arc::clone(&store),
            holder.clone(),
            events.clone(),
        );
        if !config.open_browser {
            oauth = oauth.with_browser_disabled();
        }
        let cloner = CloneOrchestrator::new(holder.clone());

        Ok(Self {
            config,
            store,
            holder,
            github,
            oauth,
            cloner,
            events,
        })
    }

    /// Rehydrate and validate the persisted credential.
    ///
    /// If a stored token exists it is published to the holder and probed
    /// against GitHub; a token that fails validation triggers a full
    /// logout so the host never shows a stale signed-in state. Returns
    /// whether a valid session is active.
    pub async fn startup(&self) -> Result<bool> {
        let token = match self.store.get_token() {
            Some(token) => token,
            None => {
                debug!("No stored credential, starting signed out");
                return Ok(false);
            }
        };

        self.holder.set(token);

        if self.github.validate_token().await {
            info!("Stored credential validated, session restored");
            Ok(true)
        } else {
            warn!("Stored credential failed validation, logging out");
            self.logout()?;
            Ok(false)
        }
    }

    /// Remove the credential from storage and memory and notify
    /// collaborators. Idempotent.
    pub fn logout(&self) -> Result<()> {
        self.store.delete_token()?;
        self.holder.clear();
        let _ = self.events.send(AuthEvent::Logout);
        info!("Logged out");
        Ok(())
    }

    /// Subscribe to collaborator notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Whether a token is currently held in memory.
    pub fn is_signed_in(&self) -> bool {
        self.holder.is_present()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn github(&self) -> &GitHubClient {
        &self.github
    }

    pub fn oauth(&self) -> &OAuthFlow {
        &self.oauth
    }

    pub fn cloner(&self) -> &CloneOrchestrator {
        &self.cloner
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &TokenStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_session(api_base_url: &str) -> (Session, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = AuthConfig::new("client-id", "client-secret").unwrap();
        config.storage_path = dir.path().join("credentials.db");
        config.api_base_url = api_base_url.to_string();

        (Session::new(config).unwrap(), dir)
    }

    #[tokio::test]
    async fn test_startup_without_token() {
        let (session, _dir) = test_session("http://127.0.0.1:1");

        assert!(!session.startup().await.unwrap());
        assert!(!session.is_signed_in());
    }

    #[tokio::test]
    async fn test_startup_with_valid_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer gho_stored")
            .with_status(200)
            .with_body(r#"{"login": "octocat", "id": 1}"#)
            .create_async()
            .await;

        let (session, _dir) = test_session(&server.url());
        session.store().save_token("gho_stored").unwrap();

        assert!(session.startup().await.unwrap());
        assert!(session.is_signed_in());
    }

    #[tokio::test]
    async fn test_startup_with_invalid_token_logs_out() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .create_async()
            .await;

        let (session, _dir) = test_session(&server.url());
        session.store().save_token("gho_revoked").unwrap();
        let mut events = session.subscribe();

        assert!(!session.startup().await.unwrap());

        // The stale credential is gone everywhere
        assert!(!session.is_signed_in());
        assert!(session.store().get_token().is_none());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::Logout);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (session, _dir) = test_session("http://127.0.0.1:1");

        session.logout().unwrap();
        session.logout().unwrap();
        assert!(!session.is_signed_in());
    }
}
