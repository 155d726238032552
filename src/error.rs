//! Error types for the GitHub access layer.

use thiserror::Error;

/// Errors surfaced by the access layer.
///
/// Each variant maps to a distinct failure class with its own recovery
/// policy: configuration and clone errors propagate to the caller,
/// state mismatches abort the OAuth flow locally, and a 401 that
/// survives re-validation is reported per-call without touching the
/// stored credential.
#[derive(Debug, Error)]
pub enum Error {
    /// Required OAuth configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// OAuth callback state did not match the pending flow (possible CSRF).
    #[error("OAuth state mismatch: callback does not belong to the pending flow")]
    StateMismatch,

    /// Exchanging the authorization code for an access token failed.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Encrypting or decrypting the stored credential failed.
    #[error("Credential encryption error: {0}")]
    Crypto(String),

    /// Reading from or writing to the credential database failed.
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// A GitHub API request failed for a reason other than authentication.
    #[error("GitHub API error: {0}")]
    Api(String),

    /// A 401 response survived one re-validation and retry.
    #[error("GitHub rejected the access token after re-validation")]
    AuthExpired,

    /// Cloning a repository failed.
    #[error("Clone failed: {0}")]
    Clone(String),
}

pub type Result<T> = std::result::Result<T, Error>;
