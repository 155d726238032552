//! OAuth and storage configuration.
//!
//! Configuration is read once at startup and immutable afterwards. The
//! client id and secret are mandatory; everything else has a sensible
//! default. Values come from `OCTOCLONE_*` environment variables, with an
//! optional TOML file overriding individual fields.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Default custom-scheme redirect registered with the OS.
pub const DEFAULT_REDIRECT_URI: &str = "octoclone://oauth/callback";

/// Default OAuth scopes requested from GitHub.
pub const DEFAULT_SCOPE: &str = "repo user";

/// Fallback passphrase used when none is configured.
///
/// Deployments must override this via `OCTOCLONE_PASSPHRASE`; the store
/// logs a warning when the fallback is in use, and
/// `OCTOCLONE_REQUIRE_PASSPHRASE=true` makes the fallback a hard error.
pub const DEFAULT_PASSPHRASE: &str = "octoclone-dev-passphrase-override-me";

const DEFAULT_OAUTH_BASE_URL: &str = "https://github.com";
const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Process-wide authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// GitHub OAuth app client id.
    pub client_id: String,

    /// GitHub OAuth app client secret.
    pub client_secret: String,

    /// Redirect URI the OS hands back to us after authorization.
    pub redirect_uri: String,

    /// Space-separated OAuth scopes.
    pub scope: String,

    /// Passphrase for at-rest token encryption. `None` selects the
    /// development fallback.
    pub encryption_passphrase: Option<String>,

    /// Location of the credential database.
    pub storage_path: PathBuf,

    /// Base URL for the OAuth endpoints (overridable for tests).
    pub oauth_base_url: String,

    /// Base URL for the REST API (overridable for tests).
    pub api_base_url: String,

    /// Whether `initiate_oauth` launches the OS default browser. Hosts
    /// that present the authorization URL themselves can turn this off.
    pub open_browser: bool,
}

/// Optional per-field overrides loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
struct FileOverrides {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    encryption_passphrase: Option<String>,
    storage_path: Option<PathBuf>,
}

impl AuthConfig {
    /// Build a configuration from explicit credentials, using defaults
    /// for everything else.
    ///
    /// # Errors
    /// `Error::Configuration` if the client id or secret is empty.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if client_id.is_empty() || client_secret.is_empty() {
            return Err(Error::Configuration(
                "GitHub OAuth client id and secret must be set".to_string(),
            ));
        }

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            encryption_passphrase: None,
            storage_path: default_storage_path(),
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            open_browser: true,
        })
    }

    /// Load configuration from `OCTOCLONE_*` environment variables.
    ///
    /// Missing `OCTOCLONE_CLIENT_ID` or `OCTOCLONE_CLIENT_SECRET` is a
    /// fatal configuration error. With `OCTOCLONE_REQUIRE_PASSPHRASE=true`
    /// an unset `OCTOCLONE_PASSPHRASE` is fatal as well.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("OCTOCLONE_CLIENT_ID").unwrap_or_default();
        let client_secret = std::env::var("OCTOCLONE_CLIENT_SECRET").unwrap_or_default();

        let mut cfg = Self::new(client_id, client_secret)?;

        if let Ok(v) = std::env::var("OCTOCLONE_REDIRECT_URI") {
            cfg.redirect_uri = v;
        }
        if let Ok(v) = std::env::var("OCTOCLONE_SCOPE") {
            cfg.scope = v;
        }
        if let Ok(v) = std::env::var("OCTOCLONE_PASSPHRASE") {
            if !v.is_empty() {
                cfg.encryption_passphrase = Some(v);
            }
        }
        if let Ok(v) = std::env::var("OCTOCLONE_STORAGE_PATH") {
            cfg.storage_path = PathBuf::from(v);
        }

        cfg.check_passphrase_policy(env_flag("OCTOCLONE_REQUIRE_PASSPHRASE"))?;
        Ok(cfg)
    }

    /// Load configuration from a TOML file, falling back to environment
    /// variables for any field the file does not set.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let overrides: FileOverrides = toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Invalid config file {}: {}", path.display(), e))
        })?;

        let client_id = overrides
            .client_id
            .or_else(|| std::env::var("OCTOCLONE_CLIENT_ID").ok())
            .unwrap_or_default();
        let client_secret = overrides
            .client_secret
            .or_else(|| std::env::var("OCTOCLONE_CLIENT_SECRET").ok())
            .unwrap_or_default();

        let mut cfg = Self::new(client_id, client_secret)?;

        if let Some(v) = overrides.redirect_uri {
            cfg.redirect_uri = v;
        }
        if let Some(v) = overrides.scope {
            cfg.scope = v;
        }
        if let Some(v) = overrides.encryption_passphrase {
            cfg.encryption_passphrase = Some(v);
        }
        if let Some(v) = overrides.storage_path {
            cfg.storage_path = v;
        }

        cfg.check_passphrase_policy(env_flag("OCTOCLONE_REQUIRE_PASSPHRASE"))?;
        Ok(cfg)
    }

    /// The passphrase the token store derives its key from.
    pub fn passphrase(&self) -> &str {
        self.encryption_passphrase
            .as_deref()
            .unwrap_or(DEFAULT_PASSPHRASE)
    }

    /// Whether the development fallback passphrase is in use.
    pub fn uses_default_passphrase(&self) -> bool {
        self.encryption_passphrase.is_none()
    }

    fn check_passphrase_policy(&self, require_passphrase: bool) -> Result<()> {
        if require_passphrase && self.uses_default_passphrase() {
            return Err(Error::Configuration(
                "OCTOCLONE_REQUIRE_PASSPHRASE is set but OCTOCLONE_PASSPHRASE is not".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("octoclone")
        .join("credentials.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(AuthConfig::new("", "secret").is_err());
        assert!(AuthConfig::new("id", "").is_err());
        assert!(AuthConfig::new("", "").is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg = AuthConfig::new("id", "secret").unwrap();
        assert_eq!(cfg.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(cfg.scope, DEFAULT_SCOPE);
        assert_eq!(cfg.oauth_base_url, "https://github.com");
        assert_eq!(cfg.api_base_url, "https://api.github.com");
        assert!(cfg.uses_default_passphrase());
        assert_eq!(cfg.passphrase(), DEFAULT_PASSPHRASE);
    }

    #[test]
    fn test_explicit_passphrase() {
        let mut cfg = AuthConfig::new("id", "secret").unwrap();
        cfg.encryption_passphrase = Some("hunter2".to_string());
        assert!(!cfg.uses_default_passphrase());
        assert_eq!(cfg.passphrase(), "hunter2");
    }

    #[test]
    fn test_require_passphrase_policy() {
        let cfg = AuthConfig::new("id", "secret").unwrap();
        assert!(cfg.check_passphrase_policy(true).is_err());
        assert!(cfg.check_passphrase_policy(false).is_ok());

        let mut cfg = cfg;
        cfg.encryption_passphrase = Some("hunter2".to_string());
        assert!(cfg.check_passphrase_policy(true).is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            client_id = "file-id"
            client_secret = "file-secret"
            scope = "repo"
            encryption_passphrase = "from-file"
            "#
        )
        .unwrap();

        let cfg = AuthConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.client_id, "file-id");
        assert_eq!(cfg.client_secret, "file-secret");
        assert_eq!(cfg.scope, "repo");
        assert_eq!(cfg.passphrase(), "from-file");
        // Unset fields keep their defaults
        assert_eq!(cfg.redirect_uri, DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "client_id = [not toml").unwrap();
        assert!(AuthConfig::from_file(file.path()).is_err());
    }
}
