// OAuth and storage configuration
pub mod config;

// Error taxonomy
pub mod error;

// Encrypted token storage and the in-memory token slot
pub mod credentials;

// Browser-redirect OAuth flow
pub mod oauth;

// Authenticated GitHub REST API client
pub mod github;

// Repository cloning
pub mod gitops;

// Service wiring and sign-in lifecycle
pub mod session;

/// User agent sent with every outbound HTTP request.
pub const USER_AGENT: &str = "octoclone/0.1";

pub use config::AuthConfig;
pub use error::{Error, Result};
pub use gitops::{is_directory_empty, CloneProgress};
pub use oauth::AuthEvent;
pub use session::Session;
