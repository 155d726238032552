//! Encrypted token persistence backed by SQLite.
//!
//! A single well-known row holds the GitHub access token as an
//! [`EncryptedBlob`]. The encryption key is derived once per store from
//! the configured passphrase.

use super::encryption::{self, EncryptedBlob};
use crate::error::{Error, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

/// Well-known storage key for the single persisted credential.
const TOKEN_KEY: &str = "github_token";

/// Encrypted storage for the GitHub access token.
///
/// # Schema
/// ```sql
/// CREATE TABLE secure_storage (
///     name TEXT PRIMARY KEY,
///     ciphertext TEXT NOT NULL,  -- hex
///     iv TEXT NOT NULL,          -- hex
///     auth_tag TEXT NOT NULL,    -- hex
///     updated_at TEXT NOT NULL   -- ISO 8601
/// );
/// ```
///
/// # Thread safety
/// The connection is behind a `Mutex`; SQLite itself runs in serialized
/// mode.
pub struct TokenStore {
    conn: Mutex<Connection>,
    key: [u8; 32],
}

impl TokenStore {
    /// Creates or opens a token store at `db_path`.
    ///
    /// The 256-bit encryption key is derived from `passphrase` with
    /// SHA-256. Parent directories are created as needed.
    pub fn open<P: AsRef<Path>>(db_path: P, passphrase: &str) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!(
                        "Failed to create storage directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open credential database: {}", e)))?;

        Self::with_connection(conn, passphrase)
    }

    /// Creates an in-memory store (tests).
    #[cfg(test)]
    pub fn open_in_memory(passphrase: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to open in-memory database: {}", e)))?;
        Self::with_connection(conn, passphrase)
    }

    fn with_connection(conn: Connection, passphrase: &str) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS secure_storage (
                name TEXT PRIMARY KEY,
                ciphertext TEXT NOT NULL,
                iv TEXT NOT NULL,
                auth_tag TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| Error::Storage(format!("Failed to create storage table: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            key: encryption::derive_key(passphrase),
        })
    }

    /// Encrypts and persists `token`, overwriting any prior value.
    ///
    /// Encryption or write failures are fatal to this call and surface to
    /// the caller.
    pub fn save_token(&self, token: &str) -> Result<()> {
        let blob = self.encrypt(token)?;

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO secure_storage (name, ciphertext, iv, auth_tag, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(name) DO UPDATE SET
                    ciphertext = excluded.ciphertext,
                    iv = excluded.iv,
                    auth_tag = excluded.auth_tag,
                    updated_at = excluded.updated_at
                "#,
                params![
                    TOKEN_KEY,
                    blob.ciphertext,
                    blob.iv,
                    blob.auth_tag,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to persist token: {}", e)))?;

        Ok(())
    }

    /// Retrieves and decrypts the stored token.
    ///
    /// Returns `None` when no token is stored, and also when the row is
    /// unreadable or fails to decrypt: a corrupted credential is treated
    /// the same as a missing one, so the caller re-prompts for sign-in
    /// either way.
    pub fn get_token(&self) -> Option<String> {
        let blob = match self.read_blob() {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token, treating as absent");
                return None;
            }
        };

        match encryption::decrypt(&blob, &self.key) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Stored token failed to decrypt, treating as absent");
                None
            }
        }
    }

    /// Removes the stored token. Idempotent: deleting an absent token is
    /// not an error.
    pub fn delete_token(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM secure_storage WHERE name = ?1",
                params![TOKEN_KEY],
            )
            .map_err(|e| Error::Storage(format!("Failed to delete token: {}", e)))?;
        Ok(())
    }

    fn encrypt(&self, token: &str) -> Result<EncryptedBlob> {
        encryption::encrypt(token, &self.key)
    }

    fn read_blob(&self) -> Result<Option<EncryptedBlob>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT ciphertext, iv, auth_tag FROM secure_storage WHERE name = ?1",
            params![TOKEN_KEY],
            |row| {
                Ok(EncryptedBlob {
                    ciphertext: row.get(0)?,
                    iv: row.get(1)?,
                    auth_tag: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to query token: {}", e)))
    }

    /// Writes a raw blob under the token key (tests exercise corrupt data).
    #[cfg(test)]
    fn write_raw_blob(&self, blob: &EncryptedBlob) {
        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO secure_storage (name, ciphertext, iv, auth_tag, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(name) DO UPDATE SET
                    ciphertext = excluded.ciphertext,
                    iv = excluded.iv,
                    auth_tag = excluded.auth_tag,
                    updated_at = excluded.updated_at
                "#,
                params![
                    TOKEN_KEY,
                    blob.ciphertext,
                    blob.iv,
                    blob.auth_tag,
                    Utc::now().to_rfc3339(),
                ],
            )
            .unwrap();
    }
}
