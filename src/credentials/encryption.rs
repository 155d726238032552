//! AES-256-GCM encryption for the stored access token.
//!
//! The 256-bit key is derived from a passphrase with SHA-256, so the raw
//! passphrase is never used as key material directly. Every encryption
//! call draws a fresh random 96-bit nonce; nonce reuse is prevented by
//! construction, not by checking.

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Size of the GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// Size of the nonce in bytes (96 bits, standard for GCM).
const NONCE_SIZE: usize = 12;

/// An encrypted credential at rest.
///
/// All three fields are hex-encoded byte strings. Decryption fails closed
/// if the authentication tag does not verify.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Derives a fixed-length 256-bit key from a passphrase.
pub fn derive_key(passphrase: &str) -> [u8; 32] {
    let digest = Sha256::digest(passphrase.as_bytes());
    digest.into()
}

/// Encrypts plaintext using AES-256-GCM with a random nonce.
///
/// # Returns
/// * `Ok(EncryptedBlob)` - Ciphertext, nonce, and authentication tag
/// * `Err(Error::Crypto)` - If encryption fails
pub fn encrypt(plaintext: &str, key: &[u8; 32]) -> Result<EncryptedBlob> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    // Fresh random nonce per call (never reuse)
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut combined = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    // aes-gcm appends the 16-byte tag to the ciphertext; store it separately
    let tag = combined.split_off(combined.len() - TAG_SIZE);

    Ok(EncryptedBlob {
        ciphertext: hex::encode(&combined),
        iv: hex::encode(nonce),
        auth_tag: hex::encode(&tag),
    })
}

/// Decrypts an [`EncryptedBlob`] using AES-256-GCM.
///
/// Fails (rather than returning corrupted plaintext) if the key is wrong,
/// the data was tampered with, or any field is not valid hex.
pub fn decrypt(blob: &EncryptedBlob, key: &[u8; 32]) -> Result<String> {
    let ciphertext = hex::decode(&blob.ciphertext)
        .map_err(|e| Error::Crypto(format!("Invalid ciphertext encoding: {}", e)))?;
    let iv = hex::decode(&blob.iv)
        .map_err(|e| Error::Crypto(format!("Invalid nonce encoding: {}", e)))?;
    let tag = hex::decode(&blob.auth_tag)
        .map_err(|e| Error::Crypto(format!("Invalid auth tag encoding: {}", e)))?;

    if iv.len() != NONCE_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            iv.len()
        )));
    }
    if tag.len() != TAG_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid auth tag size: expected {}, got {}",
            TAG_SIZE,
            tag.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    let nonce = Nonce::from_slice(&iv);

    // Recombine ciphertext || tag for the AEAD interface
    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);

    let plaintext = cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|_| Error::Crypto("Decryption failed (wrong key or tampered data)".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|e| Error::Crypto(format!("Decrypted data is not valid UTF-8: {}", e)))
}
