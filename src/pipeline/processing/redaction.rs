//! Column redaction.
//!
//! Two explicit modes:
//! - Reversible: AES-256-GCM under a 32-byte key. Each value gets a fresh
//!   random nonce; the token is URL-safe base64 of `nonce || ciphertext`.
//! - Irreversible: hex SHA-256 digest. Deliberately lossy. Digests cannot be
//!   turned back into source values, so this mode is unsuitable wherever a
//!   downstream consumer needs to look the original up.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::info;

use super::CleaningStage;
use crate::config::{RedactionConfig, RedactionMode};
use crate::error::{CleanseError, Result};
use crate::pipeline::audit::StageReport;
use crate::table::{Cell, RecordTable};

pub const STAGE: &str = "redaction";

/// Key size for AES-256 (32 bytes)
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Symmetric key material. Never printed and never written into a table.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode URL-safe base64 holding exactly 32 bytes
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| CleanseError::Config(format!("encryption key is not valid base64: {e}")))?;
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            CleanseError::Config(format!("encryption key must be {} bytes, got {}", KEY_SIZE, b.len()))
        })?;
        Ok(Self(key))
    }

    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| CleanseError::Crypto(format!("AES init error: {e}")))
    }
}

impl TryFrom<String> for EncryptionKey {
    type Error = CleanseError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_base64(&value)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(**redacted**)")
    }
}

/// Encrypt one value into a URL-safe token
pub fn encrypt_value(key: &EncryptionKey, plaintext: &str) -> Result<String> {
    let cipher = key.cipher()?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| CleanseError::Crypto(format!("Encryption error: {e}")))?;

    let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    token.extend_from_slice(&nonce);
    token.extend_from_slice(&ciphertext);
    Ok(URL_SAFE.encode(token))
}

/// Recover the original text of a token produced by `encrypt_value`
pub fn decrypt_value(key: &EncryptionKey, token: &str) -> Result<String> {
    let raw = URL_SAFE
        .decode(token.trim())
        .map_err(|e| CleanseError::Crypto(format!("token is not valid base64: {e}")))?;
    if raw.len() < NONCE_SIZE {
        return Err(CleanseError::Crypto("token is too short".to_string()));
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);

    let plaintext = key
        .cipher()?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CleanseError::Crypto("Decryption failed: wrong key or corrupted data".to_string()))?;

    String::from_utf8(plaintext).map_err(|e| CleanseError::Crypto(format!("decrypted value is not UTF-8: {e}")))
}

/// One-way digest, hex encoded
pub fn hash_value(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Redaction capability, chosen explicitly by mode
#[derive(Debug, Clone)]
pub enum Redactor {
    Reversible(EncryptionKey),
    Irreversible,
}

impl Redactor {
    pub fn from_config(config: &RedactionConfig) -> Result<Self> {
        match (config.mode, &config.encryption_key) {
            (RedactionMode::Reversible, Some(key)) => Ok(Redactor::Reversible(key.clone())),
            (RedactionMode::Reversible, None) => Err(CleanseError::Config(
                "reversible redaction requires an encryption key".to_string(),
            )),
            (RedactionMode::Irreversible, _) => Ok(Redactor::Irreversible),
        }
    }

    pub fn mode(&self) -> RedactionMode {
        match self {
            Redactor::Reversible(_) => RedactionMode::Reversible,
            Redactor::Irreversible => RedactionMode::Irreversible,
        }
    }

    pub fn conceal(&self, plaintext: &str) -> Result<String> {
        match self {
            Redactor::Reversible(key) => encrypt_value(key, plaintext),
            Redactor::Irreversible => Ok(hash_value(plaintext)),
        }
    }

    pub fn reveal(&self, token: &str) -> Result<String> {
        match self {
            Redactor::Reversible(key) => decrypt_value(key, token),
            Redactor::Irreversible => Err(CleanseError::Crypto(
                "values redacted with the irreversible mode cannot be recovered".to_string(),
            )),
        }
    }
}

/// Replaces one column's values with their redacted text. Missing values stay missing.
#[derive(Debug, Clone)]
pub struct RedactionStage {
    column: String,
    redactor: Redactor,
}

impl RedactionStage {
    pub fn new(column: impl Into<String>, redactor: Redactor) -> Self {
        Self {
            column: column.into(),
            redactor,
        }
    }

    pub fn from_config(config: &RedactionConfig) -> Result<Self> {
        Ok(Self::new(config.column.clone(), Redactor::from_config(config)?))
    }
}

/// Reverse `RedactionStage` on one column in place. Returns the number of values recovered.
pub fn reveal_column(table: &mut RecordTable, column: &str, redactor: &Redactor) -> Result<usize> {
    let column = table.require_column_mut("decrypt", column)?;
    let mut revealed = 0;
    for cell in column.cells.iter_mut() {
        let Some(token) = cell.to_text() else { continue };
        *cell = Cell::Text(redactor.reveal(&token)?);
        revealed += 1;
    }
    Ok(revealed)
}

impl CleaningStage for RedactionStage {
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, mut table: RecordTable) -> Result<(RecordTable, StageReport)> {
        let mut report = StageReport::start(STAGE, &table);
        let column = table.require_column_mut(STAGE, &self.column)?;

        let mut redacted = 0;
        for cell in column.cells.iter_mut() {
            let Some(plaintext) = cell.to_text() else { continue };
            *cell = Cell::Text(self.redactor.conceal(&plaintext)?);
            redacted += 1;
        }
        info!(
            "Redacted {} values in '{}' ({:?} mode)",
            redacted,
            self.column,
            self.redactor.mode()
        );

        report.add_count("redacted", redacted);
        let report = report.finish(&table);
        Ok((table, report))
    }
}
