//! Secret resolution and at-rest encryption of chat credentials.
//!
//! A secret can be given inline, as a file path (container secrets), or as
//! the name of an environment variable. The first non-empty source wins.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from, in order: an inline value, a file, an env var.
/// Empty strings count as absent. Values are trimmed.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.trim().to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return std::fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|source| SecretError::FileReadError {
                path: expanded,
                source,
            });
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but a missing source yields `Ok(None)`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands a leading `~` (HOME, then USERPROFILE). `~user` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Env var holding the hex key used to encrypt stored bot credentials.
pub const TOKEN_KEY_ENV_VAR: &str = "LINKCAST_TOKEN_KEY";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// AES-256-GCM sealing for bot tokens kept in the `installations` table.
///
/// The team id is bound as associated data, so a sealed token copied onto
/// another team's row fails to open. Output is lowercase hex of
/// `nonce || ciphertext`.
pub struct TokenEncryptor {
    cipher: Aes256Gcm,
}

impl TokenEncryptor {
    pub fn from_secret(key: &SecretString) -> Result<Self> {
        Self::from_hex_key(key.expose_secret())
    }

    /// Accepts a 64-character hex key.
    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let key = hex_decode(key_hex.trim()).map_err(SecretError::InvalidKey)?;
        if key.len() != KEY_LEN {
            return Err(SecretError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, team_id: &str, token: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce)
            .map_err(|e| SecretError::EncryptionError(format!("no randomness for nonce: {}", e)))?;

        let payload = Payload {
            msg: token.as_bytes(),
            aad: team_id.as_bytes(),
        };
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut out = hex_encode(&nonce);
        out.push_str(&hex_encode(&sealed));
        Ok(out)
    }

    pub fn open(&self, team_id: &str, sealed_hex: &str) -> Result<SecretString> {
        let raw = hex_decode(sealed_hex).map_err(SecretError::DecryptionError)?;
        if raw.len() <= NONCE_LEN {
            return Err(SecretError::DecryptionError("sealed token is truncated".into()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);

        let payload = Payload {
            msg: sealed,
            aad: team_id.as_bytes(),
        };
        let token = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| {
                SecretError::DecryptionError(format!("token for {} did not verify", team_id))
            })?;
        String::from_utf8(token)
            .map(SecretString::from)
            .map_err(|_| SecretError::DecryptionError("token is not UTF-8".into()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err(format!("odd hex length {}", hex.len()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .filter(|pair| pair.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("bad hex digit at offset {}", i))
        })
        .collect()
}
