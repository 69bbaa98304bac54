use crate::error::{ConfigError, WalletError};
use anyhow::Result;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// A raw EVM private key, hex encoded without the `0x` prefix.
///
/// The buffer is wiped on drop and never shows up in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(***REDACTED***)")
    }
}

/// Newline-delimited key source. Blank lines and `#` comments are ignored;
/// malformed lines are skipped with a warning that names the line, not the key.
#[derive(Debug)]
pub struct WalletManager {
    keys: Vec<PrivateKey>,
}

impl WalletManager {
    pub const PV_FILE: &'static str = "private_keys.txt";

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
            ConfigError::IoError {
                path: path.display().to_string(),
                msg: e.to_string(),
            }
        })?);

        let keys = Self::parse_keys(&content);
        if keys.is_empty() {
            return Err(WalletError::NoValidKeys {
                path: path.display().to_string(),
            }
            .into());
        }

        info!("[WalletManager] Loaded {} keys from {}", keys.len(), path.display());
        Ok(Self { keys })
    }

    pub fn parse_keys(content: &str) -> Vec<PrivateKey> {
        let mut keys = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            match Self::validate(trimmed, idx + 1) {
                Ok(key) => keys.push(key),
                Err(e) => warn!("[WalletManager] Skipping key: {}", e),
            }
        }

        keys
    }

    fn validate(raw: &str, line: usize) -> std::result::Result<PrivateKey, WalletError> {
        let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
        if hex_part.len() != 64 {
            return Err(WalletError::InvalidKeyLength {
                line,
                length: hex_part.len(),
            });
        }
        if hex::decode(hex_part).is_err() {
            return Err(WalletError::InvalidKeyFormat { line });
        }
        Ok(PrivateKey(hex_part.to_string()))
    }

    /// Returns the number of available wallets
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[PrivateKey] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<PrivateKey> {
        self.keys
    }
}
