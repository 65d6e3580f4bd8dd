//! Tunables for key issuance and backlog decryption.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// MIN_RSA_KEY_BITS is the smallest modulus we are willing to issue
pub const MIN_RSA_KEY_BITS: usize = 2048;
/// DEFAULT_DECRYPT_WORKERS sizes the backlog decryption pool
pub const DEFAULT_DECRYPT_WORKERS: usize = 4;

/// What login does when a user is found without a complete keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyRegeneration {
    /// Always issue a fresh pair. Anything wrapped under the old public key becomes unreadable.
    #[default]
    Always,
    /// Only issue a fresh pair if no stored envelope involves the user.
    WhenNoHistory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    pub rsa_key_bits: usize,
    pub decrypt_workers: usize,
    pub key_regeneration: KeyRegeneration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            rsa_key_bits: MIN_RSA_KEY_BITS,
            decrypt_workers: DEFAULT_DECRYPT_WORKERS,
            key_regeneration: KeyRegeneration::default(),
        }
    }
}

impl ProtocolConfig {
    /// from_toml_str parses and validates a config; missing keys take their defaults
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: ProtocolConfig = toml::from_str(input).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(Error::Config(format!(
                "rsa_key_bits must be at least {MIN_RSA_KEY_BITS}, got {}",
                self.rsa_key_bits
            )));
        }
        if self.decrypt_workers == 0 {
            return Err(Error::Config("decrypt_workers must be at least 1".into()));
        }
        Ok(())
    }
}

/* ------------------------------------------------------------------------- */

// TESTS
