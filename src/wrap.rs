//! RSA-OAEP (SHA-256 for both the OAEP digest and MGF1) transport of per-message AES keys.
//!
//! RSA only ever carries the 32-byte content key; AES carries the body. Unwrap failures are
//! reported as a bare `Error::Unwrap` whatever went wrong, so callers can't be turned into a
//! padding oracle.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand_core::OsRng;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::keys::{PrivateKey, PublicKey};
use crate::symmetric::{AesKey, KEY_SIZE};

/// LEGACY_WRAPPED_LEN is the size of a base64-text key as wrapped by older clients
const LEGACY_WRAPPED_LEN: usize = 44;

/// wrap_key encrypts the raw key bytes to `recipient` and returns base64 ciphertext
pub fn wrap_key(recipient: &PublicKey, key: &AesKey) -> Result<String> {
    let wrapped = recipient
        .rsa()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| Error::CryptoProvider(format!("rsa-oaep wrap failed: {e}")))?;
    Ok(STANDARD.encode(wrapped))
}

/// wrap_key_pem is wrap_key for an SPKI PEM straight from storage
pub fn wrap_key_pem(public_key_pem: &str, key: &AesKey) -> Result<String> {
    wrap_key(&PublicKey::from_pem(public_key_pem)?, key)
}

/// unwrap_key recovers the AES key. Accepts both the raw form and the legacy base64-text form.
pub fn unwrap_key(reader: &PrivateKey, wrapped_b64: &str) -> Result<AesKey> {
    let wrapped = STANDARD.decode(wrapped_b64.trim()).map_err(|_| Error::Unwrap)?;
    let plaintext = Zeroizing::new(
        reader
            .rsa()
            .decrypt(Oaep::new::<Sha256>(), &wrapped)
            .map_err(|_| Error::Unwrap)?,
    );
    key_from_unwrapped(&plaintext)
}

/// unwrap_key_pem is unwrap_key for a PKCS8 PEM
pub fn unwrap_key_pem(private_key_pem: &str, wrapped_b64: &str) -> Result<AesKey> {
    unwrap_key(&PrivateKey::from_pem(private_key_pem)?, wrapped_b64)
}

fn key_from_unwrapped(plaintext: &[u8]) -> Result<AesKey> {
    let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
    match plaintext.len() {
        KEY_SIZE => bytes.copy_from_slice(plaintext),
        LEGACY_WRAPPED_LEN => {
            let decoded = Zeroizing::new(STANDARD.decode(plaintext).map_err(|_| Error::Unwrap)?);
            if decoded.len() != KEY_SIZE {
                return Err(Error::Unwrap);
            }
            bytes.copy_from_slice(&decoded);
        }
        _ => return Err(Error::Unwrap),
    }
    Ok(AesKey::from_bytes(*bytes))
}

/* ------------------------------------------------------------------------- */

// TESTS
