//! Per-user RSA keypairs: issuance, PEM parsing, and fingerprints.
//!
//! Public keys travel as SPKI PEM, private keys as PKCS8 PEM. Persisting them is the caller's job.

use std::fmt;

use rand_core::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::MIN_RSA_KEY_BITS;
use crate::error::{Error, Result};

/// RSA_KEY_BITS is the modulus size issued at signup
pub const RSA_KEY_BITS: usize = MIN_RSA_KEY_BITS;

/// KeyPairPem is a freshly issued (or stored) keypair in transport form.
pub struct KeyPairPem {
    pub public_key_pem: String,
    pub private_key_pem: Zeroizing<String>,
}

impl fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("public_key_pem", &self.public_key_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// issue_key_pair generates a 2048-bit keypair
pub fn issue_key_pair() -> Result<KeyPairPem> {
    issue_key_pair_with_bits(RSA_KEY_BITS)
}

/// issue_key_pair_with_bits generates a keypair of the given modulus size (never below 2048)
pub fn issue_key_pair_with_bits(bits: usize) -> Result<KeyPairPem> {
    if bits < MIN_RSA_KEY_BITS {
        return Err(Error::InvalidKey(format!("refusing to issue a {bits}-bit RSA key")));
    }
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| Error::CryptoProvider(format!("rsa keygen failed: {e}")))?;
    let public = RsaPublicKey::from(&private);
    let private_key_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::CryptoProvider(format!("pkcs8 encoding failed: {e}")))?;
    let public_key_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::CryptoProvider(format!("spki encoding failed: {e}")))?;
    let fingerprint = fingerprint(&public)?;
    tracing::info!(%fingerprint, bits, "issued rsa keypair");
    Ok(KeyPairPem { public_key_pem, private_key_pem })
}

/// fingerprint is the hex SHA-256 of the SPKI DER encoding; safe to log
pub fn fingerprint(public: &RsaPublicKey) -> Result<String> {
    let der = public
        .to_public_key_der()
        .map_err(|e| Error::InvalidKey(format!("spki encoding failed: {e}")))?;
    Ok(hex::encode(Sha256::digest(der.as_bytes())))
}

/// PublicKey is a parsed recipient key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = RsaPublicKey::from_public_key_pem(pem.trim())
            .map_err(|_| Error::InvalidKey("public key is not SPKI PEM".into()))?;
        Ok(Self { inner })
    }

    pub fn fingerprint(&self) -> Result<String> {
        fingerprint(&self.inner)
    }

    pub(crate) fn rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

/// PrivateKey is a parsed reader key. Its Debug output never shows key material.
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs8_pem(pem.trim())
            .map_err(|_| Error::InvalidKey("private key is not PKCS8 PEM".into()))?;
        Ok(Self { inner })
    }

    /// public_key derives the matching public half
    pub fn public_key(&self) -> PublicKey {
        PublicKey { inner: RsaPublicKey::from(&self.inner) }
    }

    pub(crate) fn rsa(&self) -> &RsaPrivateKey {
        &self.inner
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/* ------------------------------------------------------------------------- */

// TESTS
