//! AES-256-GCM over a single message body.
//!
//! Every message gets its own key and its own random 96-bit nonce. `seal` is the only public way
//! to encrypt; it draws the nonce itself, so callers can't pick or repeat one. Tags are kept detached from the
//! ciphertext because the envelope carries them in separate fields.
//!
//! Envelopes written by the old server helper used 128-bit IVs; those still decrypt.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{Aes256Gcm, AesGcm};
use std::fmt;

use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// KEY_SIZE is 32 bytes (AES-256)
pub const KEY_SIZE: usize = 32;
/// NONCE_SIZE is 12 bytes, used for every new message
pub const NONCE_SIZE: usize = 12;
/// LEGACY_NONCE_SIZE is 16 bytes, accepted on decrypt only
pub const LEGACY_NONCE_SIZE: usize = 16;
/// TAG_SIZE is 16 bytes
pub const TAG_SIZE: usize = 16;

type LegacyAes256Gcm = AesGcm<Aes256, U16>;

/// AesKey is a per-message content key. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; KEY_SIZE]);

impl AesKey {
    /// generate draws a key from the OS RNG
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::CryptoProvider(format!("os rng unavailable: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

enum NonceBytes {
    Standard([u8; NONCE_SIZE]),
    Legacy([u8; LEGACY_NONCE_SIZE]),
}

/// Nonce is deliberately not Clone or Copy.
pub struct Nonce(NonceBytes);

impl Nonce {
    /// random draws a fresh 12-byte nonce
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::CryptoProvider(format!("os rng unavailable: {e}")))?;
        Ok(Self(NonceBytes::Standard(bytes)))
    }

    /// from_slice accepts a received 12-byte nonce or a legacy 16-byte IV
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if let Ok(standard) = <[u8; NONCE_SIZE]>::try_from(bytes) {
            return Ok(Self(NonceBytes::Standard(standard)));
        }
        if let Ok(legacy) = <[u8; LEGACY_NONCE_SIZE]>::try_from(bytes) {
            return Ok(Self(NonceBytes::Legacy(legacy)));
        }
        Err(Error::InvalidEnvelope(format!(
            "nonce must be {NONCE_SIZE} or {LEGACY_NONCE_SIZE} bytes, got {}",
            bytes.len()
        )))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            NonceBytes::Standard(bytes) => bytes,
            NonceBytes::Legacy(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTag([u8; TAG_SIZE]);

impl AuthTag {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let tag = <[u8; TAG_SIZE]>::try_from(bytes).map_err(|_| {
            Error::InvalidEnvelope(format!("auth tag must be {TAG_SIZE} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(tag))
    }

    pub fn as_bytes(&self) -> &[u8; TAG_SIZE] {
        &self.0
    }
}

/// Sealed is the output of one encryption: everything a reader needs besides the key.
pub struct Sealed {
    pub nonce: Nonce,
    pub ciphertext: Vec<u8>,
    pub tag: AuthTag,
}

/// encrypt seals plaintext under key, consuming the nonce. Legacy IVs are decrypt-only.
pub(crate) fn encrypt(key: &AesKey, nonce: Nonce, plaintext: &[u8]) -> Result<Sealed> {
    let NonceBytes::Standard(n) = &nonce.0 else {
        return Err(Error::CryptoProvider(format!("refusing to encrypt with a {LEGACY_NONCE_SIZE}-byte IV")));
    };
    let mut buffer = plaintext.to_vec();
    let tag = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()))
        .encrypt_in_place_detached(GenericArray::from_slice(n), b"", &mut buffer)
        .map_err(|_| Error::CryptoProvider("aes-gcm encryption failed".into()))?;
    let tag = AuthTag::from_slice(tag.as_slice())?;
    Ok(Sealed { nonce, ciphertext: buffer, tag })
}

/// seal is encrypt with a fresh random nonce
pub fn seal(key: &AesKey, plaintext: &[u8]) -> Result<Sealed> {
    encrypt(key, Nonce::random()?, plaintext)
}

/// decrypt opens a sealed body. Any tag mismatch is `Error::Authentication`; no partial plaintext escapes.
pub fn decrypt(key: &AesKey, nonce: &Nonce, ciphertext: &[u8], tag: &AuthTag) -> Result<Zeroizing<Vec<u8>>> {
    let key_bytes = GenericArray::from_slice(key.as_bytes());
    let tag = GenericArray::from_slice(tag.as_bytes());
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    match &nonce.0 {
        NonceBytes::Standard(n) => Aes256Gcm::new(key_bytes).decrypt_in_place_detached(
            GenericArray::from_slice(n),
            b"",
            buffer.as_mut_slice(),
            tag,
        ),
        NonceBytes::Legacy(n) => LegacyAes256Gcm::new(key_bytes).decrypt_in_place_detached(
            GenericArray::from_slice(n),
            b"",
            buffer.as_mut_slice(),
            tag,
        ),
    }
    .map_err(|_| Error::Authentication)?;
    Ok(buffer)
}

/* ------------------------------------------------------------------------- */

// TESTS
