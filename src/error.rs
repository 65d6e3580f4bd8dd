//! Crate-wide error type.
//!
//! Decrypt paths never hand these to callers directly; see `protocol::DecryptOutcome`.

use thiserror::Error;

use crate::envelope::UserId;

#[derive(Debug, Error)]
pub enum Error {
    /// RNG or primitive failure. Fatal for the operation, never retried.
    #[error("crypto provider unavailable: {0}")]
    CryptoProvider(String),

    #[error("authentication tag mismatch (message tampered or wrong key)")]
    Authentication,

    /// Deliberately carries no detail: padding and format failures look identical.
    #[error("unable to unwrap message key")]
    Unwrap,

    #[error("malformed message payload: {0}")]
    Codec(String),

    #[error("no public key on file for user {0}")]
    KeyMissing(UserId),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("user {0} already has keys on file")]
    UserExists(UserId),

    #[error("user {0} already has message history, refusing to regenerate keys")]
    KeyRegenerationRefused(UserId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
