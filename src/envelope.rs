//! The wire envelope: what the server stores and relays.
//!
//! The server sees who talked to whom and when; the body and the content key are opaque to it.
//! Envelopes are immutable once built. All binary fields are standard base64 and must survive
//! a JSON round trip byte for byte.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::symmetric::{AuthTag, Nonce};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// MessageId is the identity the decryption cache is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which wrapped-key slot a reader opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderRole {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    #[serde(alias = "_id")]
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// AES-GCM ciphertext without the tag.
    pub encrypted_content: String,
    pub iv: String,
    pub auth_tag: String,
    pub sender_encrypted_key: String,
    pub receiver_encrypted_key: String,
    /// Deprecated plaintext fallback. Accepted from old clients, never written, never trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Deprecated plaintext fallback, same as `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// role_of says which slot `user` reads, or None if they are not a party. Self-addressed
    /// messages read the sender slot.
    pub fn role_of(&self, user: &UserId) -> Option<ReaderRole> {
        if &self.sender_id == user {
            Some(ReaderRole::Sender)
        } else if &self.receiver_id == user {
            Some(ReaderRole::Receiver)
        } else {
            None
        }
    }

    pub fn wrapped_key_for(&self, role: ReaderRole) -> &str {
        match role {
            ReaderRole::Sender => &self.sender_encrypted_key,
            ReaderRole::Receiver => &self.receiver_encrypted_key,
        }
    }

    pub fn involves(&self, user: &UserId) -> bool {
        self.role_of(user).is_some()
    }

    /// validate is the structural check the server runs before persisting
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("encryptedContent", &self.encrypted_content),
            ("iv", &self.iv),
            ("authTag", &self.auth_tag),
            ("senderEncryptedKey", &self.sender_encrypted_key),
            ("receiverEncryptedKey", &self.receiver_encrypted_key),
        ];
        for (field, value) in required {
            // An empty body is legal (empty ciphertext), everything else must be present
            if value.is_empty() && field != "encryptedContent" {
                return Err(Error::InvalidEnvelope(format!("missing {field}")));
            }
            decode_field(field, value)?;
        }
        self.nonce()?;
        self.tag()?;
        if self.id.as_str().is_empty() {
            return Err(Error::InvalidEnvelope("missing id".into()));
        }
        Ok(())
    }

    pub fn nonce(&self) -> Result<Nonce> {
        Nonce::from_slice(&decode_field("iv", &self.iv)?)
    }

    pub fn tag(&self) -> Result<AuthTag> {
        AuthTag::from_slice(&decode_field("authTag", &self.auth_tag)?)
    }

    pub fn ciphertext(&self) -> Result<Vec<u8>> {
        decode_field("encryptedContent", &self.encrypted_content)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| Error::InvalidEnvelope(format!("{field} is not base64: {e}")))
}

/* ------------------------------------------------------------------------- */

// TESTS
