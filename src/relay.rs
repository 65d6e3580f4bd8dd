//! Server side: key custody at signup/login, and accepting, storing and pushing envelopes.
//!
//! The relay never sees plaintext. It does hold every user's private key and hands it back on
//! login so the client can read; see DESIGN.md for why that custody model is kept as-is.

use std::fmt;

use chrono::Utc;
use zeroize::Zeroizing;

use crate::config::{KeyRegeneration, ProtocolConfig};
use crate::envelope::{MessageEnvelope, MessageId, UserId};
use crate::error::{Error, Result};
use crate::keys::{issue_key_pair_with_bits, KeyPairPem};
use crate::store::{Store, Transport};

/// KeyTransfer is the `{publicKey, privateKey}` body returned once per signup/login.
pub struct KeyTransfer {
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

impl KeyTransfer {
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "publicKey": self.public_key,
            "privateKey": self.private_key.as_str(),
        })
        .to_string()
    }
}

impl From<KeyPairPem> for KeyTransfer {
    fn from(pair: KeyPairPem) -> Self {
        Self { public_key: pair.public_key_pem, private_key: pair.private_key_pem }
    }
}

impl fmt::Debug for KeyTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTransfer")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

pub struct Relay<S, T> {
    store: S,
    transport: T,
    config: ProtocolConfig,
}

impl<S: Store, T: Transport> Relay<S, T> {
    pub fn new(store: S, transport: T, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, transport, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// signup issues and persists a keypair. No keypair, no account. An existing pair is never replaced.
    pub fn signup(&self, user: &UserId) -> Result<KeyTransfer> {
        if self.store.find_user_public_key(user)?.is_some() || self.store.find_user_private_key(user)?.is_some() {
            tracing::warn!(%user, "signup refused, keys already on file");
            return Err(Error::UserExists(user.clone()));
        }
        let pair = issue_key_pair_with_bits(self.config.rsa_key_bits)?;
        self.store.persist_user_keys(user, &pair)?;
        tracing::info!(%user, "keys issued at signup");
        Ok(pair.into())
    }

    /// login returns the stored pair, or repairs a missing/half pair per the regeneration policy
    pub fn login(&self, user: &UserId) -> Result<KeyTransfer> {
        let public_key = self.store.find_user_public_key(user)?;
        let private_key = self.store.find_user_private_key(user)?;
        if let (Some(public_key), Some(private_key)) = (public_key, private_key) {
            return Ok(KeyTransfer { public_key, private_key });
        }

        let history = self.store.count_envelopes_involving(user)?;
        if history > 0 {
            match self.config.key_regeneration {
                KeyRegeneration::WhenNoHistory => return Err(Error::KeyRegenerationRefused(user.clone())),
                KeyRegeneration::Always => {
                    tracing::warn!(%user, history, "regenerating keys; earlier messages to this user become unreadable")
                }
            }
        }
        let pair = issue_key_pair_with_bits(self.config.rsa_key_bits)?;
        self.store.persist_user_keys(user, &pair)?;
        tracing::info!(%user, "keys regenerated at login");
        Ok(pair.into())
    }

    /// public_key_of is what a sender fetches before encrypting
    pub fn public_key_of(&self, user: &UserId) -> Result<String> {
        self.store
            .find_user_public_key(user)?
            .ok_or_else(|| Error::KeyMissing(user.clone()))
    }

    /// submit assigns the message id and timestamp, validates, persists, then pushes.
    /// The stored envelope is returned. A failed push doesn't undo the message.
    pub fn submit(&self, mut envelope: MessageEnvelope) -> Result<MessageEnvelope> {
        envelope.id = MessageId::random();
        envelope.created_at = Utc::now();
        envelope.validate()?;
        self.store.persist_envelope(&envelope)?;
        tracing::debug!(message = %envelope.id, receiver = %envelope.receiver_id, "envelope stored");
        if let Err(err) = self.transport.on_envelope_ready(&envelope) {
            tracing::warn!(message = %envelope.id, %err, "push delivery failed");
        }
        Ok(envelope)
    }

    pub fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<MessageEnvelope>> {
        self.store.fetch_envelopes_for_conversation(a, b)
    }
}

/* ------------------------------------------------------------------------- */

// TESTS
