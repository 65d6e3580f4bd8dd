//! The client's logged-in state: who we are, the key we read with, and what we've decrypted.
//!
//! Everything here lives and dies with the session. Plaintext is only ever held in the cache,
//! which is emptied on key rotation and on logout.

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::cache::{CacheStats, DecryptionCache};
use crate::codec::DecryptedPayload;
use crate::config::ProtocolConfig;
use crate::envelope::{MessageEnvelope, MessageId, UserId};
use crate::error::{Error, Result};
use crate::keys::PublicKey;
use crate::protocol::{encrypt_for_send, Correspondent, DecryptOutcome, Reader};
use crate::relay::{KeyTransfer, Relay};
use crate::store::{Store, Transport};

/// ConversationEntry pairs a stored envelope with what this session could make of it.
#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub envelope: MessageEnvelope,
    pub outcome: DecryptOutcome,
}

pub struct Session {
    reader: Reader,
    public_key_pem: String,
    cache: DecryptionCache,
    pool: ThreadPool,
}

impl Session {
    /// open starts a session from the key transfer handed out at signup/login
    pub fn open(user_id: UserId, keys: &KeyTransfer, config: &ProtocolConfig) -> Result<Self> {
        config.validate()?;
        let reader = checked_reader(user_id, keys)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.decrypt_workers)
            .thread_name(|i| format!("sigil-decrypt-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("decrypt pool: {e}")))?;
        tracing::info!(user = %reader.user_id(), workers = config.decrypt_workers, "session opened");
        Ok(Self { reader, public_key_pem: keys.public_key.clone(), cache: DecryptionCache::new(), pool })
    }

    pub fn user_id(&self) -> &UserId {
        self.reader.user_id()
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// send encrypts for both parties and submits; the receiver's key is checked before any encryption
    pub fn send<S: Store, T: Transport>(
        &self,
        relay: &Relay<S, T>,
        receiver: &UserId,
        payload: &DecryptedPayload,
    ) -> Result<MessageEnvelope> {
        let receiver_key = relay.public_key_of(receiver)?;
        let envelope = encrypt_for_send(
            payload,
            Correspondent::new(self.user_id(), Some(self.public_key_pem.as_str())),
            Correspondent::new(receiver, Some(receiver_key.as_str())),
        )?;
        let envelope = relay.submit(envelope)?;
        self.cache.remember(envelope.id.clone(), payload.clone());
        Ok(envelope)
    }

    /// receive handles a pushed envelope
    pub fn receive(&self, envelope: &MessageEnvelope) -> DecryptOutcome {
        self.cache.get_or_decrypt(envelope, &self.reader)
    }

    /// load_conversation fetches the backlog with `peer` and decrypts what isn't cached, oldest first
    pub fn load_conversation<S: Store, T: Transport>(
        &self,
        relay: &Relay<S, T>,
        peer: &UserId,
    ) -> Result<Vec<ConversationEntry>> {
        let envelopes = relay.conversation(self.user_id(), peer)?;
        let outcomes = self.cache.get_or_decrypt_all(&envelopes, &self.reader, &self.pool);
        Ok(envelopes
            .into_iter()
            .zip(outcomes)
            .map(|(envelope, outcome)| ConversationEntry { envelope, outcome })
            .collect())
    }

    pub fn cached(&self, id: &MessageId) -> Option<DecryptOutcome> {
        self.cache.get(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// rotate_keys swaps in a new pair. Cached outcomes were computed with the old key, so they go.
    pub fn rotate_keys(&mut self, keys: &KeyTransfer) -> Result<()> {
        self.reader = checked_reader(self.reader.user_id().clone(), keys)?;
        self.public_key_pem = keys.public_key.clone();
        self.cache.clear();
        tracing::info!(user = %self.reader.user_id(), "session keys rotated");
        Ok(())
    }

    /// logout ends the session and drops every decrypted body
    pub fn logout(self) {
        self.cache.clear();
        tracing::info!(user = %self.reader.user_id(), "session closed");
    }
}

fn checked_reader(user_id: UserId, keys: &KeyTransfer) -> Result<Reader> {
    let reader = Reader::from_pem(user_id, &keys.private_key)?;
    if reader.public_key() != PublicKey::from_pem(&keys.public_key)? {
        return Err(Error::InvalidKey("public and private key do not belong together".into()));
    }
    Ok(reader)
}

/* ------------------------------------------------------------------------- */

// TESTS
