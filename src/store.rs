//! Collaborator seams: persistence of users' keys and envelopes, and real-time push.
//!
//! The in-memory implementations back the tests and are good enough for a single-process relay.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use zeroize::Zeroizing;

use crate::envelope::{MessageEnvelope, UserId};
use crate::error::{Error, Result};
use crate::keys::KeyPairPem;

pub trait Store: Send + Sync {
    fn find_user_public_key(&self, user: &UserId) -> Result<Option<String>>;
    fn find_user_private_key(&self, user: &UserId) -> Result<Option<Zeroizing<String>>>;
    /// persist_user_keys replaces both halves together
    fn persist_user_keys(&self, user: &UserId, keys: &KeyPairPem) -> Result<()>;
    /// persist_envelope stores a new envelope. Envelopes are never updated in place.
    fn persist_envelope(&self, envelope: &MessageEnvelope) -> Result<()>;
    /// fetch_envelopes_for_conversation returns both directions, oldest first
    fn fetch_envelopes_for_conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<MessageEnvelope>>;
    fn count_envelopes_involving(&self, user: &UserId) -> Result<usize>;
}

pub trait Transport: Send + Sync {
    /// on_envelope_ready notifies the receiver's live connection, if any
    fn on_envelope_ready(&self, envelope: &MessageEnvelope) -> Result<()>;
}

#[derive(Default)]
struct StoredKeys {
    public_key_pem: Option<String>,
    private_key_pem: Option<Zeroizing<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, StoredKeys>>,
    envelopes: RwLock<Vec<MessageEnvelope>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// register_user_without_keys models an account row from before keys existed
    pub fn register_user_without_keys(&self, user: &UserId) {
        self.users.write().entry(user.clone()).or_default();
    }

    /// drop_private_key models a row that lost one half of its pair
    pub fn drop_private_key(&self, user: &UserId) {
        if let Some(keys) = self.users.write().get_mut(user) {
            keys.private_key_pem = None;
        }
    }
}

impl Store for MemoryStore {
    fn find_user_public_key(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.users.read().get(user).and_then(|keys| keys.public_key_pem.clone()))
    }

    fn find_user_private_key(&self, user: &UserId) -> Result<Option<Zeroizing<String>>> {
        Ok(self.users.read().get(user).and_then(|keys| keys.private_key_pem.clone()))
    }

    fn persist_user_keys(&self, user: &UserId, keys: &KeyPairPem) -> Result<()> {
        self.users.write().insert(
            user.clone(),
            StoredKeys {
                public_key_pem: Some(keys.public_key_pem.clone()),
                private_key_pem: Some(keys.private_key_pem.clone()),
            },
        );
        Ok(())
    }

    fn persist_envelope(&self, envelope: &MessageEnvelope) -> Result<()> {
        let mut envelopes = self.envelopes.write();
        if envelopes.iter().any(|stored| stored.id == envelope.id) {
            return Err(Error::Storage(format!("envelope {} already exists", envelope.id)));
        }
        envelopes.push(envelope.clone());
        Ok(())
    }

    fn fetch_envelopes_for_conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<MessageEnvelope>> {
        let mut conversation: Vec<MessageEnvelope> = self
            .envelopes
            .read()
            .iter()
            .filter(|e| (&e.sender_id == a && &e.receiver_id == b) || (&e.sender_id == b && &e.receiver_id == a))
            .cloned()
            .collect();
        conversation.sort_by_key(|e| e.created_at);
        Ok(conversation)
    }

    fn count_envelopes_involving(&self, user: &UserId) -> Result<usize> {
        Ok(self.envelopes.read().iter().filter(|e| e.involves(user)).count())
    }
}

/// MemoryTransport queues pushes per receiver until drained.
#[derive(Default)]
pub struct MemoryTransport {
    queues: Mutex<HashMap<UserId, Vec<MessageEnvelope>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain_for(&self, user: &UserId) -> Vec<MessageEnvelope> {
        self.queues.lock().remove(user).unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    fn on_envelope_ready(&self, envelope: &MessageEnvelope) -> Result<()> {
        self.queues
            .lock()
            .entry(envelope.receiver_id.clone())
            .or_default()
            .push(envelope.clone());
        Ok(())
    }
}

/* ------------------------------------------------------------------------- */

// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageId;
    use chrono::{Duration, Utc};

    fn envelope(id: &str, from: &str, to: &str, age_secs: i64) -> MessageEnvelope {
        MessageEnvelope {
            id: MessageId::new(id),
            sender_id: UserId::new(from),
            receiver_id: UserId::new(to),
            encrypted_content: String::new(),
            iv: String::new(),
            auth_tag: String::new(),
            sender_encrypted_key: String::new(),
            receiver_encrypted_key: String::new(),
            text: None,
            image: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn conversation_is_both_directions_oldest_first() {
        let store = MemoryStore::new();
        store.persist_envelope(&envelope("newest", "alice", "bob", 1)).unwrap();
        store.persist_envelope(&envelope("oldest", "bob", "alice", 30)).unwrap();
        store.persist_envelope(&envelope("middle", "alice", "bob", 10)).unwrap();
        store.persist_envelope(&envelope("elsewhere", "alice", "carol", 20)).unwrap();

        let ids: Vec<String> = store
            .fetch_envelopes_for_conversation(&UserId::new("bob"), &UserId::new("alice"))
            .unwrap()
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, ["oldest", "middle", "newest"]);
        assert_eq!(store.count_envelopes_involving(&UserId::new("alice")).unwrap(), 4);
        assert_eq!(store.count_envelopes_involving(&UserId::new("carol")).unwrap(), 1);
    }

    #[test]
    fn envelopes_are_never_overwritten() {
        let store = MemoryStore::new();
        store.persist_envelope(&envelope("m", "alice", "bob", 0)).unwrap();
        let err = store.persist_envelope(&envelope("m", "alice", "bob", 0)).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn transport_queues_per_receiver() {
        let transport = MemoryTransport::new();
        transport.on_envelope_ready(&envelope("1", "alice", "bob", 0)).unwrap();
        transport.on_envelope_ready(&envelope("2", "bob", "alice", 0)).unwrap();
        assert_eq!(transport.drain_for(&UserId::new("bob")).len(), 1);
        assert!(transport.drain_for(&UserId::new("bob")).is_empty());
        assert_eq!(transport.drain_for(&UserId::new("alice")).len(), 1);
    }
}
