//! # Sigil
//!
//! Hybrid end-to-end encryption for one-to-one chat. The server stores and relays envelopes it cannot read: every message body is sealed with its own AES-256-GCM key, and that key is RSA-OAEP wrapped twice, once for the sender and once for the receiver.
//!
//! ### Warnings and Disclaimers
//!
//! - Only message bodies are protected. Who talked to whom, and when, is visible to the server.
//! - There is no forward secrecy and no key rotation protocol. Lose a private key and every message wrapped to it is readable; replace a private key and every message wrapped to the old one is gone.
//! - Private keys are held by the server and handed to the client at login. A server compromise exposes all of them. See DESIGN.md.
//!
//! ### Examples / API
//!
//! Alice and Bob sign up. The relay issues each of them an RSA-2048 keypair and hands it over once.
//!
//! ```rust
//! let relay = Relay::new(MemoryStore::new(), MemoryTransport::new(), ProtocolConfig::default())?;
//! let alice_keys = relay.signup(&alice_id)?;
//! let alice = Session::open(alice_id, &alice_keys, relay.config())?;
//! ```
//!
//! Alice sends Bob a message. Bob's public key is looked up first; if he has none, nothing is encrypted and nothing is stored.
//!
//! ```rust
//! let envelope = alice.send(&relay, &bob_id, &DecryptedPayload::text("hello"))?;
//! ```
//!
//! Bob receives the push (or loads the conversation backlog) and reads it with his own private key. Anything that fails to open comes back as `DecryptOutcome::Undecryptable`, never as an error, so the rest of the conversation still renders.
//!
//! ```rust
//! let outcome = bob.receive(&envelope);
//! let history = bob.load_conversation(&relay, &alice_id)?;
//! ```
//!
//! ### Under the Hood
//!
//! `encrypt_for_send` draws a fresh AES key and nonce per message, seals the JSON-encoded payload, and wraps the key for both parties. `decrypt_received` picks the wrapped-key slot matching the reader's role, unwraps, checks the GCM tag, and decodes (falling back to raw text for bodies written by the earliest clients). The session keeps a cache of outcomes keyed by message id, including failures, so nothing is decrypted twice; it is emptied on key rotation and on logout.

pub mod cache;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod store;
pub mod symmetric;
pub mod wrap;

#[cfg(test)]
mod fixtures;

pub use cache::{CacheStats, DecryptionCache};
pub use codec::{DecryptedPayload, WirePayload};
pub use config::{KeyRegeneration, ProtocolConfig};
pub use envelope::{MessageEnvelope, MessageId, ReaderRole, UserId};
pub use error::{Error, Result};
pub use keys::{issue_key_pair, KeyPairPem, PrivateKey, PublicKey};
pub use protocol::{decrypt_received, encrypt_for_send, Correspondent, DecryptFailure, DecryptOutcome, Reader};
pub use relay::{KeyTransfer, Relay};
pub use session::{ConversationEntry, Session};
pub use store::{MemoryStore, MemoryTransport, Store, Transport};
