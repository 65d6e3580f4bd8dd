//! Hybrid encryption of one message for two readers.
//!
//! Sending: fresh AES key → encrypt the encoded payload → wrap the key once for the sender and
//! once for the receiver. Either party can later open the envelope with only their own private
//! key. Nothing is produced unless every step succeeds.
//!
//! Reading: pick the wrapped-key slot for the reader's role → unwrap → decrypt → decode. Every
//! failure is folded into `DecryptOutcome::Undecryptable` so one bad message never takes a
//! conversation down with it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;

use crate::codec::{self, DecryptedPayload};
use crate::envelope::{MessageEnvelope, MessageId, ReaderRole, UserId};
use crate::error::{Error, Result};
use crate::keys::{PrivateKey, PublicKey};
use crate::symmetric::{self, AesKey};
use crate::wrap;

/// Correspondent is one side of a send: who they are and the public key on file for them.
#[derive(Debug, Clone, Copy)]
pub struct Correspondent<'a> {
    pub id: &'a UserId,
    pub public_key_pem: Option<&'a str>,
}

impl<'a> Correspondent<'a> {
    pub fn new(id: &'a UserId, public_key_pem: Option<&'a str>) -> Self {
        Self { id, public_key_pem }
    }

    fn public_key(&self) -> Result<PublicKey> {
        match self.public_key_pem {
            Some(pem) if !pem.trim().is_empty() => PublicKey::from_pem(pem),
            _ => Err(Error::KeyMissing(self.id.clone())),
        }
    }
}

/// Why a message could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptFailure {
    /// The reader is neither sender nor receiver.
    NotAParty,
    Unwrap,
    Authentication,
    /// Fields that don't decode (bad base64, wrong nonce/tag size).
    Malformed,
    Codec,
}

impl From<&Error> for DecryptFailure {
    fn from(err: &Error) -> Self {
        match err {
            Error::Unwrap | Error::InvalidKey(_) => DecryptFailure::Unwrap,
            Error::Authentication => DecryptFailure::Authentication,
            Error::Codec(_) => DecryptFailure::Codec,
            _ => DecryptFailure::Malformed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    Plaintext(DecryptedPayload),
    Undecryptable(DecryptFailure),
}

impl DecryptOutcome {
    pub fn payload(&self) -> Option<&DecryptedPayload> {
        match self {
            DecryptOutcome::Plaintext(payload) => Some(payload),
            DecryptOutcome::Undecryptable(_) => None,
        }
    }

    pub fn is_undecryptable(&self) -> bool {
        matches!(self, DecryptOutcome::Undecryptable(_))
    }
}

/// encrypt_for_send builds a complete envelope or fails before anything is produced
pub fn encrypt_for_send(
    payload: &DecryptedPayload,
    sender: Correspondent<'_>,
    receiver: Correspondent<'_>,
) -> Result<MessageEnvelope> {
    // Resolve both keys first: a missing recipient key must stop us before any encryption
    let sender_key = sender.public_key()?;
    let receiver_key = receiver.public_key()?;

    let key = AesKey::generate()?;
    let body = codec::serialize(payload)?;
    let sealed = symmetric::seal(&key, &body)?;
    let sender_encrypted_key = wrap::wrap_key(&sender_key, &key)?;
    let receiver_encrypted_key = wrap::wrap_key(&receiver_key, &key)?;

    let envelope = MessageEnvelope {
        id: MessageId::random(),
        sender_id: sender.id.clone(),
        receiver_id: receiver.id.clone(),
        encrypted_content: STANDARD.encode(&sealed.ciphertext),
        iv: STANDARD.encode(sealed.nonce.as_bytes()),
        auth_tag: STANDARD.encode(sealed.tag.as_bytes()),
        sender_encrypted_key,
        receiver_encrypted_key,
        text: None,
        image: None,
        created_at: Utc::now(),
    };
    tracing::debug!(message = %envelope.id, sender = %envelope.sender_id, receiver = %envelope.receiver_id, "sealed envelope");
    Ok(envelope)
}

/// open_envelope is the fallible core of decryption
pub fn open_envelope(envelope: &MessageEnvelope, role: ReaderRole, reader_key: &PrivateKey) -> Result<DecryptedPayload> {
    // Parse the cheap fields before paying for an RSA operation
    let nonce = envelope.nonce()?;
    let tag = envelope.tag()?;
    let ciphertext = envelope.ciphertext()?;
    let key = wrap::unwrap_key(reader_key, envelope.wrapped_key_for(role))?;
    let body = symmetric::decrypt(&key, &nonce, &ciphertext, &tag)?;
    codec::deserialize(&body)
}

/// decrypt_received never fails past the caller: errors become an undecryptable marker
pub fn decrypt_received(envelope: &MessageEnvelope, role: ReaderRole, reader_key: &PrivateKey) -> DecryptOutcome {
    match open_envelope(envelope, role, reader_key) {
        Ok(payload) => {
            tracing::debug!(message = %envelope.id, ?role, "opened envelope");
            DecryptOutcome::Plaintext(payload)
        }
        Err(err) => {
            let failure = DecryptFailure::from(&err);
            tracing::warn!(message = %envelope.id, ?role, ?failure, "message is undecryptable");
            DecryptOutcome::Undecryptable(failure)
        }
    }
}

/// decrypt_received_pem is decrypt_received for a PKCS8 PEM held by the caller
pub fn decrypt_received_pem(envelope: &MessageEnvelope, role: ReaderRole, private_key_pem: &str) -> DecryptOutcome {
    match PrivateKey::from_pem(private_key_pem) {
        Ok(key) => decrypt_received(envelope, role, &key),
        Err(_) => {
            tracing::warn!(message = %envelope.id, "reader key is not usable");
            DecryptOutcome::Undecryptable(DecryptFailure::Unwrap)
        }
    }
}

/// Reader is a user plus the private key they read with.
#[derive(Debug, Clone)]
pub struct Reader {
    user_id: UserId,
    key: PrivateKey,
}

impl Reader {
    pub fn new(user_id: UserId, key: PrivateKey) -> Self {
        Self { user_id, key }
    }

    pub fn from_pem(user_id: UserId, private_key_pem: &str) -> Result<Self> {
        Ok(Self::new(user_id, PrivateKey::from_pem(private_key_pem)?))
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// decrypt picks the role from the envelope's parties
    pub fn decrypt(&self, envelope: &MessageEnvelope) -> DecryptOutcome {
        match envelope.role_of(&self.user_id) {
            Some(role) => decrypt_received(envelope, role, &self.key),
            None => {
                tracing::warn!(message = %envelope.id, reader = %self.user_id, "reader is not a party to this message");
                DecryptOutcome::Undecryptable(DecryptFailure::NotAParty)
            }
        }
    }
}

/* ------------------------------------------------------------------------- */

// TESTS

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::keys::KeyPairPem;
    use proptest::prelude::*;

    fn alice_id() -> UserId {
        UserId::new("alice")
    }

    fn bob_id() -> UserId {
        UserId::new("bob")
    }

    fn private(pair: &KeyPairPem) -> PrivateKey {
        PrivateKey::from_pem(&pair.private_key_pem).unwrap()
    }

    fn send(payload: &DecryptedPayload) -> MessageEnvelope {
        let (alice, bob) = (alice_id(), bob_id());
        encrypt_for_send(
            payload,
            Correspondent::new(&alice, Some(fixtures::alice().public_key_pem.as_str())),
            Correspondent::new(&bob, Some(fixtures::bob().public_key_pem.as_str())),
        )
        .unwrap()
    }

    fn flip_bit(b64: &str, index: usize) -> String {
        let mut bytes = STANDARD.decode(b64).unwrap();
        bytes[index] ^= 0x01;
        STANDARD.encode(bytes)
    }

    #[test]
    fn alice_sends_hello_to_bob() {
        let envelope = send(&DecryptedPayload::text("hello"));
        let bob = decrypt_received(&envelope, ReaderRole::Receiver, &private(fixtures::bob()));
        let alice = decrypt_received(&envelope, ReaderRole::Sender, &private(fixtures::alice()));
        assert_eq!(bob, DecryptOutcome::Plaintext(DecryptedPayload::text("hello")));
        assert_eq!(alice, bob);
        // A third party can't open Bob's slot
        let eve = wrap::unwrap_key(&private(fixtures::eve()), &envelope.receiver_encrypted_key);
        assert!(matches!(eve, Err(Error::Unwrap)));
    }

    #[test]
    fn attachment_reference_survives() {
        let payload = DecryptedPayload::with_image("see attached", "https://cdn.example/x.jpg");
        let envelope = send(&payload);
        let reader = Reader::from_pem(bob_id(), &fixtures::bob().private_key_pem).unwrap();
        assert_eq!(reader.decrypt(&envelope), DecryptOutcome::Plaintext(payload));
    }

    #[test]
    fn envelope_never_carries_plaintext() {
        let envelope = send(&DecryptedPayload::text("secret words"));
        assert!(envelope.text.is_none() && envelope.image.is_none());
        assert!(!envelope.to_json().unwrap().contains("secret words"));
        envelope.validate().unwrap();
    }

    #[test]
    fn identical_sends_are_independent() {
        let payload = DecryptedPayload::text("same");
        let a = send(&payload);
        let b = send(&payload);
        assert_ne!(a.id, b.id);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encrypted_content, b.encrypted_content);
        assert_ne!(a.sender_encrypted_key, b.sender_encrypted_key);
        assert_ne!(a.receiver_encrypted_key, b.receiver_encrypted_key);
        // Different content keys underneath, not just different OAEP randomness
        let bob = private(fixtures::bob());
        let key_a = wrap::unwrap_key(&bob, &a.receiver_encrypted_key).unwrap();
        let key_b = wrap::unwrap_key(&bob, &b.receiver_encrypted_key).unwrap();
        assert_ne!(key_a.as_bytes(), key_b.as_bytes());
    }

    #[test]
    fn tampering_is_always_undecryptable() {
        let envelope = send(&DecryptedPayload::text("integrity matters"));
        let bob = private(fixtures::bob());
        let ciphertext_len = STANDARD.decode(&envelope.encrypted_content).unwrap().len();
        for index in [0, ciphertext_len / 2, ciphertext_len - 1] {
            let mut tampered = envelope.clone();
            tampered.encrypted_content = flip_bit(&envelope.encrypted_content, index);
            let outcome = decrypt_received(&tampered, ReaderRole::Receiver, &bob);
            assert_eq!(outcome, DecryptOutcome::Undecryptable(DecryptFailure::Authentication));
        }
        for index in 0..12 {
            let mut tampered = envelope.clone();
            tampered.iv = flip_bit(&envelope.iv, index);
            let outcome = decrypt_received(&tampered, ReaderRole::Receiver, &bob);
            assert_eq!(outcome, DecryptOutcome::Undecryptable(DecryptFailure::Authentication));
        }
        for index in 0..16 {
            let mut tampered = envelope.clone();
            tampered.auth_tag = flip_bit(&envelope.auth_tag, index);
            let outcome = decrypt_received(&tampered, ReaderRole::Receiver, &bob);
            assert_eq!(outcome, DecryptOutcome::Undecryptable(DecryptFailure::Authentication));
        }
    }

    #[test]
    fn tampered_wrapped_key_is_unwrap_failure() {
        let mut envelope = send(&DecryptedPayload::text("x"));
        envelope.receiver_encrypted_key = flip_bit(&envelope.receiver_encrypted_key, 5);
        let outcome = decrypt_received(&envelope, ReaderRole::Receiver, &private(fixtures::bob()));
        assert_eq!(outcome, DecryptOutcome::Undecryptable(DecryptFailure::Unwrap));
    }

    #[test]
    fn role_confusion_fails() {
        let envelope = send(&DecryptedPayload::text("for the right slot only"));
        // Bob's key against Alice's slot
        let outcome = decrypt_received(&envelope, ReaderRole::Sender, &private(fixtures::bob()));
        assert!(outcome.is_undecryptable());
        let err = open_envelope(&envelope, ReaderRole::Sender, &private(fixtures::bob())).unwrap_err();
        assert!(matches!(err, Error::Unwrap | Error::Authentication));
    }

    #[test]
    fn outsiders_are_not_a_party() {
        let envelope = send(&DecryptedPayload::text("private"));
        let eve = Reader::from_pem(UserId::new("eve"), &fixtures::eve().private_key_pem).unwrap();
        assert_eq!(eve.decrypt(&envelope), DecryptOutcome::Undecryptable(DecryptFailure::NotAParty));
    }

    #[test]
    fn malformed_fields_are_undecryptable_not_panics() {
        let mut envelope = send(&DecryptedPayload::text("x"));
        envelope.iv = "%%%".into();
        let outcome = decrypt_received(&envelope, ReaderRole::Receiver, &private(fixtures::bob()));
        assert_eq!(outcome, DecryptOutcome::Undecryptable(DecryptFailure::Malformed));
        assert_eq!(
            decrypt_received_pem(&envelope, ReaderRole::Receiver, "garbage"),
            DecryptOutcome::Undecryptable(DecryptFailure::Unwrap)
        );
    }

    #[test]
    fn missing_receiver_key_rejects_send() {
        let (alice, bob) = (alice_id(), bob_id());
        let err = encrypt_for_send(
            &DecryptedPayload::text("hi"),
            Correspondent::new(&alice, Some(fixtures::alice().public_key_pem.as_str())),
            Correspondent::new(&bob, None),
        )
        .unwrap_err();
        assert!(matches!(err, Error::KeyMissing(id) if id == bob));
        let err = encrypt_for_send(
            &DecryptedPayload::text("hi"),
            Correspondent::new(&alice, Some(fixtures::alice().public_key_pem.as_str())),
            Correspondent::new(&bob, Some("  ")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::KeyMissing(_)));
    }

    #[test]
    fn legacy_raw_text_body_decrypts_as_text() {
        // Hand-build an envelope the way the earliest clients did: bare text, base64-text key
        let key = AesKey::generate().unwrap();
        let sealed = symmetric::seal(&key, b"plain old text").unwrap();
        let key_text = STANDARD.encode(key.as_bytes());
        let bob_public = PublicKey::from_pem(&fixtures::bob().public_key_pem).unwrap();
        let wrapped = bob_public
            .rsa()
            .encrypt(&mut rand_core::OsRng, rsa::Oaep::new::<sha2::Sha256>(), key_text.as_bytes())
            .unwrap();
        let mut envelope = send(&DecryptedPayload::text("placeholder"));
        envelope.encrypted_content = STANDARD.encode(&sealed.ciphertext);
        envelope.iv = STANDARD.encode(sealed.nonce.as_bytes());
        envelope.auth_tag = STANDARD.encode(sealed.tag.as_bytes());
        envelope.receiver_encrypted_key = STANDARD.encode(wrapped);

        let outcome = decrypt_received(&envelope, ReaderRole::Receiver, &private(fixtures::bob()));
        assert_eq!(
            outcome,
            DecryptOutcome::Plaintext(DecryptedPayload { text: "plain old text".into(), image: None })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn both_parties_recover_any_payload(text in ".{0,200}", image in proptest::option::of("https://[a-z]{1,12}\\.example/[a-z0-9]{1,16}")) {
            let payload = DecryptedPayload { text, image };
            let envelope = send(&payload);
            let expected = DecryptOutcome::Plaintext(payload);
            prop_assert_eq!(decrypt_received(&envelope, ReaderRole::Sender, &private(fixtures::alice())), expected.clone());
            prop_assert_eq!(decrypt_received(&envelope, ReaderRole::Receiver, &private(fixtures::bob())), expected);
        }
    }
}
