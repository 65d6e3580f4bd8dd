//! Shared test identities. RSA keygen is slow, so each one is generated once per test binary.

use std::sync::OnceLock;

use crate::keys::{issue_key_pair, KeyPairPem};

static ALICE: OnceLock<KeyPairPem> = OnceLock::new();
static BOB: OnceLock<KeyPairPem> = OnceLock::new();
static EVE: OnceLock<KeyPairPem> = OnceLock::new();

fn cached(cell: &'static OnceLock<KeyPairPem>) -> &'static KeyPairPem {
    cell.get_or_init(|| issue_key_pair().expect("test keypair generation failed"))
}

pub fn alice() -> &'static KeyPairPem {
    cached(&ALICE)
}

pub fn bob() -> &'static KeyPairPem {
    cached(&BOB)
}

/// eve is unrelated to every conversation
pub fn eve() -> &'static KeyPairPem {
    cached(&EVE)
}
