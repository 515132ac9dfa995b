//! Cipher-suite registry (external collaborator, spec.md §6).
//!
//! ONet's core never hardcodes a signature scheme: it only needs
//! `KeyPair`/`Pack`/`Unpack`/`WriteTo` from whatever suite a server is
//! configured with. Grounded on `kinode::keygen`'s use of
//! `ring::signature::Ed25519KeyPair` for the node's networking identity.

use ring::signature::{Ed25519KeyPair, KeyPair as RingKeyPair};
use sha2::{Digest, Sha256};

use crate::ids::PublicKey;

#[derive(Clone)]
pub struct SecretKey(pub std::sync::Arc<Vec<u8>>);

pub trait CipherSuite: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn key_pair(&self) -> (PublicKey, SecretKey);
    fn pack_public_key(&self, pk: &PublicKey) -> Vec<u8> {
        pk.0.clone()
    }
    fn unpack_public_key(&self, bytes: &[u8]) -> PublicKey {
        PublicKey(bytes.to_vec())
    }
    /// Serializes a secret key for storage, e.g. to the node's on-disk
    /// keyfile (spec.md §6 cipher-suite collaborator).
    fn pack_secret_key(&self, sk: &SecretKey) -> Vec<u8> {
        sk.0.as_ref().clone()
    }
    fn unpack_secret_key(&self, bytes: &[u8]) -> SecretKey {
        SecretKey(std::sync::Arc::new(bytes.to_vec()))
    }
    fn sign(&self, sk: &SecretKey, msg: &[u8]) -> Vec<u8>;
    fn verify(&self, pk: &PublicKey, msg: &[u8], sig: &[u8]) -> bool;
    /// Mix a value into a running hasher for a deterministic digest, used
    /// by `RosterID`/`TreeID` derivation (spec.md §3).
    fn write_public_key(&self, pk: &PublicKey, hasher: &mut Sha256) {
        hasher.update(&self.pack_public_key(pk));
    }
}

/// The default suite: Ed25519 via `ring`, matching the teacher's
/// `ring::signature::Ed25519KeyPair`-based networking identity.
pub struct Ed25519Suite {
    rng: ring::rand::SystemRandom,
}

impl Default for Ed25519Suite {
    fn default() -> Self {
        Self {
            rng: ring::rand::SystemRandom::new(),
        }
    }
}

impl CipherSuite for Ed25519Suite {
    fn name(&self) -> &'static str {
        "ed25519"
    }

    fn key_pair(&self) -> (PublicKey, SecretKey) {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&self.rng).expect("rng failure generating key");
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("malformed pkcs8 from rng");
        let pk = PublicKey(keypair.public_key().as_ref().to_vec());
        (pk, SecretKey(std::sync::Arc::new(pkcs8.as_ref().to_vec())))
    }

    fn sign(&self, sk: &SecretKey, msg: &[u8]) -> Vec<u8> {
        let keypair = Ed25519KeyPair::from_pkcs8(&sk.0).expect("invalid stored pkcs8 secret key");
        keypair.sign(msg).as_ref().to_vec()
    }

    fn verify(&self, pk: &PublicKey, msg: &[u8], sig: &[u8]) -> bool {
        let unparsed = ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, &pk.0);
        unparsed.verify(msg, sig).is_ok()
    }
}

lazy_static::lazy_static! {
    /// Process-wide registry of known suite names, resolved by config.
    static ref SUITES: dashmap::DashMap<&'static str, std::sync::Arc<dyn CipherSuite>> = {
        let map = dashmap::DashMap::new();
        map.insert("ed25519", std::sync::Arc::new(Ed25519Suite::default()) as std::sync::Arc<dyn CipherSuite>);
        map
    };
}

pub fn resolve(name: &str) -> Option<std::sync::Arc<dyn CipherSuite>> {
    SUITES.get(name).map(|e| e.value().clone())
}
