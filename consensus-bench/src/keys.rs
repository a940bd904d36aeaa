// consensus-bench/src/keys.rs

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::error::BenchError;

// Re-export key types for convenience
pub use ed25519_dalek::{SigningKey as SecretKey, VerifyingKey as PublicKey};

/// A node identity: a stable name plus its key material.
/// The name is the hex encoding of the public key, so it is stable across reloads.
#[derive(Clone)]
pub struct Identity {
    pub name: String,
    pub public_key: PublicKey,
    pub secret_key: SecretKey,
}

impl Identity {
    pub fn from_secret(secret_key: SecretKey) -> Self {
        let public_key = secret_key.verifying_key();
        Identity { name: hex::encode(public_key.as_bytes()), public_key, secret_key }
    }

    /// Loads an identity from a key file written by [`Identity::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BenchError> {
        let data = std::fs::read_to_string(path)?;
        let file: KeyFile = serde_json::from_str(&data)?;
        file.into_identity()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BenchError> {
        let file = KeyFile {
            name: self.name.clone(),
            secret: hex::encode(self.secret_key.to_bytes()),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

// The secret never shows up in logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("name", &self.name).finish_non_exhaustive()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.public_key == other.public_key
    }
}

impl Eq for Identity {}

/// On-disk layout of a node key file.
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    name: String,
    secret: String,
}

impl KeyFile {
    fn into_identity(self) -> Result<Identity, BenchError> {
        let bytes = hex::decode(&self.secret).map_err(|e| BenchError::KeyFile(format!("bad secret: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| BenchError::KeyFile("secret must be 32 bytes".into()))?;
        let identity = Identity::from_secret(SecretKey::from_bytes(&bytes));
        if identity.name != self.name {
            return Err(BenchError::KeyFile(format!("name {} does not match its secret", self.name)));
        }
        Ok(identity)
    }
}

/// Source of node identities, one per requested slot.
pub trait IdentityGenerator {
    fn generate(&mut self, slot: usize) -> Identity;
}

/// Fresh random keys from the OS RNG.
#[derive(Debug, Default)]
pub struct RandomKeys;

impl IdentityGenerator for RandomKeys {
    fn generate(&mut self, _slot: usize) -> Identity {
        Identity::from_secret(SigningKey::generate(&mut OsRng))
    }
}

/// Deterministic keys derived from a seed and the slot index.
/// Two generators with the same seed produce the same identity sequence.
#[derive(Debug, Clone, Copy)]
pub struct SeededKeys {
    pub seed: u64,
}

impl IdentityGenerator for SeededKeys {
    fn generate(&mut self, slot: usize) -> Identity {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_be_bytes());
        hasher.update((slot as u64).to_be_bytes());
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&hasher.finalize());
        Identity::from_secret(SecretKey::from_bytes(&secret))
    }
}

/// Requests `count` identities from `generator`, in slot order.
pub fn generate_identities<G: IdentityGenerator>(generator: &mut G, count: usize) -> Vec<Identity> {
    (0..count).map(|slot| generator.generate(slot)).collect()
}

/// Returns the public key for a verifying-key name produced by this module.
pub fn public_key_from_name(name: &str) -> Option<VerifyingKey> {
    let bytes: [u8; 32] = hex::decode(name).ok()?.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}
