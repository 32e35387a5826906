//! Keypair management and content hashing
//!
//! A node identifies itself with an Ed25519 keypair; its feed identity is the
//! primary-format ref of the verifying key. Blobs are addressed by SHA-256.

use crate::error::{Error, Result};
use crate::types::{Bytes32, FeedRef};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Ed25519 keypair for signing and identity
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from seed bytes (for persisted identities and deterministic testing)
    pub fn from_seed(seed: &Bytes32) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Seed bytes to persist this identity
    pub fn seed(&self) -> Bytes32 {
        self.signing_key.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> Bytes32 {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Feed identity of this keypair
    pub fn feed_ref(&self) -> FeedRef {
        FeedRef::ed25519(self.public_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature made by `feed`
    pub fn verify(feed: &FeedRef, message: &[u8], signature: &[u8; 64]) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(&feed.key)
            .map_err(|_| Error::SignatureVerificationFailed)?;
        let sig = Signature::from_bytes(signature);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| Error::SignatureVerificationFailed)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("feed", &self.feed_ref())
            .finish_non_exhaustive()
    }
}

/// SHA-256 of blob content
pub fn content_hash(data: &[u8]) -> Bytes32 {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_restores_identity() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_seed(&keypair.seed());
        assert_eq!(keypair.feed_ref(), restored.feed_ref());
    }

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::from_seed(&[42; 32]);
        let sig = keypair.sign(b"hello");

        assert!(KeyPair::verify(&keypair.feed_ref(), b"hello", &sig).is_ok());
        assert!(matches!(
            KeyPair::verify(&keypair.feed_ref(), b"tampered", &sig),
            Err(Error::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn test_content_hash_known_vector() {
        // sha256("abc")
        let hash = content_hash(b"abc");
        assert_eq!(hash[..4], [0xba, 0x78, 0x16, 0xbf]);
    }
}
