//! Ed25519 signing and verification over canonical bytes
//!
//! Proof values are multibase: `z` followed by the base58-btc encoding of
//! the 64-byte signature. Hex-encoded signatures are accepted on input only,
//! as a legacy fallback.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::{Result, ZcapError};

/// Length of an Ed25519 signature in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 key pair bound to a DID
#[derive(Clone)]
pub struct KeyPair {
    /// DID this key signs for
    did: String,
    /// Ed25519 signing key (private)
    signing_key: SigningKey,
    /// Ed25519 verifying key (public)
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("did", &self.did)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair for the given DID
    pub fn generate(did: impl Into<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(did, signing_key)
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(did: impl Into<String>, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            did: did.into(),
            signing_key,
            verifying_key,
        }
    }

    /// Create a key pair from raw signing-key bytes
    pub fn from_bytes(did: impl Into<String>, bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(did, SigningKey::from_bytes(bytes))
    }

    /// DID this key signs for
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Get the public half
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.verifying_key,
        }
    }

    /// Raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign canonical bytes, producing a multibase proof value
    pub fn sign(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        encode_proof_value(&signature.to_bytes())
    }
}

/// Ed25519 public key for proof verification
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("key", &hex::encode(self.verifying_key.to_bytes()))
            .finish()
    }
}

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)
            .map_err(|e| ZcapError::Crypto(e.to_string()))?;
        Ok(Self { verifying_key })
    }

    /// Raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify a proof value over canonical bytes
    pub fn verify(&self, message: &[u8], proof_value: &str) -> Result<()> {
        let bytes = decode_proof_value(proof_value)?;
        let signature = Signature::from_bytes(&bytes);
        self.verifying_key
            .verify(message, &signature)
            .map_err(ZcapError::from)
    }
}

/// Encode a signature as `z` + base58-btc
pub fn encode_proof_value(signature: &[u8; SIGNATURE_LENGTH]) -> String {
    format!("z{}", bs58::encode(signature).into_string())
}

/// Decode a proof value: multibase base58-btc, or legacy hex on input
pub fn decode_proof_value(proof_value: &str) -> Result<[u8; SIGNATURE_LENGTH]> {
    let bytes = if let Some(encoded) = proof_value.strip_prefix('z') {
        bs58::decode(encoded).into_vec().map_err(|e| {
            ZcapError::SignatureVerification(format!("invalid base58-btc proof value: {e}"))
        })?
    } else if proof_value.len() == SIGNATURE_LENGTH * 2
        && proof_value.chars().all(|c| c.is_ascii_hexdigit())
    {
        // legacy hex input
        hex::decode(proof_value)
            .map_err(|e| ZcapError::SignatureVerification(format!("invalid hex signature: {e}")))?
    } else {
        return Err(ZcapError::SignatureVerification(
            "unsupported proof value encoding (expected 'z' multibase or legacy hex)".into(),
        ));
    };

    bytes.as_slice().try_into().map_err(|_| {
        ZcapError::SignatureVerification(format!(
            "signature must be {SIGNATURE_LENGTH} bytes, got {}",
            bytes.len()
        ))
    })
}
