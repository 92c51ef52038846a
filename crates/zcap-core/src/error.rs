//! Error types for the ZCAP-LD engine

use thiserror::Error;

/// Result type alias using ZcapError
pub type Result<T> = std::result::Result<T, ZcapError>;

/// Errors that can occur in the ZCAP-LD engine
#[derive(Error, Debug)]
pub enum ZcapError {
    /// Signature decoding failed, wrong length, or cryptographic verification failed
    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    /// A caveat is unsatisfied, unknown, or structurally malformed
    #[error("caveat evaluation failed: {0}")]
    CaveatEvaluation(String),

    /// Revoked, expired, attenuation violated, cycle, or chain depth exceeded
    #[error("capability verification failed: {0}")]
    CapabilityVerification(String),

    /// Invocation document is malformed or its proof is inconsistent with
    /// the referenced capability
    #[error("invocation verification failed: {0}")]
    InvocationVerification(String),

    /// Delegator is not the current invoker, requested actions are not a
    /// subset, or the expiry extends the parent's
    #[error("delegation failed: {0}")]
    Delegation(String),

    /// Action not in capability, invoker key mismatch, or nonce collision
    /// retries exhausted
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// A required DID is not present in the key store
    #[error("DID key not found: {0}")]
    DidKeyNotFound(String),

    /// A referenced parent capability is missing from the store
    #[error("capability not found: {0}")]
    CapabilityNotFound(String),

    /// The document could not be canonicalized (unsupported context,
    /// malformed structure)
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    /// A document failed structural validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Cryptographic error outside signature verification proper
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<ed25519_dalek::SignatureError> for ZcapError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        ZcapError::SignatureVerification(err.to_string())
    }
}

impl From<serde_json::Error> for ZcapError {
    fn from(err: serde_json::Error) -> Self {
        ZcapError::Serialization(err.to_string())
    }
}
