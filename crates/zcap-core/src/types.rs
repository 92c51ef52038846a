//! Common wire types shared by capabilities and invocations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key type tag attached to controller and invoker entries
pub const ED25519_KEY_TYPE: &str = "Ed25519VerificationKey2020";

/// Proof suite identifier for every proof this engine emits
pub const ED25519_SIGNATURE_2020: &str = "Ed25519Signature2020";

/// Proof purpose for capability (delegation) proofs
pub const PURPOSE_DELEGATION: &str = "capabilityDelegation";

/// Proof purpose for invocation proofs
pub const PURPOSE_INVOCATION: &str = "capabilityInvocation";

/// A DID-identified party: the controller or invoker of a capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// DID of the party (opaque key into the caller's key store)
    pub id: String,

    /// Key type tag (e.g. `Ed25519VerificationKey2020`)
    #[serde(rename = "type")]
    pub key_type: String,
}

impl Principal {
    /// Create an Ed25519 principal for the given DID
    pub fn ed25519(did: impl Into<String>) -> Self {
        Self {
            id: did.into(),
            key_type: ED25519_KEY_TYPE.to_string(),
        }
    }
}

/// The resource a capability grants authority over
///
/// `id` and `type` are the typed core; every other property of the target
/// object is preserved verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Resource IRI
    pub id: String,

    /// Resource type tag (e.g. `Document`)
    #[serde(rename = "type")]
    pub target_type: String,

    /// Additional target properties, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Target {
    /// Create a target with no additional properties
    pub fn new(id: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_type: target_type.into(),
            extra: Map::new(),
        }
    }

    /// Add an additional property (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A named action a capability authorizes, with optional parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action name (e.g. `read`, `write`)
    pub name: String,

    /// Action parameters; empty maps are omitted on the wire
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl Action {
    /// Create an action with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Map::new(),
        }
    }

    /// Add a parameter (builder pattern)
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// A detached Linked Data proof
///
/// `proof_value` is `z` + base58-btc of a 64-byte Ed25519 signature over the
/// canonical N-Quads of the document with `proof` removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    /// Proof identifier (`urn:uuid:` URN)
    pub id: String,

    /// Proof suite, always `Ed25519Signature2020`
    #[serde(rename = "type")]
    pub proof_type: String,

    /// Signing time (UTC)
    pub created: DateTime<Utc>,

    /// `<signer DID>#key-1`
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,

    /// `capabilityDelegation` or `capabilityInvocation`
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: String,

    /// Multibase-encoded signature
    #[serde(rename = "proofValue")]
    pub proof_value: String,
}

impl Proof {
    /// DID of the signer, extracted from the verification method
    pub fn signer_did(&self) -> &str {
        match self.verification_method.split_once('#') {
            Some((did, _)) => did,
            None => &self.verification_method,
        }
    }
}
