//! Invocation: exercising a capability
//!
//! Producing an invocation verifies the capability chain, evaluates its
//! caveats in full context, and emits a signed JSON-LD invocation document
//! carrying a fresh 128-bit nonce. The nonce is recorded in the caller's
//! nonce containers, which are swept opportunistically.
//!
//! Consuming (`verify_invocation`) is read-only: replay protection on the
//! consumer side is the caller's responsibility against its own seen-nonce
//! store, since producer and consumer typically run in different address
//! spaces.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::canonical::{self, REQUIRED_CONTEXTS};
use crate::capability::{new_urn, sign_document, Capability};
use crate::caveat::{evaluate_caveats, Caveat, CaveatContext};
use crate::crypto::KeyPair;
use crate::error::{Result, ZcapError};
use crate::store::{CapabilityStore, DidKeyStore, NonceSet, NonceTimestamps, RevocationSet};
use crate::types::{Action, Proof, PURPOSE_INVOCATION};

/// The `type` tag every invocation document carries
pub const INVOCATION_TYPE: &str = "CapabilityInvocation";

/// Default retention window for used nonces
pub const DEFAULT_NONCE_MAX_AGE: i64 = 3600;

const NONCE_BYTES: usize = 16;
const NONCE_RETRY_LIMIT: usize = 8;

/// A signed capability invocation document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// JSON-LD contexts, always the embedded pair
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Globally unique `urn:uuid:` identifier
    pub id: String,

    /// Always `"CapabilityInvocation"`
    #[serde(rename = "type")]
    pub invocation_type: String,

    /// Id of the invoked capability
    pub capability: String,

    /// The action being exercised, with its parameters
    pub action: Action,

    /// Issuance time
    pub created: DateTime<Utc>,

    /// 128-bit random replay nonce, hex encoded
    pub nonce: String,

    /// Attached after signing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl Invocation {
    /// Project to a JSON-LD mapping suitable for canonicalization
    pub fn to_jsonld(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(ZcapError::from)
    }

    /// Parse a JSON-LD mapping and validate structural invariants
    pub fn from_jsonld(value: Value) -> Result<Self> {
        let invocation: Invocation = serde_json::from_value(value)
            .map_err(|e| ZcapError::Validation(e.to_string()))?;
        invocation.validate()?;
        Ok(invocation)
    }

    /// The canonical bytes this invocation's proof signs
    pub fn signing_input(&self) -> Result<Vec<u8>> {
        canonical::canonicalize(&self.to_jsonld()?)
    }

    /// Check shape invariants
    pub fn validate(&self) -> Result<()> {
        for required in REQUIRED_CONTEXTS {
            if !self.context.iter().any(|c| c == required) {
                return Err(ZcapError::Validation(format!(
                    "invocation is missing required context '{required}'"
                )));
            }
        }
        if self.invocation_type != INVOCATION_TYPE {
            return Err(ZcapError::Validation(format!(
                "invocation type must be '{INVOCATION_TYPE}', got '{}'",
                self.invocation_type
            )));
        }
        if !self.id.starts_with("urn:") {
            return Err(ZcapError::Validation(format!(
                "invocation id must be a URN, got '{}'",
                self.id
            )));
        }
        if self.capability.is_empty() {
            return Err(ZcapError::Validation(
                "invocation must reference a capability".into(),
            ));
        }
        // 128 bits, hex encoded
        if self.nonce.len() < NONCE_BYTES * 2 {
            return Err(ZcapError::Validation("invocation nonce is too short".into()));
        }
        Ok(())
    }
}

/// A produced invocation plus the opaque caveats the caller must enforce
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// The signed invocation document
    pub document: Invocation,

    /// Opaque caveats (`MaxUses`, `AllowedNetwork`) the engine cannot
    /// decide; the caller enforces these before acting
    pub advisories: Vec<Caveat>,
}

/// Invoke a capability, producing a signed invocation document
///
/// Verifies the chain, checks the action and caveats, confirms the invoker
/// key against the key store, then signs a fresh invocation carrying a new
/// nonce. Mutates `used_nonces`/`nonce_timestamps` in place: the nonce is
/// recorded and entries older than `nonce_max_age` (default one hour) are
/// swept. Callers sharing the nonce containers must hold exclusion across
/// the whole call.
#[allow(clippy::too_many_arguments)]
pub fn invoke_capability(
    capability: &Capability,
    action_name: &str,
    invoker_key: &KeyPair,
    did_keys: &DidKeyStore,
    revoked: &RevocationSet,
    store: &CapabilityStore,
    used_nonces: &mut NonceSet,
    nonce_timestamps: &mut NonceTimestamps,
    parameters: Option<Map<String, Value>>,
    nonce_max_age: Option<Duration>,
) -> Result<InvocationOutcome> {
    crate::verify::verify_capability(capability, did_keys, revoked, store)?;

    if !capability.has_action(action_name) {
        return Err(ZcapError::Invocation(format!(
            "action '{action_name}' not allowed by capability '{}'",
            capability.id
        )));
    }

    let now = Utc::now();
    let parameters = parameters.unwrap_or_default();
    let ctx = CaveatContext::at(now)
        .with_action(action_name)
        .with_parameters(&parameters)
        .with_revocations(revoked);
    let advisories = evaluate_caveats(&capability.caveats, &ctx)?;

    let registered = did_keys
        .get(&capability.invoker.id)
        .ok_or_else(|| ZcapError::DidKeyNotFound(capability.invoker.id.clone()))?;
    if invoker_key.public_key() != *registered {
        warn!(capability = %capability.id, invoker = %capability.invoker.id, "invoker key mismatch");
        return Err(ZcapError::Invocation(format!(
            "invoker key does not match the registered key for '{}'",
            capability.invoker.id
        )));
    }

    let nonce = fresh_nonce(used_nonces)?;

    let mut document = Invocation {
        context: REQUIRED_CONTEXTS.iter().map(|c| c.to_string()).collect(),
        id: new_urn(),
        invocation_type: INVOCATION_TYPE.to_string(),
        capability: capability.id.clone(),
        action: Action {
            name: action_name.to_string(),
            parameters,
        },
        created: now,
        nonce: nonce.clone(),
        proof: None,
    };
    let proof = sign_document(
        &document.to_jsonld()?,
        &capability.invoker.id,
        PURPOSE_INVOCATION,
        invoker_key,
        now,
    )?;
    document.proof = Some(proof);

    used_nonces.insert(nonce.clone());
    nonce_timestamps.insert(nonce, now);
    cleanup_expired_nonces(used_nonces, nonce_timestamps, nonce_max_age);

    Ok(InvocationOutcome {
        document,
        advisories,
    })
}

/// Verify a received invocation document against its capability chain
///
/// Read-only: resolves the capability, verifies the chain, checks the
/// invocation proof against the capability's invoker, and re-evaluates the
/// caveats with the document's action and parameters. Returns the opaque
/// caveats the caller must enforce. Replay checking against the consumer's
/// own seen-nonce store is the caller's responsibility.
pub fn verify_invocation(
    document: &Invocation,
    did_keys: &DidKeyStore,
    revoked: &RevocationSet,
    store: &CapabilityStore,
) -> Result<Vec<Caveat>> {
    document
        .validate()
        .map_err(|e| ZcapError::InvocationVerification(e.to_string()))?;

    let capability = store
        .get(&document.capability)
        .ok_or_else(|| ZcapError::CapabilityNotFound(document.capability.clone()))?;

    crate::verify::verify_capability(capability, did_keys, revoked, store)?;

    let proof = document.proof.as_ref().ok_or_else(|| {
        ZcapError::InvocationVerification("invocation document is unsigned".into())
    })?;
    if proof.proof_purpose != PURPOSE_INVOCATION {
        return Err(ZcapError::InvocationVerification(format!(
            "invocation proof purpose must be '{PURPOSE_INVOCATION}', got '{}'",
            proof.proof_purpose
        )));
    }
    if proof.signer_did() != capability.invoker.id {
        warn!(
            invocation = %document.id,
            expected = %capability.invoker.id,
            actual = %proof.signer_did(),
            "invocation proof not from the capability invoker"
        );
        return Err(ZcapError::InvocationVerification(format!(
            "invocation proof is from '{}', not the capability invoker '{}'",
            proof.signer_did(),
            capability.invoker.id
        )));
    }

    let invoker_key = did_keys
        .get(&capability.invoker.id)
        .ok_or_else(|| ZcapError::DidKeyNotFound(capability.invoker.id.clone()))?;
    let bytes = document.signing_input()?;
    invoker_key.verify(&bytes, &proof.proof_value)?;

    let ctx = CaveatContext::at(Utc::now())
        .with_action(&document.action.name)
        .with_parameters(&document.action.parameters)
        .with_revocations(revoked);
    evaluate_caveats(&capability.caveats, &ctx)
}

/// Remove every nonce older than `max_age` (default one hour) from both
/// containers
pub fn cleanup_expired_nonces(
    used_nonces: &mut NonceSet,
    nonce_timestamps: &mut NonceTimestamps,
    max_age: Option<Duration>,
) {
    let cutoff = Utc::now() - max_age.unwrap_or_else(|| Duration::seconds(DEFAULT_NONCE_MAX_AGE));
    let expired: Vec<String> = nonce_timestamps
        .iter()
        .filter(|(_, issued)| **issued < cutoff)
        .map(|(nonce, _)| nonce.clone())
        .collect();
    for nonce in expired {
        nonce_timestamps.remove(&nonce);
        used_nonces.remove(&nonce);
    }
}

/// Generate a 128-bit nonce not present in `used_nonces`
///
/// Collisions are astronomically unlikely but still handled; a bounded
/// retry keeps the call total.
fn fresh_nonce(used_nonces: &NonceSet) -> Result<String> {
    for _ in 0..NONCE_RETRY_LIMIT {
        let mut bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);
        if !used_nonces.contains(&nonce) {
            return Ok(nonce);
        }
    }
    Err(ZcapError::Invocation(
        "nonce collision retries exhausted".into(),
    ))
}
