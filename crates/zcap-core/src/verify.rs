//! Delegation-chain verification
//!
//! Walks `parentCapability` links from a leaf to its root, verifying each
//! link's proof against the resolved signer and enforcing monotonic
//! attenuation: a delegation never grants an action its parent does not,
//! never outlives its parent, and never drops a parent caveat.

use chrono::Utc;
use std::collections::HashSet;
use tracing::warn;

use crate::capability::Capability;
use crate::caveat::{evaluate_caveats, CaveatContext};
use crate::error::{Result, ZcapError};
use crate::store::{CapabilityStore, DidKeyStore, RevocationSet};
use crate::types::PURPOSE_DELEGATION;

/// Maximum number of links a delegation chain may carry
pub const MAX_CHAIN_DEPTH: usize = 100;

/// Verify a capability and its entire delegation chain
///
/// Read-only over the caller's stores. Errors per the taxonomy: revocation,
/// expiry, caveat failures, missing keys or parents, signature failures,
/// attenuation violations, cycles and over-long chains.
pub fn verify_capability(
    capability: &Capability,
    did_keys: &DidKeyStore,
    revoked: &RevocationSet,
    store: &CapabilityStore,
) -> Result<()> {
    let mut visited = HashSet::new();
    verify_link(capability, did_keys, revoked, store, &mut visited)
}

fn verify_link(
    capability: &Capability,
    did_keys: &DidKeyStore,
    revoked: &RevocationSet,
    store: &CapabilityStore,
    visited: &mut HashSet<String>,
) -> Result<()> {
    if visited.len() >= MAX_CHAIN_DEPTH {
        warn!(id = %capability.id, depth = visited.len(), "delegation chain too long");
        return Err(ZcapError::CapabilityVerification("chain too long".into()));
    }
    if !visited.insert(capability.id.clone()) {
        warn!(id = %capability.id, "delegation chain cycle");
        return Err(ZcapError::CapabilityVerification(format!(
            "delegation chain cycle at '{}'",
            capability.id
        )));
    }

    capability.validate()?;

    if revoked.contains(&capability.id) {
        warn!(id = %capability.id, "rejecting revoked capability");
        return Err(ZcapError::CapabilityVerification(format!(
            "capability '{}' is revoked",
            capability.id
        )));
    }

    let now = Utc::now();
    if let Some(expires) = capability.expires {
        if now > expires {
            return Err(ZcapError::CapabilityVerification(format!(
                "capability '{}' expired at {}",
                capability.id,
                expires.to_rfc3339()
            )));
        }
    }

    // Time-only context: action/parameter caveats wait for invocation,
    // opaque caveats are reported there as well
    let ctx = CaveatContext::at(now).with_revocations(revoked);
    evaluate_caveats(&capability.caveats, &ctx)?;

    // Signer resolution: the controller for a root, the parent's invoker
    // for a delegation
    let parent = match &capability.parent_capability {
        Some(parent_id) => Some(store.get(parent_id).ok_or_else(|| {
            ZcapError::CapabilityNotFound(parent_id.clone())
        })?),
        None => None,
    };
    let signer_did = match parent {
        Some(parent) => &parent.invoker.id,
        None => &capability.controller.id,
    };

    let signer_key = did_keys
        .get(signer_did)
        .ok_or_else(|| ZcapError::DidKeyNotFound(signer_did.clone()))?;

    let proof = capability.proof.as_ref().ok_or_else(|| {
        ZcapError::CapabilityVerification(format!("capability '{}' is unsigned", capability.id))
    })?;
    if proof.proof_purpose != PURPOSE_DELEGATION {
        return Err(ZcapError::CapabilityVerification(format!(
            "capability proof purpose must be '{PURPOSE_DELEGATION}', got '{}'",
            proof.proof_purpose
        )));
    }
    if proof.signer_did() != signer_did {
        warn!(
            id = %capability.id,
            expected = %signer_did,
            actual = %proof.signer_did(),
            "capability proof signed by the wrong party"
        );
        return Err(ZcapError::CapabilityVerification(format!(
            "proof verification method '{}' does not belong to signer '{signer_did}'",
            proof.verification_method
        )));
    }
    if proof.created < capability.created {
        return Err(ZcapError::CapabilityVerification(
            "proof predates the capability".into(),
        ));
    }
    if let Some(expires) = capability.expires {
        if proof.created > expires {
            return Err(ZcapError::CapabilityVerification(
                "proof postdates the capability's expiry".into(),
            ));
        }
    }

    let bytes = capability.signing_input()?;
    if let Err(err) = signer_key.verify(&bytes, &proof.proof_value) {
        warn!(id = %capability.id, signer = %signer_did, "capability signature rejected");
        return Err(err);
    }

    if let Some(parent) = parent {
        verify_link(parent, did_keys, revoked, store, visited)?;
        enforce_attenuation(capability, parent)?;
    }
    Ok(())
}

/// The attenuation invariant between one delegation link and its parent
fn enforce_attenuation(child: &Capability, parent: &Capability) -> Result<()> {
    for action in &child.actions {
        if !parent.has_action(&action.name) {
            warn!(
                child = %child.id,
                parent = %parent.id,
                action = %action.name,
                "attenuation violation: action not granted by parent"
            );
            return Err(ZcapError::CapabilityVerification(format!(
                "attenuation violated: action '{}' is not granted by the parent",
                action.name
            )));
        }
    }

    if let (Some(child_expires), Some(parent_expires)) = (child.expires, parent.expires) {
        if child_expires > parent_expires {
            return Err(ZcapError::CapabilityVerification(
                "attenuation violated: delegation outlives its parent".into(),
            ));
        }
    }

    for caveat in &parent.caveats {
        if !child.caveats.contains(caveat) {
            warn!(
                child = %child.id,
                parent = %parent.id,
                caveat = %caveat.tag(),
                "attenuation violation: parent caveat dropped"
            );
            return Err(ZcapError::CapabilityVerification(format!(
                "attenuation violated: parent caveat '{}' is missing from the delegation",
                caveat.tag()
            )));
        }
    }
    Ok(())
}
