//! The capability record and its JSON-LD projection
//!
//! A capability grants a named invoker the right to perform actions on a
//! target, optionally restricted by caveats and an expiry, and is signed by
//! its issuer: the controller for a root, the parent's invoker for a
//! delegation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::{self, REQUIRED_CONTEXTS};
use crate::caveat::Caveat;
use crate::crypto::KeyPair;
use crate::error::{Result, ZcapError};
use crate::types::{
    Action, Principal, Proof, Target, ED25519_SIGNATURE_2020, PURPOSE_DELEGATION,
};

/// The `type` tag every capability carries
pub const CAPABILITY_TYPE: &str = "zcap";

/// A signed authorization capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// JSON-LD contexts, always the embedded pair
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Globally unique `urn:uuid:` identifier, assigned at creation
    pub id: String,

    /// Always `"zcap"`
    #[serde(rename = "type")]
    pub capability_type: String,

    /// Issuer of the root capability; identical along a delegation chain
    pub controller: Principal,

    /// The only DID allowed to invoke or further delegate this capability
    pub invoker: Principal,

    /// The resource this capability grants authority over
    pub target: Target,

    /// Authorized actions; never empty
    #[serde(rename = "action")]
    pub actions: Vec<Action>,

    /// Usage restrictions; accumulate down the delegation chain
    #[serde(rename = "caveat", default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<Caveat>,

    /// Parent capability id; present iff this is a delegation
    #[serde(rename = "parentCapability", skip_serializing_if = "Option::is_none")]
    pub parent_capability: Option<String>,

    /// Set at signing time
    pub created: DateTime<Utc>,

    /// Optional hard expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    /// Attached after signing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl Capability {
    /// Is this a root capability (no parent)?
    pub fn is_root(&self) -> bool {
        self.parent_capability.is_none()
    }

    /// Look up an authorized action by name
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Does this capability authorize the named action?
    pub fn has_action(&self, name: &str) -> bool {
        self.action(name).is_some()
    }

    /// Project to a JSON-LD mapping suitable for canonicalization
    pub fn to_jsonld(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(ZcapError::from)
    }

    /// Parse a JSON-LD mapping and validate structural invariants
    pub fn from_jsonld(value: Value) -> Result<Self> {
        let capability: Capability = serde_json::from_value(value)
            .map_err(|e| ZcapError::Validation(e.to_string()))?;
        capability.validate()?;
        Ok(capability)
    }

    /// The canonical bytes this capability's proof signs
    pub fn signing_input(&self) -> Result<Vec<u8>> {
        canonical::canonicalize(&self.to_jsonld()?)
    }

    /// Check shape invariants: context whitelist, type tag, URN id,
    /// non-empty actions
    pub fn validate(&self) -> Result<()> {
        for required in REQUIRED_CONTEXTS {
            if !self.context.iter().any(|c| c == required) {
                return Err(ZcapError::Validation(format!(
                    "capability is missing required context '{required}'"
                )));
            }
        }
        if self.capability_type != CAPABILITY_TYPE {
            return Err(ZcapError::Validation(format!(
                "capability type must be '{CAPABILITY_TYPE}', got '{}'",
                self.capability_type
            )));
        }
        if !self.id.starts_with("urn:") {
            return Err(ZcapError::Validation(format!(
                "capability id must be a URN, got '{}'",
                self.id
            )));
        }
        if self.actions.is_empty() {
            return Err(ZcapError::Validation(
                "capability must authorize at least one action".into(),
            ));
        }
        if let Some(parent) = &self.parent_capability {
            if parent.is_empty() {
                return Err(ZcapError::Validation(
                    "parentCapability must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Create a builder for constructing root capabilities
    pub fn builder() -> CapabilityBuilder {
        CapabilityBuilder::default()
    }
}

/// Builder for unsigned capabilities
///
/// # Example
///
/// ```ignore
/// let capability = Capability::builder()
///     .controller("did:example:alice")
///     .invoker("did:example:bob")
///     .target(Target::new("https://example.com/documents/123", "Document"))
///     .action(Action::new("read"))
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct CapabilityBuilder {
    controller: Option<String>,
    invoker: Option<String>,
    target: Option<Target>,
    actions: Vec<Action>,
    caveats: Vec<Caveat>,
    parent_capability: Option<String>,
    expires: Option<DateTime<Utc>>,
}

impl CapabilityBuilder {
    /// Set the controller DID
    pub fn controller(mut self, did: impl Into<String>) -> Self {
        self.controller = Some(did.into());
        self
    }

    /// Set the invoker DID
    pub fn invoker(mut self, did: impl Into<String>) -> Self {
        self.invoker = Some(did.into());
        self
    }

    /// Set the target resource
    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Add a single action
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Set all actions
    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Add a single caveat
    pub fn caveat(mut self, caveat: Caveat) -> Self {
        self.caveats.push(caveat);
        self
    }

    /// Set all caveats
    pub fn caveats(mut self, caveats: Vec<Caveat>) -> Self {
        self.caveats = caveats;
        self
    }

    /// Set the parent capability id (delegations only)
    pub fn parent_capability(mut self, id: impl Into<String>) -> Self {
        self.parent_capability = Some(id.into());
        self
    }

    /// Set the expiry
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Build an unsigned capability, filling `id`, `created`, `@context`
    /// and `type`
    pub fn build(self) -> Result<Capability> {
        let controller = self
            .controller
            .ok_or_else(|| ZcapError::Validation("missing controller".into()))?;
        let invoker = self
            .invoker
            .ok_or_else(|| ZcapError::Validation("missing invoker".into()))?;
        let target = self
            .target
            .ok_or_else(|| ZcapError::Validation("missing target".into()))?;
        if self.actions.is_empty() {
            return Err(ZcapError::Validation(
                "capability must authorize at least one action".into(),
            ));
        }

        Ok(Capability {
            context: REQUIRED_CONTEXTS.iter().map(|c| c.to_string()).collect(),
            id: new_urn(),
            capability_type: CAPABILITY_TYPE.to_string(),
            controller: Principal::ed25519(controller),
            invoker: Principal::ed25519(invoker),
            target,
            actions: self.actions,
            caveats: self.caveats,
            parent_capability: self.parent_capability,
            created: Utc::now(),
            expires: self.expires,
            proof: None,
        })
    }
}

/// Create and sign a root capability
///
/// The controller issues authority over `target` to `invoker_did`. The
/// returned capability carries a `capabilityDelegation` proof signed with
/// `controller_key`.
pub fn create_capability(
    controller_did: &str,
    invoker_did: &str,
    actions: Vec<Action>,
    target: Target,
    controller_key: &KeyPair,
    expires: Option<DateTime<Utc>>,
    caveats: Option<Vec<Caveat>>,
) -> Result<Capability> {
    let mut builder = Capability::builder()
        .controller(controller_did)
        .invoker(invoker_did)
        .target(target)
        .actions(actions)
        .caveats(caveats.unwrap_or_default());
    if let Some(expires) = expires {
        builder = builder.expires(expires);
    }

    let mut capability = builder.build()?;
    let proof = sign_document(
        &capability.to_jsonld()?,
        controller_did,
        PURPOSE_DELEGATION,
        controller_key,
        capability.created,
    )?;
    capability.proof = Some(proof);
    Ok(capability)
}

/// Fresh `urn:uuid:` identifier
pub(crate) fn new_urn() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// Canonicalize `doc` (minus any proof) and sign it, producing a proof
/// record ready to attach
pub(crate) fn sign_document(
    doc: &Value,
    signer_did: &str,
    purpose: &str,
    key: &KeyPair,
    created: DateTime<Utc>,
) -> Result<Proof> {
    let bytes = canonical::canonicalize(doc)?;
    Ok(Proof {
        id: new_urn(),
        proof_type: ED25519_SIGNATURE_2020.to_string(),
        created,
        verification_method: format!("{signer_did}#key-1"),
        proof_purpose: purpose.to_string(),
        proof_value: key.sign(&bytes),
    })
}
