//! Delegation: constructing attenuated child capabilities
//!
//! Only the parent's invoker may delegate. A child may narrow the action
//! set, shorten the expiry, and add caveats; it can never widen any of
//! them. The child's controller stays the root controller, so ownership of
//! the target is preserved across the chain.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::capability::{sign_document, Capability};
use crate::caveat::Caveat;
use crate::crypto::KeyPair;
use crate::error::{Result, ZcapError};
use crate::store::{CapabilityStore, DidKeyStore, RevocationSet};
use crate::types::{Action, PURPOSE_DELEGATION};
use crate::verify::verify_capability;

/// Delegate `parent` to a new invoker, attenuating as requested
///
/// - `actions`: must be a subset of the parent's by name; omitted inherits
///   the parent's actions.
/// - `expires`: must not exceed the parent's; omitted inherits it.
/// - `caveats`: appended to the parent's caveats (which are always
///   inherited); literally identical caveats are not duplicated.
///
/// The child is signed by `delegator_key`, which must match the parent
/// invoker's registered public key.
#[allow(clippy::too_many_arguments)]
pub fn delegate_capability(
    parent: &Capability,
    delegator_key: &KeyPair,
    new_invoker_did: &str,
    did_keys: &DidKeyStore,
    revoked: &RevocationSet,
    store: &CapabilityStore,
    actions: Option<Vec<Action>>,
    expires: Option<DateTime<Utc>>,
    caveats: Option<Vec<Caveat>>,
) -> Result<Capability> {
    verify_capability(parent, did_keys, revoked, store)?;

    let delegator_public = did_keys
        .get(&parent.invoker.id)
        .ok_or_else(|| ZcapError::DidKeyNotFound(parent.invoker.id.clone()))?;
    if delegator_key.public_key() != *delegator_public {
        warn!(parent = %parent.id, invoker = %parent.invoker.id, "delegation by a non-invoker");
        return Err(ZcapError::Delegation(format!(
            "delegator is not the current invoker '{}'",
            parent.invoker.id
        )));
    }

    let actions = match actions {
        Some(actions) => {
            for action in &actions {
                if !parent.has_action(&action.name) {
                    warn!(
                        parent = %parent.id,
                        action = %action.name,
                        "delegation requested an action the parent does not grant"
                    );
                    return Err(ZcapError::Delegation(format!(
                        "action '{}' is not granted by the parent",
                        action.name
                    )));
                }
            }
            actions
        }
        None => parent.actions.clone(),
    };

    let expires = match expires {
        Some(requested) => {
            if let Some(parent_expires) = parent.expires {
                if requested > parent_expires {
                    return Err(ZcapError::Delegation(format!(
                        "expiry {} extends the parent's {}",
                        requested.to_rfc3339(),
                        parent_expires.to_rfc3339()
                    )));
                }
            }
            Some(requested)
        }
        None => parent.expires,
    };

    let mut merged = parent.caveats.clone();
    for caveat in caveats.unwrap_or_default() {
        if !merged.contains(&caveat) {
            merged.push(caveat);
        }
    }

    let mut builder = Capability::builder()
        .controller(parent.controller.id.clone())
        .invoker(new_invoker_did)
        .target(parent.target.clone())
        .actions(actions)
        .caveats(merged)
        .parent_capability(parent.id.clone());
    if let Some(expires) = expires {
        builder = builder.expires(expires);
    }

    let mut child = builder.build()?;
    let proof = sign_document(
        &child.to_jsonld()?,
        &parent.invoker.id,
        PURPOSE_DELEGATION,
        delegator_key,
        child.created,
    )?;
    child.proof = Some(proof);
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::create_capability;
    use crate::types::Target;
    use chrono::Duration;
    use std::collections::{HashMap, HashSet};

    struct Fixture {
        bob: KeyPair,
        charlie: KeyPair,
        did_keys: DidKeyStore,
        revoked: RevocationSet,
        store: CapabilityStore,
        parent: Capability,
    }

    fn fixture() -> Fixture {
        let alice = KeyPair::generate("did:example:alice");
        let bob = KeyPair::generate("did:example:bob");
        let charlie = KeyPair::generate("did:example:charlie");

        let mut did_keys = HashMap::new();
        did_keys.insert("did:example:alice".to_string(), alice.public_key());
        did_keys.insert("did:example:bob".to_string(), bob.public_key());
        did_keys.insert("did:example:charlie".to_string(), charlie.public_key());

        let parent = create_capability(
            "did:example:alice",
            "did:example:bob",
            vec![Action::new("read"), Action::new("write")],
            Target::new("urn:doc:123", "Document"),
            &alice,
            Some(Utc::now() + Duration::days(30)),
            Some(vec![Caveat::ValidUntil {
                date: Utc::now() + Duration::days(30),
            }]),
        )
        .unwrap();

        let mut store = HashMap::new();
        store.insert(parent.id.clone(), parent.clone());

        Fixture {
            bob,
            charlie,
            did_keys,
            revoked: HashSet::new(),
            store,
            parent,
        }
    }

    #[test]
    fn test_delegation_narrows_and_verifies() {
        let mut fx = fixture();
        let child = delegate_capability(
            &fx.parent,
            &fx.bob,
            "did:example:charlie",
            &fx.did_keys,
            &fx.revoked,
            &fx.store,
            Some(vec![Action::new("read")]),
            Some(Utc::now() + Duration::days(7)),
            Some(vec![Caveat::AllowedAction {
                actions: vec!["read".into()],
            }]),
        )
        .unwrap();

        assert_eq!(child.parent_capability.as_deref(), Some(fx.parent.id.as_str()));
        assert_eq!(child.controller.id, "did:example:alice");
        assert_eq!(child.invoker.id, "did:example:charlie");
        assert_eq!(child.actions.len(), 1);
        // Parent caveats are inherited ahead of the new ones
        assert_eq!(child.caveats.len(), 2);
        assert_eq!(child.caveats[0], fx.parent.caveats[0]);
        assert_eq!(
            child.proof.as_ref().unwrap().verification_method,
            "did:example:bob#key-1"
        );

        fx.store.insert(child.id.clone(), child.clone());
        verify_capability(&child, &fx.did_keys, &fx.revoked, &fx.store).unwrap();
    }

    #[test]
    fn test_delegation_inherits_when_unspecified() {
        let fx = fixture();
        let child = delegate_capability(
            &fx.parent,
            &fx.bob,
            "did:example:charlie",
            &fx.did_keys,
            &fx.revoked,
            &fx.store,
            None,
            None,
            None,
        )
        .unwrap();

        assert_eq!(child.actions, fx.parent.actions);
        assert_eq!(child.expires, fx.parent.expires);
        assert_eq!(child.caveats, fx.parent.caveats);
    }

    #[test]
    fn test_superset_actions_rejected() {
        let fx = fixture();
        let err = delegate_capability(
            &fx.parent,
            &fx.bob,
            "did:example:charlie",
            &fx.did_keys,
            &fx.revoked,
            &fx.store,
            Some(vec![Action::new("read"), Action::new("delete")]),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ZcapError::Delegation(_)));
        assert!(err.to_string().contains("delete"));
    }

    #[test]
    fn test_extended_expiry_rejected() {
        let fx = fixture();
        let err = delegate_capability(
            &fx.parent,
            &fx.bob,
            "did:example:charlie",
            &fx.did_keys,
            &fx.revoked,
            &fx.store,
            None,
            Some(Utc::now() + Duration::days(365)),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ZcapError::Delegation(_)));
    }

    #[test]
    fn test_non_invoker_cannot_delegate() {
        let fx = fixture();
        let err = delegate_capability(
            &fx.parent,
            &fx.charlie,
            "did:example:charlie",
            &fx.did_keys,
            &fx.revoked,
            &fx.store,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ZcapError::Delegation(_)));
        assert!(err.to_string().contains("not the current invoker"));
    }

    #[test]
    fn test_revoked_parent_cannot_delegate() {
        let mut fx = fixture();
        fx.revoked.insert(fx.parent.id.clone());
        let err = delegate_capability(
            &fx.parent,
            &fx.bob,
            "did:example:charlie",
            &fx.did_keys,
            &fx.revoked,
            &fx.store,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ZcapError::CapabilityVerification(_)));
    }

    #[test]
    fn test_identical_caveat_not_duplicated() {
        let fx = fixture();
        let child = delegate_capability(
            &fx.parent,
            &fx.bob,
            "did:example:charlie",
            &fx.did_keys,
            &fx.revoked,
            &fx.store,
            None,
            None,
            Some(vec![fx.parent.caveats[0].clone()]),
        )
        .unwrap();
        assert_eq!(child.caveats.len(), 1);
    }
}
