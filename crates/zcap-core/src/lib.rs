//! # zcap-core
//!
//! A stateless engine for ZCAP-LD (Authorization Capabilities for Linked
//! Data): creating, delegating, invoking, and verifying cryptographically
//! signed capabilities expressed as JSON-LD documents.
//!
//! ## Key Concepts
//!
//! - **Capability**: a signed grant of named actions on a target resource
//!   to a single invoker
//! - **Delegation chain**: `parentCapability` links from a leaf back to its
//!   root, with monotonically attenuating authority
//! - **Caveat**: a typed usage restriction, evaluated at verification and
//!   invocation time; caveats accumulate down the chain
//! - **Invocation**: a signed, nonce-carrying document exercising one
//!   action of a capability
//!
//! ## Invariants
//!
//! 1. **Attenuation**: a delegation never grants more than its parent —
//!    actions shrink, expiry never extends, caveats never drop
//! 2. **Transitive trust**: every link is signed by its issuer (the
//!    controller at the root, the parent's invoker below), verified over
//!    canonical URDNA2015 N-Quads
//! 3. **Replay safety**: every invocation carries a fresh 128-bit nonce
//!    recorded in the caller's bounded nonce store
//!
//! ## State
//!
//! The engine owns no state. Key material, capability stores, revocation
//! sets, and nonce tables are caller-owned containers passed into each
//! call; only the nonce containers are ever written (see [`store`]).

pub mod canonical;
pub mod capability;
pub mod caveat;
pub mod crypto;
pub mod delegation;
pub mod error;
pub mod invocation;
pub mod store;
pub mod types;
pub mod verify;

pub use canonical::{canonicalize, SECURITY_V2_CONTEXT, ZCAP_V1_CONTEXT};
pub use capability::{create_capability, Capability, CapabilityBuilder, CAPABILITY_TYPE};
pub use caveat::{evaluate_caveat, evaluate_caveats, Caveat, CaveatContext, CaveatVerdict};
pub use crypto::{KeyPair, PublicKey};
pub use delegation::delegate_capability;
pub use error::{Result, ZcapError};
pub use invocation::{
    cleanup_expired_nonces, invoke_capability, verify_invocation, Invocation, InvocationOutcome,
    DEFAULT_NONCE_MAX_AGE, INVOCATION_TYPE,
};
pub use store::{CapabilityStore, DidKeyStore, NonceSet, NonceTimestamps, RevocationSet};
pub use types::{Action, Principal, Proof, Target};
pub use verify::{verify_capability, MAX_CHAIN_DEPTH};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
