//! Caller-owned state containers
//!
//! The engine holds no state of its own. Every entry point takes explicit
//! handles to containers the caller owns, with the following discipline:
//!
//! - [`DidKeyStore`], [`CapabilityStore`], [`RevocationSet`]: read-only to
//!   the library. Safe to share across parallel verifications.
//! - [`NonceSet`], [`NonceTimestamps`]: read-write. `invoke_capability` and
//!   `cleanup_expired_nonces` mutate them in place; callers sharing them
//!   across threads must hold exclusion across the whole call, and must keep
//!   the pair transactionally consistent.
//!
//! Persisting a freshly produced capability into the [`CapabilityStore`] is
//! the caller's choice; the library never assumes it for the capability it
//! just returned.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::capability::Capability;
use crate::crypto::PublicKey;

/// DID → public key resolution map (read-only)
pub type DidKeyStore = HashMap<String, PublicKey>;

/// Capability id → capability map used to resolve `parentCapability` links
/// (read-only)
pub type CapabilityStore = HashMap<String, Capability>;

/// Set of revoked capability ids and condition ids (read-only)
pub type RevocationSet = HashSet<String>;

/// Set of nonces consumed by successful invocations (read-write)
pub type NonceSet = HashSet<String>;

/// Nonce → issuance time map driving expiry sweeps (read-write)
pub type NonceTimestamps = HashMap<String, DateTime<Utc>>;
