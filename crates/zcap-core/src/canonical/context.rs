//! Embedded JSON-LD context table
//!
//! Remote context loading is disabled: only the two capability context IRIs
//! are recognized, and their term definitions are embedded here. Any other
//! `@context` entry fails canonicalization.

/// The W3C security vocabulary context
pub const SECURITY_V2_CONTEXT: &str = "https://w3id.org/security/v2";

/// The ZCAP-LD context
pub const ZCAP_V1_CONTEXT: &str = "https://w3id.org/zcap/v1";

/// Contexts every document this engine produces carries, in order
pub const REQUIRED_CONTEXTS: [&str; 2] = [SECURITY_V2_CONTEXT, ZCAP_V1_CONTEXT];

pub(crate) const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub(crate) const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub(crate) const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub(crate) const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub(crate) const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub(crate) const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Fallback vocabulary for terms the embedded contexts do not define
const VOCAB: &str = "https://w3id.org/zcap/v1#";

/// Terms the embedded contexts map to fixed IRIs
const TERMS: &[(&str, &str)] = &[
    ("action", "https://w3id.org/security#capabilityAction"),
    ("capability", "https://w3id.org/security#capability"),
    ("caveat", "https://w3id.org/security#caveat"),
    ("controller", "https://w3id.org/security#controller"),
    ("created", "http://purl.org/dc/terms/created"),
    ("expires", "https://w3id.org/security#expiration"),
    ("invoker", "https://w3id.org/security#invoker"),
    ("nonce", "https://w3id.org/security#nonce"),
    ("parentCapability", "https://w3id.org/security#parentCapability"),
    ("target", "https://w3id.org/security#invocationTarget"),
];

/// Type tags the embedded contexts map to fixed IRIs
const TYPES: &[(&str, &str)] = &[
    ("CapabilityInvocation", "https://w3id.org/security#CapabilityInvocation"),
    ("Ed25519VerificationKey2020", "https://w3id.org/security#Ed25519VerificationKey2020"),
    ("zcap", "https://w3id.org/zcap/v1#Capability"),
];

/// Terms whose string values are typed `xsd:dateTime`
const DATETIME_TERMS: &[&str] = &["created", "expires", "date"];

/// Terms whose string values are node references, not literals
const IRI_TERMS: &[&str] = &["capability", "parentCapability"];

/// Is this IRI in the embedded whitelist?
pub fn is_whitelisted(iri: &str) -> bool {
    REQUIRED_CONTEXTS.contains(&iri)
}

/// Expand a property term to its predicate IRI
pub(crate) fn term_iri(term: &str) -> String {
    match TERMS.binary_search_by_key(&term, |&(t, _)| t) {
        Ok(i) => TERMS[i].1.to_string(),
        Err(_) => format!("{VOCAB}{term}"),
    }
}

/// Expand a type tag to its class IRI
pub(crate) fn type_iri(tag: &str) -> String {
    match TYPES.binary_search_by_key(&tag, |&(t, _)| t) {
        Ok(i) => TYPES[i].1.to_string(),
        Err(_) => format!("{VOCAB}{tag}"),
    }
}

/// Does this term coerce string values to `xsd:dateTime`?
pub(crate) fn is_datetime_term(term: &str) -> bool {
    DATETIME_TERMS.contains(&term)
}

/// Does this term coerce string values to node references?
pub(crate) fn is_iri_term(term: &str) -> bool {
    IRI_TERMS.contains(&term)
}
