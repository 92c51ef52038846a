//! Deterministic canonicalization of JSON-LD documents for signing
//!
//! The signing input for every proof is the canonical N-Quads rendering of
//! the document with its `proof` removed: the document is expanded to RDF
//! against the embedded context table, blank nodes are relabeled with
//! URDNA2015, and the sorted quads are emitted as UTF-8 bytes. Two documents
//! that differ only in key order, whitespace, or array order of their
//! unordered properties canonicalize to identical bytes.

mod context;
mod normalize;
mod rdf;

pub use context::{is_whitelisted, REQUIRED_CONTEXTS, SECURITY_V2_CONTEXT, ZCAP_V1_CONTEXT};

use serde_json::Value;

use crate::error::{Result, ZcapError};

/// Produce the canonical byte representation of a document
///
/// The `proof` member is stripped before canonicalization, so the same call
/// serves both signing (proof not yet attached) and verification (proof
/// present but excluded from the signed bytes).
pub fn canonicalize(doc: &Value) -> Result<Vec<u8>> {
    let Value::Object(obj) = doc else {
        return Err(ZcapError::Canonicalization(
            "document must be a JSON object".into(),
        ));
    };

    validate_context(obj.get("@context"))?;

    let mut stripped = obj.clone();
    stripped.remove("proof");

    let triples = rdf::expand(&stripped)?;
    Ok(normalize::normalize(&triples).into_bytes())
}

/// Reject documents whose contexts are missing or outside the embedded
/// whitelist; remote context fetching is disabled by design
fn validate_context(context: Option<&Value>) -> Result<()> {
    let context = context.ok_or_else(|| {
        ZcapError::Canonicalization("document is missing '@context'".into())
    })?;

    let entries: Vec<&Value> = match context {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    if entries.is_empty() {
        return Err(ZcapError::Canonicalization("'@context' is empty".into()));
    }
    for entry in entries {
        match entry {
            Value::String(iri) if is_whitelisted(iri) => {}
            Value::String(iri) => {
                return Err(ZcapError::Canonicalization(format!(
                    "context '{iri}' is not in the embedded whitelist"
                )))
            }
            other => {
                return Err(ZcapError::Canonicalization(format!(
                    "unsupported inline context: {other}"
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(extra: Value) -> Value {
        let mut base = json!({
            "@context": [SECURITY_V2_CONTEXT, ZCAP_V1_CONTEXT],
            "id": "urn:uuid:11111111-1111-4111-8111-111111111111",
            "type": "zcap"
        });
        if let (Value::Object(base_map), Value::Object(extra_map)) = (&mut base, extra) {
            base_map.extend(extra_map);
        }
        base
    }

    #[test]
    fn test_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(
            r#"{"@context": ["https://w3id.org/security/v2"], "id": "urn:x:1", "invoker": {"id": "did:example:bob", "type": "Ed25519VerificationKey2020"}}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"invoker": {"type": "Ed25519VerificationKey2020", "id": "did:example:bob"}, "id": "urn:x:1", "@context": ["https://w3id.org/security/v2"]}"#,
        )
        .unwrap();
        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    #[test]
    fn test_action_order_is_irrelevant() {
        let a = doc(json!({"action": [{"name": "read"}, {"name": "write"}]}));
        let b = doc(json!({"action": [{"name": "write"}, {"name": "read"}]}));
        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    #[test]
    fn test_distinct_documents_differ() {
        let a = doc(json!({"action": [{"name": "read"}]}));
        let b = doc(json!({"action": [{"name": "write"}]}));
        assert_ne!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    #[test]
    fn test_proof_is_excluded_from_signing_input() {
        let without = doc(json!({}));
        let with = doc(json!({"proof": {"proofValue": "z123"}}));
        assert_eq!(canonicalize(&without).unwrap(), canonicalize(&with).unwrap());
    }

    #[test]
    fn test_unknown_context_rejected() {
        let bad = json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "id": "urn:x:1"
        });
        assert!(matches!(
            canonicalize(&bad),
            Err(ZcapError::Canonicalization(_))
        ));
    }

    #[test]
    fn test_missing_context_rejected() {
        let bad = json!({"id": "urn:x:1"});
        assert!(canonicalize(&bad).is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(canonicalize(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_output_is_nquads_lines() {
        let bytes = canonicalize(&doc(json!({}))).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with(" .\n"));
        assert!(text.contains("<urn:uuid:11111111-1111-4111-8111-111111111111>"));
    }
}
