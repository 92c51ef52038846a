//! Caveats: usage restrictions attached to capabilities
//!
//! A caveat is a tagged predicate evaluated at verification and invocation
//! time. Known tags get typed variants; everything else is carried verbatim
//! in a catch-all so foreign documents survive a round-trip, and fails
//! closed when evaluated.
//!
//! `MaxUses` and `AllowedNetwork` are opaque to the engine: evaluation
//! reports them back to the caller, who must enforce them before acting on
//! an invocation.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ZcapError};
use crate::store::RevocationSet;

/// A usage restriction attached to a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Caveat {
    /// Valid while `now <= date`
    ValidUntil { date: DateTime<Utc> },

    /// Valid while `now >= date`
    ValidAfter { date: DateTime<Utc> },

    /// Restricts invocations to the listed action names
    AllowedAction { actions: Vec<String> },

    /// Requires an invocation parameter to be present, optionally with an
    /// exact value
    RequireParameter { name: String, value: Option<Value> },

    /// Use-count bound; opaque to the engine, enforced by the caller
    MaxUses { limit: u64 },

    /// Network restriction; opaque to the engine, shape preserved verbatim
    AllowedNetwork(Map<String, Value>),

    /// Valid while the referenced condition id has not been revoked
    ValidWhileTrue { resource_id: String },

    /// Unrecognized caveat, preserved verbatim; fails evaluation closed
    Other(Map<String, Value>),
}

/// Outcome of evaluating a single satisfied caveat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaveatVerdict {
    /// The caveat is satisfied in the given context
    Satisfied,

    /// The engine cannot decide this caveat; the caller must enforce it
    Opaque,
}

/// The context a caveat is evaluated against
///
/// Chain verification uses a time-only context (no action, no parameters);
/// invocation supplies the full context. Action- and parameter-scoped
/// caveats are only checked when the context carries that information.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaveatContext<'a> {
    /// Evaluation instant
    pub now: DateTime<Utc>,

    /// Action being invoked, when evaluating an invocation
    pub action: Option<&'a str>,

    /// Invocation parameters, when evaluating an invocation
    pub parameters: Option<&'a Map<String, Value>>,

    /// Revoked capability and condition ids
    pub revoked: Option<&'a RevocationSet>,
}

impl<'a> CaveatContext<'a> {
    /// Time-only context at the given instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Attach the action name being invoked
    pub fn with_action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    /// Attach the invocation parameters
    pub fn with_parameters(mut self, parameters: &'a Map<String, Value>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Attach the revocation set
    pub fn with_revocations(mut self, revoked: &'a RevocationSet) -> Self {
        self.revoked = Some(revoked);
        self
    }
}

impl Caveat {
    /// The caveat's type tag as it appears on the wire
    pub fn tag(&self) -> &str {
        match self {
            Caveat::ValidUntil { .. } => "ValidUntil",
            Caveat::ValidAfter { .. } => "ValidAfter",
            Caveat::AllowedAction { .. } => "AllowedAction",
            Caveat::RequireParameter { .. } => "RequireParameter",
            Caveat::MaxUses { .. } => "MaxUses",
            Caveat::AllowedNetwork(_) => "AllowedNetwork",
            Caveat::ValidWhileTrue { .. } => "ValidWhileTrue",
            Caveat::Other(fields) => fields
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("<untyped>"),
        }
    }

    /// Evaluate this caveat against a context
    ///
    /// Returns `Ok(Satisfied)` or `Ok(Opaque)`; every failure is a
    /// [`ZcapError::CaveatEvaluation`].
    pub fn evaluate(&self, ctx: &CaveatContext<'_>) -> Result<CaveatVerdict> {
        match self {
            Caveat::ValidUntil { date } => {
                if ctx.now <= *date {
                    Ok(CaveatVerdict::Satisfied)
                } else {
                    Err(ZcapError::CaveatEvaluation(format!(
                        "ValidUntil: expired at {}",
                        date.to_rfc3339()
                    )))
                }
            }
            Caveat::ValidAfter { date } => {
                if ctx.now >= *date {
                    Ok(CaveatVerdict::Satisfied)
                } else {
                    Err(ZcapError::CaveatEvaluation(format!(
                        "ValidAfter: not valid until {}",
                        date.to_rfc3339()
                    )))
                }
            }
            Caveat::AllowedAction { actions } => match ctx.action {
                None => Ok(CaveatVerdict::Satisfied),
                Some(name) if actions.iter().any(|a| a == name) => {
                    Ok(CaveatVerdict::Satisfied)
                }
                Some(name) => Err(ZcapError::CaveatEvaluation(format!(
                    "AllowedAction: action '{name}' not in {actions:?}"
                ))),
            },
            Caveat::RequireParameter { name, value } => match ctx.parameters {
                None => Ok(CaveatVerdict::Satisfied),
                Some(params) => match params.get(name) {
                    None => Err(ZcapError::CaveatEvaluation(format!(
                        "RequireParameter: parameter '{name}' missing"
                    ))),
                    Some(actual) => match value {
                        Some(expected) if actual != expected => {
                            Err(ZcapError::CaveatEvaluation(format!(
                                "RequireParameter: parameter '{name}' is {actual}, expected {expected}"
                            )))
                        }
                        _ => Ok(CaveatVerdict::Satisfied),
                    },
                },
            },
            Caveat::MaxUses { .. } | Caveat::AllowedNetwork(_) => Ok(CaveatVerdict::Opaque),
            Caveat::ValidWhileTrue { resource_id } => match ctx.revoked {
                Some(revoked) if revoked.contains(resource_id) => {
                    Err(ZcapError::CaveatEvaluation(format!(
                        "ValidWhileTrue: condition '{resource_id}' no longer holds"
                    )))
                }
                _ => Ok(CaveatVerdict::Satisfied),
            },
            Caveat::Other(_) => Err(ZcapError::CaveatEvaluation(format!(
                "unknown caveat type '{}'",
                self.tag()
            ))),
        }
    }
}

/// Evaluate caveats in declaration order, short-circuiting on failure
///
/// Returns the opaque caveats encountered, for the caller to enforce.
pub fn evaluate_caveats(caveats: &[Caveat], ctx: &CaveatContext<'_>) -> Result<Vec<Caveat>> {
    let mut advisories = Vec::new();
    for caveat in caveats {
        if caveat.evaluate(ctx)? == CaveatVerdict::Opaque {
            advisories.push(caveat.clone());
        }
    }
    Ok(advisories)
}

/// Evaluate a single caveat at the current instant
///
/// Action- and parameter-scoped caveats are only checked when the
/// corresponding argument is supplied.
pub fn evaluate_caveat(
    caveat: &Caveat,
    action: Option<&str>,
    parameters: Option<&Map<String, Value>>,
    revoked_ids: Option<&RevocationSet>,
) -> Result<CaveatVerdict> {
    let ctx = CaveatContext {
        now: Utc::now(),
        action,
        parameters,
        revoked: revoked_ids,
    };
    caveat.evaluate(&ctx)
}

/// Parse a timestamp: RFC 3339, or a naive ISO 8601 string assumed UTC
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ZcapError::Validation(format!("invalid timestamp '{s}'")))
}

fn string_field(fields: &Map<String, Value>, tag: &str, key: &str) -> Result<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ZcapError::Validation(format!("{tag} caveat requires string '{key}'")))
}

impl TryFrom<Value> for Caveat {
    type Error = ZcapError;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(ZcapError::Validation("caveat must be an object".into()));
        };
        let tag = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ZcapError::Validation("caveat is missing a 'type' tag".into()))?
            .to_string();

        match tag.as_str() {
            "ValidUntil" => Ok(Caveat::ValidUntil {
                date: parse_timestamp(&string_field(&fields, &tag, "date")?)?,
            }),
            "ValidAfter" => Ok(Caveat::ValidAfter {
                date: parse_timestamp(&string_field(&fields, &tag, "date")?)?,
            }),
            "AllowedAction" => {
                let actions = fields
                    .get("actions")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        ZcapError::Validation("AllowedAction caveat requires 'actions' list".into())
                    })?
                    .iter()
                    .map(|a| {
                        a.as_str().map(str::to_string).ok_or_else(|| {
                            ZcapError::Validation(
                                "AllowedAction caveat actions must be strings".into(),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Caveat::AllowedAction { actions })
            }
            "RequireParameter" => Ok(Caveat::RequireParameter {
                name: string_field(&fields, &tag, "parameter")?,
                value: fields.get("value").cloned(),
            }),
            "MaxUses" => {
                let limit = fields.get("limit").and_then(Value::as_u64).ok_or_else(|| {
                    ZcapError::Validation("MaxUses caveat requires integer 'limit'".into())
                })?;
                Ok(Caveat::MaxUses { limit })
            }
            "AllowedNetwork" => Ok(Caveat::AllowedNetwork(fields)),
            "ValidWhileTrue" => Ok(Caveat::ValidWhileTrue {
                resource_id: string_field(&fields, &tag, "conditionId")?,
            }),
            _ => Ok(Caveat::Other(fields)),
        }
    }
}

impl From<Caveat> for Value {
    fn from(caveat: Caveat) -> Value {
        let mut fields = Map::new();
        match caveat {
            Caveat::ValidUntil { date } => {
                fields.insert("type".into(), "ValidUntil".into());
                fields.insert(
                    "date".into(),
                    date.to_rfc3339_opts(SecondsFormat::AutoSi, true).into(),
                );
            }
            Caveat::ValidAfter { date } => {
                fields.insert("type".into(), "ValidAfter".into());
                fields.insert(
                    "date".into(),
                    date.to_rfc3339_opts(SecondsFormat::AutoSi, true).into(),
                );
            }
            Caveat::AllowedAction { actions } => {
                fields.insert("type".into(), "AllowedAction".into());
                fields.insert("actions".into(), actions.into());
            }
            Caveat::RequireParameter { name, value } => {
                fields.insert("type".into(), "RequireParameter".into());
                fields.insert("parameter".into(), name.into());
                if let Some(value) = value {
                    fields.insert("value".into(), value);
                }
            }
            Caveat::MaxUses { limit } => {
                fields.insert("type".into(), "MaxUses".into());
                fields.insert("limit".into(), limit.into());
            }
            Caveat::AllowedNetwork(existing) => {
                fields = existing;
                fields
                    .entry("type".to_string())
                    .or_insert_with(|| "AllowedNetwork".into());
            }
            Caveat::ValidWhileTrue { resource_id } => {
                fields.insert("type".into(), "ValidWhileTrue".into());
                fields.insert("conditionId".into(), resource_id.into());
            }
            Caveat::Other(existing) => fields = existing,
        }
        Value::Object(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_valid_until_passes_before_deadline() {
        let now = Utc::now();
        let caveat = Caveat::ValidUntil {
            date: now + Duration::hours(1),
        };
        assert_eq!(
            caveat.evaluate(&CaveatContext::at(now)).unwrap(),
            CaveatVerdict::Satisfied
        );
    }

    #[test]
    fn test_valid_until_fails_after_deadline() {
        let now = Utc::now();
        let caveat = Caveat::ValidUntil {
            date: now - Duration::hours(1),
        };
        let err = caveat.evaluate(&CaveatContext::at(now)).unwrap_err();
        assert!(matches!(err, ZcapError::CaveatEvaluation(_)));
    }

    #[test]
    fn test_valid_after_gate() {
        let now = Utc::now();
        let caveat = Caveat::ValidAfter {
            date: now + Duration::hours(2),
        };
        assert!(caveat.evaluate(&CaveatContext::at(now)).is_err());
        assert!(caveat
            .evaluate(&CaveatContext::at(now + Duration::hours(3)))
            .is_ok());
    }

    #[test]
    fn test_allowed_action_skipped_without_action() {
        let caveat = Caveat::AllowedAction {
            actions: vec!["read".into()],
        };
        // Time-only context: nothing to check
        assert_eq!(
            caveat.evaluate(&CaveatContext::at(Utc::now())).unwrap(),
            CaveatVerdict::Satisfied
        );
    }

    #[test]
    fn test_allowed_action_enforced_with_action() {
        let caveat = Caveat::AllowedAction {
            actions: vec!["read".into(), "share".into()],
        };
        let ctx = CaveatContext::at(Utc::now()).with_action("read");
        assert!(caveat.evaluate(&ctx).is_ok());

        let ctx = CaveatContext::at(Utc::now()).with_action("write");
        assert!(caveat.evaluate(&ctx).is_err());
    }

    #[test]
    fn test_require_parameter_matrix() {
        let caveat = Caveat::RequireParameter {
            name: "mode".into(),
            value: Some(json!("readonly")),
        };

        let mut params = Map::new();
        params.insert("mode".into(), json!("readonly"));
        let ctx = CaveatContext::at(Utc::now()).with_parameters(&params);
        assert!(caveat.evaluate(&ctx).is_ok());

        let mut wrong = Map::new();
        wrong.insert("mode".into(), json!("readwrite"));
        let ctx = CaveatContext::at(Utc::now()).with_parameters(&wrong);
        assert!(caveat.evaluate(&ctx).is_err());

        let empty = Map::new();
        let ctx = CaveatContext::at(Utc::now()).with_parameters(&empty);
        assert!(caveat.evaluate(&ctx).is_err());
    }

    #[test]
    fn test_require_parameter_presence_only() {
        let caveat = Caveat::RequireParameter {
            name: "mode".into(),
            value: None,
        };
        let mut params = Map::new();
        params.insert("mode".into(), json!("anything"));
        let ctx = CaveatContext::at(Utc::now()).with_parameters(&params);
        assert!(caveat.evaluate(&ctx).is_ok());
    }

    #[test]
    fn test_valid_while_true_tracks_revocation() {
        let caveat = Caveat::ValidWhileTrue {
            resource_id: "condition:subscription:active".into(),
        };
        let mut revoked: HashSet<String> = HashSet::new();
        let ctx = CaveatContext::at(Utc::now()).with_revocations(&revoked);
        assert!(caveat.evaluate(&ctx).is_ok());

        revoked.insert("condition:subscription:active".into());
        let ctx = CaveatContext::at(Utc::now()).with_revocations(&revoked);
        assert!(caveat.evaluate(&ctx).is_err());
    }

    #[test]
    fn test_opaque_caveats_reported_not_failed() {
        let ctx = CaveatContext::at(Utc::now());
        assert_eq!(
            Caveat::MaxUses { limit: 3 }.evaluate(&ctx).unwrap(),
            CaveatVerdict::Opaque
        );

        let net: Map<String, Value> = serde_json::from_value(json!({
            "type": "AllowedNetwork",
            "networks": ["10.0.0.0/8"]
        }))
        .unwrap();
        assert_eq!(
            Caveat::AllowedNetwork(net).evaluate(&ctx).unwrap(),
            CaveatVerdict::Opaque
        );
    }

    #[test]
    fn test_unknown_caveat_fails_closed() {
        let caveat: Caveat = serde_json::from_value(json!({
            "type": "TimeSlot",
            "start": "09:00",
            "end": "17:00"
        }))
        .unwrap();
        assert_eq!(caveat.tag(), "TimeSlot");
        assert!(caveat.evaluate(&CaveatContext::at(Utc::now())).is_err());
    }

    #[test]
    fn test_unknown_caveat_roundtrips_verbatim() {
        let raw = json!({"type": "TimeSlot", "start": "09:00", "end": "17:00"});
        let caveat: Caveat = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&caveat).unwrap(), raw);
    }

    #[test]
    fn test_short_circuit_order() {
        let now = Utc::now();
        let caveats = vec![
            Caveat::ValidUntil {
                date: now - Duration::hours(1),
            },
            Caveat::Other(Map::new()),
        ];
        // The first failure wins; the malformed second caveat is never reached
        let err = evaluate_caveats(&caveats, &CaveatContext::at(now)).unwrap_err();
        assert!(err.to_string().contains("ValidUntil"));
    }

    #[test]
    fn test_naive_timestamp_accepted() {
        let caveat: Caveat = serde_json::from_value(json!({
            "type": "ValidUntil",
            "date": "2030-06-01T12:00:00.500000"
        }))
        .unwrap();
        match caveat {
            Caveat::ValidUntil { date } => assert_eq!(date.to_rfc3339(), "2030-06-01T12:00:00.500+00:00"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_known_tag_rejected() {
        let result: std::result::Result<Caveat, _> =
            serde_json::from_value(json!({"type": "ValidUntil"}));
        assert!(result.is_err());
    }
}
