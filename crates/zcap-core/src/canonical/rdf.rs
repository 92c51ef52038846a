//! JSON-LD expansion to RDF triples
//!
//! A deliberately small expansion: terms resolve through the embedded
//! context table, objects with an `id` become named nodes, anonymous
//! objects become blank nodes, arrays become repeated predicates (RDF
//! sets), and JSON scalars become typed literals in canonical lexical
//! form. This covers every document shape the capability model produces.

use serde_json::{Map, Value};

use super::context;
use crate::error::{Result, ZcapError};

/// An RDF term in subject, predicate, or object position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        /// `None` means `xsd:string` (rendered without a datatype suffix)
        datatype: Option<String>,
    },
}

impl Term {
    /// Render the term in N-Quads form, mapping blank labels through `f`
    fn render(&self, f: &dyn Fn(&str) -> String, out: &mut String) {
        match self {
            Term::Iri(iri) => {
                out.push('<');
                out.push_str(iri);
                out.push('>');
            }
            Term::Blank(label) => {
                out.push_str("_:");
                out.push_str(&f(label));
            }
            Term::Literal { value, datatype } => {
                out.push('"');
                for c in value.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('"');
                if let Some(dt) = datatype {
                    out.push_str("^^<");
                    out.push_str(dt);
                    out.push('>');
                }
            }
        }
    }
}

/// A triple in the default graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    /// Render as an N-Quads line (no trailing newline), mapping blank node
    /// labels through `relabel`
    pub fn render(&self, relabel: &dyn Fn(&str) -> String) -> String {
        let mut line = String::new();
        self.subject.render(relabel, &mut line);
        line.push(' ');
        self.predicate.render(relabel, &mut line);
        line.push(' ');
        self.object.render(relabel, &mut line);
        line.push_str(" .");
        line
    }
}

/// Expand a JSON-LD object (with `@context` already validated and removed)
/// into RDF triples
pub fn expand(doc: &Map<String, Value>) -> Result<Vec<Triple>> {
    let mut expander = Expander::default();
    expander.expand_node(doc)?;
    Ok(expander.triples)
}

#[derive(Default)]
struct Expander {
    triples: Vec<Triple>,
    blank_counter: usize,
}

impl Expander {
    fn fresh_blank(&mut self) -> Term {
        let label = format!("b{}", self.blank_counter);
        self.blank_counter += 1;
        Term::Blank(label)
    }

    fn expand_node(&mut self, obj: &Map<String, Value>) -> Result<Term> {
        let subject = match obj.get("id").or_else(|| obj.get("@id")) {
            Some(Value::String(id)) => Term::Iri(id.clone()),
            Some(other) => {
                return Err(ZcapError::Canonicalization(format!(
                    "node id must be a string, got {other}"
                )))
            }
            None => self.fresh_blank(),
        };

        // serde_json maps iterate in sorted key order, so expansion order is
        // independent of the input document's key order
        for (key, value) in obj {
            match key.as_str() {
                "id" | "@id" | "@context" => continue,
                "type" | "@type" => self.expand_types(&subject, value)?,
                term => {
                    let predicate = Term::Iri(context::term_iri(term));
                    self.expand_value(&subject, &predicate, term, value)?;
                }
            }
        }
        Ok(subject)
    }

    fn expand_types(&mut self, subject: &Term, value: &Value) -> Result<()> {
        let tags: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str().ok_or_else(|| {
                        ZcapError::Canonicalization("type tags must be strings".into())
                    })
                })
                .collect::<Result<_>>()?,
            other => {
                return Err(ZcapError::Canonicalization(format!(
                    "type must be a string or list, got {other}"
                )))
            }
        };
        for tag in tags {
            self.triples.push(Triple {
                subject: subject.clone(),
                predicate: Term::Iri(context::RDF_TYPE.to_string()),
                object: Term::Iri(context::type_iri(tag)),
            });
        }
        Ok(())
    }

    fn expand_value(
        &mut self,
        subject: &Term,
        predicate: &Term,
        term: &str,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    self.expand_value(subject, predicate, term, item)?;
                }
                Ok(())
            }
            Value::Object(nested) => {
                let object = self.expand_node(nested)?;
                self.push(subject, predicate, object);
                Ok(())
            }
            Value::String(s) => {
                let object = if context::is_iri_term(term) {
                    Term::Iri(s.clone())
                } else {
                    Term::Literal {
                        value: s.clone(),
                        datatype: context::is_datetime_term(term)
                            .then(|| context::XSD_DATETIME.to_string()),
                    }
                };
                self.push(subject, predicate, object);
                Ok(())
            }
            Value::Bool(b) => {
                self.push(
                    subject,
                    predicate,
                    Term::Literal {
                        value: b.to_string(),
                        datatype: Some(context::XSD_BOOLEAN.to_string()),
                    },
                );
                Ok(())
            }
            Value::Number(n) => {
                let literal = if let Some(i) = n.as_i64() {
                    Term::Literal {
                        value: i.to_string(),
                        datatype: Some(context::XSD_INTEGER.to_string()),
                    }
                } else if let Some(u) = n.as_u64() {
                    Term::Literal {
                        value: u.to_string(),
                        datatype: Some(context::XSD_INTEGER.to_string()),
                    }
                } else {
                    let f = n.as_f64().ok_or_else(|| {
                        ZcapError::Canonicalization(format!("unrepresentable number {n}"))
                    })?;
                    Term::Literal {
                        value: canonical_double(f),
                        datatype: Some(context::XSD_DOUBLE.to_string()),
                    }
                };
                self.push(subject, predicate, literal);
                Ok(())
            }
        }
    }

    fn push(&mut self, subject: &Term, predicate: &Term, object: Term) {
        self.triples.push(Triple {
            subject: subject.clone(),
            predicate: predicate.clone(),
            object,
        });
    }
}

/// Canonical `xsd:double` lexical form: mantissa with a fraction digit,
/// `E`-separated exponent
fn canonical_double(f: f64) -> String {
    let formatted = format!("{f:E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{mantissa}.0E{exponent}")
        }
        _ => formatted,
    }
}
