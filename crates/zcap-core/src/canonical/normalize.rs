//! URDNA2015 blank-node canonicalization
//!
//! Relabels blank nodes deterministically so that isomorphic RDF graphs
//! serialize to identical N-Quads documents: first-degree SHA-256 quad
//! hashes, then an N-degree hash with permutation search for nodes whose
//! first-degree hashes collide, issuing `c14n<n>` labels in hash order.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use super::rdf::{Term, Triple};

/// Canonicalize blank-node labels and serialize the sorted N-Quads document
pub fn normalize(triples: &[Triple]) -> String {
    let normalizer = Normalizer::new(triples);
    let canonical = normalizer.label();

    let mut lines: Vec<String> = triples
        .iter()
        .map(|t| {
            t.render(&|label| {
                canonical
                    .get(label)
                    .cloned()
                    .unwrap_or_else(|| label.to_string())
            })
        })
        .collect();
    lines.sort();
    lines.dedup();

    let mut doc = String::new();
    for line in lines {
        doc.push_str(&line);
        doc.push('\n');
    }
    doc
}

/// Issues identifiers in a stable order, remembering what it has issued
#[derive(Debug, Clone)]
struct Issuer {
    prefix: &'static str,
    counter: usize,
    issued: HashMap<String, String>,
    order: Vec<String>,
}

impl Issuer {
    fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: 0,
            issued: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn issue(&mut self, label: &str) -> String {
        if let Some(existing) = self.issued.get(label) {
            return existing.clone();
        }
        let id = format!("{}{}", self.prefix, self.counter);
        self.counter += 1;
        self.issued.insert(label.to_string(), id.clone());
        self.order.push(label.to_string());
        id
    }

    fn get(&self, label: &str) -> Option<&String> {
        self.issued.get(label)
    }
}

struct Normalizer<'a> {
    triples: &'a [Triple],
    /// blank label -> indices of triples mentioning it
    mentions: HashMap<String, Vec<usize>>,
}

impl<'a> Normalizer<'a> {
    fn new(triples: &'a [Triple]) -> Self {
        let mut mentions: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, triple) in triples.iter().enumerate() {
            for term in [&triple.subject, &triple.object] {
                if let Term::Blank(label) = term {
                    let indices = mentions.entry(label.clone()).or_default();
                    if indices.last() != Some(&i) {
                        indices.push(i);
                    }
                }
            }
        }
        Self { triples, mentions }
    }

    /// Compute the canonical label for every blank node
    fn label(&self) -> HashMap<String, String> {
        let mut canonical = Issuer::new("c14n");

        let mut by_hash: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for label in self.mentions.keys() {
            by_hash
                .entry(self.hash_first_degree(label))
                .or_default()
                .push(label.clone());
        }
        for labels in by_hash.values_mut() {
            labels.sort();
        }

        // Unique first-degree hashes get canonical ids in hash order
        for labels in by_hash.values() {
            if labels.len() == 1 {
                canonical.issue(&labels[0]);
            }
        }

        // Shared hashes are broken by the N-degree exploration
        for labels in by_hash.values() {
            if labels.len() == 1 {
                continue;
            }
            let mut results: Vec<(String, Issuer)> = Vec::new();
            for label in labels {
                if canonical.get(label).is_some() {
                    continue;
                }
                let mut temp = Issuer::new("b");
                temp.issue(label);
                results.push(self.hash_n_degree(label, temp, &canonical));
            }
            results.sort_by(|a, b| a.0.cmp(&b.0));
            for (_, issuer) in results {
                for label in &issuer.order {
                    canonical.issue(label);
                }
            }
        }

        canonical.issued
    }

    fn hash_first_degree(&self, label: &str) -> String {
        let relabel = |l: &str| {
            if l == label {
                "a".to_string()
            } else {
                "z".to_string()
            }
        };
        let mut lines: Vec<String> = self.mentions[label]
            .iter()
            .map(|&i| self.triples[i].render(&relabel))
            .collect();
        lines.sort();
        sha256_hex(lines.join("\n").as_bytes())
    }

    fn hash_related(
        &self,
        related: &str,
        triple: &Triple,
        issuer: &Issuer,
        canonical: &Issuer,
        position: char,
    ) -> String {
        let mut input = String::new();
        input.push(position);
        if let Term::Iri(predicate) = &triple.predicate {
            input.push('<');
            input.push_str(predicate);
            input.push('>');
        }
        if let Some(id) = canonical.get(related) {
            input.push_str("_:");
            input.push_str(id);
        } else if let Some(id) = issuer.get(related) {
            input.push_str("_:");
            input.push_str(id);
        } else {
            input.push_str(&self.hash_first_degree(related));
        }
        sha256_hex(input.as_bytes())
    }

    fn hash_n_degree(
        &self,
        identifier: &str,
        mut issuer: Issuer,
        canonical: &Issuer,
    ) -> (String, Issuer) {
        let mut by_hash: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for &i in &self.mentions[identifier] {
            let triple = &self.triples[i];
            for (term, position) in [(&triple.subject, 's'), (&triple.object, 'o')] {
                if let Term::Blank(related) = term {
                    if related != identifier {
                        let hash = self.hash_related(related, triple, &issuer, canonical, position);
                        by_hash.entry(hash).or_default().push(related.clone());
                    }
                }
            }
        }

        let mut data_to_hash = String::new();
        for (related_hash, related_list) in &by_hash {
            data_to_hash.push_str(related_hash);

            let mut chosen_path = String::new();
            let mut chosen_issuer: Option<Issuer> = None;

            'permutation: for permutation in permutations(related_list) {
                let mut issuer_copy = issuer.clone();
                let mut path = String::new();
                let mut recursion_list: Vec<String> = Vec::new();

                for related in &permutation {
                    if let Some(id) = canonical.get(related) {
                        path.push_str("_:");
                        path.push_str(id);
                    } else {
                        if issuer_copy.get(related).is_none() {
                            recursion_list.push(related.clone());
                        }
                        path.push_str("_:");
                        let id = issuer_copy.issue(related);
                        path.push_str(&id);
                    }
                    if !chosen_path.is_empty()
                        && path.len() >= chosen_path.len()
                        && path > chosen_path
                    {
                        continue 'permutation;
                    }
                }

                for related in &recursion_list {
                    let (hash, next_issuer) =
                        self.hash_n_degree(related, issuer_copy.clone(), canonical);
                    path.push_str("_:");
                    let id = issuer_copy.issue(related);
                    path.push_str(&id);
                    path.push('<');
                    path.push_str(&hash);
                    path.push('>');
                    issuer_copy = next_issuer;
                    if !chosen_path.is_empty()
                        && path.len() >= chosen_path.len()
                        && path > chosen_path
                    {
                        continue 'permutation;
                    }
                }

                if chosen_path.is_empty() || path < chosen_path {
                    chosen_path = path;
                    chosen_issuer = Some(issuer_copy);
                }
            }

            data_to_hash.push_str(&chosen_path);
            if let Some(chosen) = chosen_issuer {
                issuer = chosen;
            }
        }

        (sha256_hex(data_to_hash.as_bytes()), issuer)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn permutations(items: &[String]) -> Vec<Vec<String>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let mut rest: Vec<String> = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, item.clone());
            out.push(tail);
        }
    }
    out
}
