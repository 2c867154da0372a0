//! Sort token resolution.
//!
//! A token selects an entry of the resource's sort allow-list. When ranking is
//! active, relevance leads for the default/`relevance` token and follows the
//! primary terms of any explicitly chosen key. Without ranking, `relevance`
//! and unknown tokens resolve to the resource's fallback ordering. The
//! fallback always closes the list so equal keys page deterministically.

use super::descriptor::{OrderTerm, ResourceDescriptor};

/// Token that asks for relevance ordering.
pub const RELEVANCE: &str = "relevance";

/// One resolved ordering clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderClause {
    /// A descriptor-provided term.
    Term(OrderTerm),
    /// Relevance score, descending.
    Relevance,
}

/// Resolve a sort token against a descriptor.
pub fn resolve(descriptor: &ResourceDescriptor, token: &str, ranked: bool) -> Vec<OrderClause> {
    let token = token.trim().to_ascii_lowercase();

    let key = match token.as_str() {
        "" | RELEVANCE => None,
        other => {
            let key = descriptor.sort_key(other);
            if key.is_none() {
                tracing::debug!(
                    resource = descriptor.name,
                    token = other,
                    "unknown sort token, using default ordering"
                );
            }
            key
        }
    };

    let mut clauses = Vec::new();
    match key {
        Some(key) => {
            clauses.extend(key.primary.iter().copied().map(OrderClause::Term));
            if ranked {
                clauses.push(OrderClause::Relevance);
            }
            clauses.extend(key.tiebreak.iter().copied().map(OrderClause::Term));
            clauses.extend(descriptor.fallback.iter().copied().map(OrderClause::Term));
        }
        None => {
            if ranked {
                clauses.push(OrderClause::Relevance);
            } else if token == RELEVANCE {
                tracing::debug!(
                    resource = descriptor.name,
                    "relevance requested without ranking, using default ordering"
                );
            }
            clauses.extend(descriptor.fallback.iter().copied().map(OrderClause::Term));
        }
    }

    dedup_terms(clauses)
}

/// Drop repeated terms on the same field; the first occurrence wins.
fn dedup_terms(clauses: Vec<OrderClause>) -> Vec<OrderClause> {
    let mut out: Vec<OrderClause> = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let seen = out.iter().any(|existing| match (existing, &clause) {
            (OrderClause::Relevance, OrderClause::Relevance) => true,
            (OrderClause::Term(a), OrderClause::Term(b)) => a.field == b.field,
            _ => false,
        });
        if !seen {
            out.push(clause);
        }
    }
    out
}
