//! Deterministic re-tokenization of emitted graph queries.

use serde::{Deserialize, Serialize};

use crate::error::SplitError;
use crate::splitter::split_all;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    /// Whitespace-collapsed, original case. This is what gets executed.
    pub text: String,
    /// Lower-cased `text`, as stored in the corpus.
    pub stored: String,
    pub tokens: Vec<String>,
}

pub fn normalize(query: &str) -> Result<NormalizedQuery, SplitError> {
    let text = collapse_whitespace(query);
    let stored = text.to_lowercase();
    let tokens = split_all(stored.split(' ').filter(|token| !token.is_empty()))?;
    Ok(NormalizedQuery {
        text,
        stored,
        tokens,
    })
}

/// Collapses whitespace runs to one space, except inside `"..."` literals.
fn collapse_whitespace(query: &str) -> String {
    let mut text = String::with_capacity(query.len());
    let mut in_literal = false;
    let mut escaped = false;
    let mut pending_space = false;

    for c in query.chars() {
        if in_literal {
            text.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_literal = false,
                _ => {}
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = !text.is_empty();
            continue;
        }
        if pending_space {
            text.push(' ');
            pending_space = false;
        }
        in_literal = c == '"';
        text.push(c);
    }

    text
}
