//! Splits compound tokens into atomic units usable as graph names.
//!
//! Two rules apply, in order:
//!
//! 1. A value bundled with its type or unit annotation is split at the
//!    datatype marker: `"65"^^xsd:integer` becomes `"65"` and
//!    `^^xsd:integer`. Whitespace around the marker is dropped.
//! 2. A qualified IRI is split after its last separator into entity and
//!    attribute parts: `</demographic/name>` becomes `</demographic/` and
//!    `name>`.
//!
//! Concatenating the parts gives back the compound form (minus whitespace
//! around the marker), and splitting any part again yields that part alone.
//!
//! The marker is assumed never to occur inside a value. Nothing escapes it.

use crate::error::SplitError;

pub const DATATYPE_MARKER: &str = "^^";
pub const QUALIFIER_SEPARATOR: char = '/';

/// A compound literal split into its value and annotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompoundLiteral {
    pub value: String,
    pub annotation: String,
}

pub fn split_token(token: &str) -> Result<Vec<String>, SplitError> {
    let mut parts = vec![];
    for part in split_marker(token)? {
        parts.extend(split_qualified(&part));
    }
    Ok(parts)
}

pub fn split_all<I, S>(tokens: I) -> Result<Vec<String>, SplitError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parts = vec![];
    for token in tokens {
        parts.extend(split_token(token.as_ref())?);
    }
    Ok(parts)
}

/// Splits a `value^^annotation` literal. Both sides must be non-empty and the
/// marker must occur exactly once.
pub fn split_compound(literal: &str) -> Result<CompoundLiteral, SplitError> {
    let parts = split_marker(literal)?;
    match parts.as_slice() {
        [value, annotation] if !value.starts_with(DATATYPE_MARKER) => Ok(CompoundLiteral {
            value: value.clone(),
            annotation: annotation[DATATYPE_MARKER.len()..].to_owned(),
        }),
        [only] if !only.starts_with(DATATYPE_MARKER) => Err(SplitError::MissingMarker {
            token: literal.to_owned(),
        }),
        _ => Err(SplitError::Malformed {
            token: literal.to_owned(),
        }),
    }
}

fn split_marker(token: &str) -> Result<Vec<String>, SplitError> {
    if !token.contains(DATATYPE_MARKER) {
        return Ok(vec![token.to_owned()]);
    }

    let mut pieces = token.split(DATATYPE_MARKER);
    let mut parts = vec![];

    let head = pieces.next().unwrap_or_default().trim();
    if !head.is_empty() {
        parts.push(head.to_owned());
    }

    for annotation in pieces {
        let annotation = annotation.trim();
        if annotation.is_empty() {
            return Err(SplitError::UnterminatedMarker {
                token: token.to_owned(),
            });
        }
        parts.push(format!("{}{}", DATATYPE_MARKER, annotation));
    }

    Ok(parts)
}

fn split_qualified(token: &str) -> Vec<String> {
    if !(token.starts_with('<') && token.ends_with('>')) {
        return vec![token.to_owned()];
    }

    let inner = &token[1..token.len() - 1];
    match inner.rfind(QUALIFIER_SEPARATOR) {
        // The entity part must name something beyond the leading separator.
        Some(index) if !inner[..index].trim_matches(QUALIFIER_SEPARATOR).is_empty() => {
            let at = index + 2;
            vec![token[..at].to_owned(), token[at..].to_owned()]
        }
        _ => vec![token.to_owned()],
    }
}
