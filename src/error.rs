//! Error types for the translation pipeline.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Unsupported or malformed SQL.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unsupported construct {fragment:?} at position {position}")]
    Unsupported { fragment: String, position: usize },

    #[error("joins are not supported in simple mode (joining {table:?})")]
    JoinInSimpleMode { table: String },

    #[error("unsupported join condition {condition:?}: both sides must name the same key column")]
    UnsupportedJoin { condition: String },
}

/// A compound token that cannot be split into addressable parts.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("unterminated datatype marker in {token:?}")]
    UnterminatedMarker { token: String },

    #[error("missing datatype marker in compound literal {token:?}")]
    MissingMarker { token: String },

    #[error("malformed compound literal {token:?}")]
    Malformed { token: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("unknown table {table:?}")]
    UnresolvedEntity { table: String },

    #[error("unknown column {column:?}")]
    UnresolvedColumn { column: String },

    #[error("ambiguous column {column:?}")]
    AmbiguousColumn { column: String },

    #[error("table {table:?} is not addressable in simple mode")]
    JoinInSimpleMode { table: String },

    #[error("unsupported aggregate {function}({column})")]
    UnsupportedAggregate { function: String, column: String },

    #[error("unsupported predicate {fragment:?}")]
    UnsupportedPredicate { fragment: String },

    #[error("malformed literal for {column}: {source}")]
    MalformedLiteral {
        column: String,
        #[source]
        source: SplitError,
    },

    #[error("literal {literal:?} is not valid for column {column}")]
    InvalidLiteral { column: String, literal: String },

    #[error("variable ?{variable} is not bound by any triple pattern")]
    DanglingVariable { variable: String },
}

/// A dataset example without the field the query is read from.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("example has no string field {field:?}")]
pub struct RecordError {
    pub field: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EngineKind {
    Relational,
    Graph,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Relational => f.write_str("relational"),
            EngineKind::Graph => f.write_str("graph"),
        }
    }
}

/// A backing engine rejected a query or failed while running it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{engine} engine: {message}")]
pub struct ExecutionError {
    pub engine: EngineKind,
    pub message: String,
}

impl ExecutionError {
    pub fn relational(err: impl fmt::Display) -> Self {
        Self {
            engine: EngineKind::Relational,
            message: err.to_string(),
        }
    }

    pub fn graph(err: impl fmt::Display) -> Self {
        Self {
            engine: EngineKind::Graph,
            message: err.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorKind {
    Record,
    Parse,
    Split,
    Translation,
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Record => "record",
            ErrorKind::Parse => "parse",
            ErrorKind::Split => "split",
            ErrorKind::Translation => "translation",
            ErrorKind::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// Any per-example failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("split error: {0}")]
    Split(#[from] SplitError),

    #[error("translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Record(_) => ErrorKind::Record,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Split(_) => ErrorKind::Split,
            Error::Translation(_) => ErrorKind::Translation,
            Error::Execution(_) => ErrorKind::Execution,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
