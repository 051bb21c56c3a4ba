//! Answer-set equivalence between a relational query and its graph rewrite.

use chrono::NaiveDateTime;
use hashbag::HashBag;
use log::debug;

use crate::engine::QueryEngine;
use crate::error::ExecutionError;

/// Rendering of SQL `NULL` and unbound graph variables.
pub const NULL_MARKER: &str = "";

/// A cell as returned by either engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    /// Canonical string form used for comparison.
    pub fn canonical(&self) -> String {
        match self {
            Scalar::Null => NULL_MARKER.to_owned(),
            Scalar::Integer(x) => x.to_string(),
            Scalar::Real(x) => canonical_number(*x),
            Scalar::Text(s) => canonical_text(s),
        }
    }
}

fn canonical_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        (x as i64).to_string()
    } else {
        x.to_string()
    }
}

fn canonical_text(s: &str) -> String {
    let unsigned = s.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(s);
    let numeric = !unsigned.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b));
    // Codes such as "0389" are identifiers, not numbers.
    let zero_padded = unsigned.len() > 1
        && unsigned.starts_with('0')
        && unsigned[1..].starts_with(|c: char| c.is_ascii_digit());
    if numeric && !zero_padded {
        if unsigned.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = s.parse::<i64>() {
                return n.to_string();
            }
        } else if let Ok(x) = s.parse::<f64>() {
            return canonical_number(x);
        }
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return datetime.format("%Y-%m-%d %H:%M:%S").to_string();
    }

    s.to_owned()
}

/// Order-independent multiset of canonical result tuples.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnswerSet {
    arity: Option<usize>,
    rows: HashBag<Vec<String>>,
}

impl AnswerSet {
    pub fn from_rows(rows: Vec<Vec<Scalar>>) -> Self {
        let arity = rows.first().map(Vec::len);
        let rows = rows
            .iter()
            .map(|row| row.iter().map(Scalar::canonical).collect::<Vec<String>>())
            .collect();
        Self { arity, rows }
    }

    /// Tuple width, unknown for an empty set.
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row: &[&str]) -> usize {
        let row: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
        self.rows.contains(&row)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Equivalent,
    NotEquivalent,
    /// Both sides returned rows, of different widths.
    ShapeMismatch { relational: usize, graph: usize },
}

impl Verdict {
    pub fn is_equivalent(self) -> bool {
        self == Verdict::Equivalent
    }
}

#[derive(Clone, Debug)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub relational: AnswerSet,
    pub graph: AnswerSet,
}

pub fn compare(relational: AnswerSet, graph: AnswerSet) -> Evaluation {
    let verdict = match (relational.arity, graph.arity) {
        (Some(r), Some(g)) if r != g => Verdict::ShapeMismatch {
            relational: r,
            graph: g,
        },
        _ if relational.rows == graph.rows => Verdict::Equivalent,
        _ => Verdict::NotEquivalent,
    };

    Evaluation {
        verdict,
        relational,
        graph,
    }
}

/// Runs a query pair against its two engines and compares the answers.
pub struct Evaluator<R, G> {
    relational: R,
    graph: G,
}

impl<R: QueryEngine, G: QueryEngine> Evaluator<R, G> {
    pub fn new(relational: R, graph: G) -> Self {
        Self { relational, graph }
    }

    pub fn evaluate(&self, sql: &str, sparql: &str) -> Result<Evaluation, ExecutionError> {
        let relational = AnswerSet::from_rows(self.relational.execute(sql)?);
        let graph = AnswerSet::from_rows(self.graph.execute(sparql)?);
        debug!(
            "relational: {} rows, graph: {} rows",
            relational.len(),
            graph.len()
        );
        Ok(compare(relational, graph))
    }
}
