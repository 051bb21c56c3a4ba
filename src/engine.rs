//! Backing engines the evaluator executes queries against.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::info;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::Term;
use oxigraph::sparql::{Query, QueryResults};
use oxigraph::store::Store;
use rusqlite::{types::ValueRef, Connection, OpenFlags};

use crate::error::ExecutionError;
use crate::evaluator::Scalar;

/// Base every relative IRI in the graph and in emitted queries resolves to.
pub const GRAPH_BASE_IRI: &str = "http://mimic.kg/";

pub trait QueryEngine {
    /// Runs `query`, returning rows as ordered tuples of scalars.
    fn execute(&self, query: &str) -> Result<Vec<Vec<Scalar>>, ExecutionError>;
}

/// The relational store, backed by SQLite.
pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(ExecutionError::relational)?;
        info!("opened relational store {}", path.display());
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

impl QueryEngine for SqliteEngine {
    fn execute(&self, query: &str) -> Result<Vec<Vec<Scalar>>, ExecutionError> {
        let mut stmt = self
            .conn
            .prepare_cached(query)
            .map_err(ExecutionError::relational)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([]).map_err(ExecutionError::relational)?;

        let mut result = vec![];
        while let Some(row) = rows.next().map_err(ExecutionError::relational)? {
            let row = (0..column_count)
                .map(|i| {
                    let value = row.get_ref(i).map_err(ExecutionError::relational)?;
                    Ok(match value {
                        ValueRef::Null => Scalar::Null,
                        ValueRef::Integer(x) => Scalar::Integer(x),
                        ValueRef::Real(x) => Scalar::Real(x),
                        ValueRef::Text(s) | ValueRef::Blob(s) => {
                            Scalar::Text(String::from_utf8_lossy(s).into_owned())
                        }
                    })
                })
                .collect::<Result<Vec<_>, ExecutionError>>()?;
            result.push(row);
        }

        Ok(result)
    }
}

/// The knowledge graph, held in an in-memory RDF store.
pub struct RdfEngine {
    store: Store,
}

impl RdfEngine {
    pub fn new() -> Result<Self, ExecutionError> {
        let store = Store::new().map_err(ExecutionError::graph)?;
        Ok(Self { store })
    }

    /// Loads a graph file; the format follows the extension (`ttl`, `nt`,
    /// `rdf`, `xml`, ...).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext {
                "xml" => Some(RdfFormat::RdfXml),
                ext => RdfFormat::from_extension(ext),
            })
            .ok_or_else(|| {
                ExecutionError::graph(format!("unknown graph format for {}", path.display()))
            })?;
        let file = File::open(path).map_err(ExecutionError::graph)?;

        let engine = Self::new()?;
        engine.load(format, BufReader::new(file))?;
        info!("loaded knowledge graph {}", path.display());
        Ok(engine)
    }

    pub fn load(&self, format: RdfFormat, read: impl Read) -> Result<(), ExecutionError> {
        let parser = RdfParser::from_format(format)
            .with_base_iri(GRAPH_BASE_IRI)
            .map_err(ExecutionError::graph)?;
        self.store
            .load_from_reader(parser, read)
            .map_err(ExecutionError::graph)
    }

    pub fn len(&self) -> Result<usize, ExecutionError> {
        self.store.len().map_err(ExecutionError::graph)
    }

    pub fn is_empty(&self) -> Result<bool, ExecutionError> {
        self.store.is_empty().map_err(ExecutionError::graph)
    }
}

impl QueryEngine for RdfEngine {
    fn execute(&self, query: &str) -> Result<Vec<Vec<Scalar>>, ExecutionError> {
        let query = Query::parse(query, Some(GRAPH_BASE_IRI)).map_err(ExecutionError::graph)?;
        let solutions = match self.store.query(query).map_err(ExecutionError::graph)? {
            QueryResults::Solutions(solutions) => solutions,
            _ => return Err(ExecutionError::graph("expected a select query")),
        };

        let width = solutions.variables().len();
        let mut result = vec![];
        for solution in solutions {
            let solution = solution.map_err(ExecutionError::graph)?;
            let row = (0..width)
                .map(|i| solution.get(i).map_or(Scalar::Null, plain_scalar))
                .collect();
            result.push(row);
        }

        Ok(result)
    }
}

/// Entity nodes reduce to their identifier, the IRI's last path segment.
fn plain_scalar(term: &Term) -> Scalar {
    match term {
        Term::Literal(literal) => Scalar::Text(literal.value().to_owned()),
        Term::NamedNode(node) => {
            let iri = node.as_str();
            Scalar::Text(iri.rsplit('/').next().unwrap_or(iri).to_owned())
        }
        other => Scalar::Text(other.to_string()),
    }
}
