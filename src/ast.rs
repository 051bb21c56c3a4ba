use std::fmt;

use serde::{Deserialize, Serialize};

pub type Identifier = String;
pub type TableName = Identifier;
pub type ColumnName = Identifier;

/// The identifier convention anchoring a query's primary graph variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKey {
    Subject,
    Admission,
}

impl RootKey {
    pub fn column(self) -> &'static str {
        match self {
            RootKey::Subject => "subject_id",
            RootKey::Admission => "hadm_id",
        }
    }
}

impl std::str::FromStr for RootKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject" | "subject_id" => Ok(RootKey::Subject),
            "admission" | "hadm" | "hadm_id" => Ok(RootKey::Admission),
            other => Err(format!("unknown root key {:?}", other)),
        }
    }
}

/// A column reference, optionally qualified by its table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub table: Option<TableName>,
    pub column: ColumnName,
}

impl FieldRef {
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    pub fn bare(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// Literals keep their raw text; typing and splitting happen at emission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    String(String),
    Number(String),
}

impl Literal {
    pub fn text(&self) -> &str {
        match self {
            Literal::String(s) | Literal::Number(s) => s,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Number(n) => f.write_str(n),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Literal(Literal),
    Field(FieldRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub field: FieldRef,
    pub op: Comparison,
    pub value: Operand,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.field, self.op.symbol())?;
        match &self.value {
            Operand::Literal(literal) => write!(f, "{}", literal),
            Operand::Field(field) => write!(f, "{}", field),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Max,
    Min,
    Avg,
    Sum,
}

impl AggregateFunction {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Sum => "sum",
        }
    }
}

/// Marker applied to the single selected field, or to every row when the
/// selection is empty (`count ( * )`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub distinct: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuredQuery {
    pub selected_fields: Vec<FieldRef>,
    pub distinct: bool,
    pub aggregate: Option<Aggregate>,
    pub source_entity: TableName,
    pub joined_entities: Vec<TableName>,
    /// WHERE conjuncts and join conditions, in source order.
    pub predicates: Vec<Predicate>,
    pub root_key: RootKey,
}

impl StructuredQuery {
    /// Tables in scope: the source first, then joins in order.
    pub fn entities(&self) -> impl Iterator<Item = &TableName> {
        std::iter::once(&self.source_entity).chain(self.joined_entities.iter())
    }
}
