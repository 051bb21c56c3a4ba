use std::collections::{HashMap, HashSet};
use std::fmt;

use itertools::Itertools;
use log::debug;

use crate::ast::{
    AggregateFunction, Comparison, FieldRef, Literal, Operand, Predicate, RootKey,
    StructuredQuery,
};
use crate::config::{Mode, TranslatorConfig};
use crate::error::TranslationError;
use crate::schema::{
    attribute_iri, compound_part_iri, relation_iri, root_class_iri, root_node_iri, Catalog,
    Column, ColumnKind, Table,
};
use crate::splitter::{split_compound, DATATYPE_MARKER};

pub const XSD_PREFIX: &str = "prefix xsd: <http://www.w3.org/2001/XMLSchema#>";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(String);

impl Variable {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XsdType {
    Integer,
    Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Var(Variable),
    /// Relative IRI, resolved against the graph's base.
    Iri(String),
    Literal(String),
    Typed { lexical: String, datatype: XsdType },
}

impl Term {
    fn as_var(&self) -> Option<&Variable> {
        match self {
            Term::Var(var) => Some(var),
            _ => None,
        }
    }

    fn is_typed(&self) -> bool {
        matches!(self, Term::Typed { .. })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(var) => write!(f, "{}", var),
            Term::Iri(iri) => write!(f, "<{}>", iri),
            Term::Literal(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Term::Typed { lexical, datatype } => {
                let datatype = match datatype {
                    XsdType::Integer => "integer",
                    XsdType::Decimal => "decimal",
                };
                write!(f, "\"{}\"{}xsd:{}", lexical, DATATYPE_MARKER, datatype)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verb {
    Type,
    Iri(String),
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Type => f.write_str("a"),
            Verb::Iri(iri) => write!(f, "<{}>", iri),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Variable,
    pub predicate: Verb,
    pub object: Term,
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub lhs: Variable,
    pub op: Comparison,
    pub rhs: Term,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter ( {} {} {} )", self.lhs, self.op.symbol(), self.rhs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Var(Variable),
    Concat { parts: Vec<Term>, alias: Variable },
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Var(var) => write!(f, "{}", var),
            Selection::Concat { parts, alias } => write!(
                f,
                "( concat ( {} ) as {} )",
                parts.iter().join(" , "),
                alias
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateProjection {
    pub function: AggregateFunction,
    pub distinct: bool,
    /// `None` aggregates over every solution (`count ( * )`).
    pub target: Option<Variable>,
    pub alias: Variable,
}

impl fmt::Display for AggregateProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distinct = if self.distinct { "distinct " } else { "" };
        let target = match &self.target {
            Some(var) => var.to_string(),
            None => "*".to_owned(),
        };
        let aggregate = format!("{} ( {}{} )", self.function.name(), distinct, target);

        match (self.function, &self.target) {
            // Over no rows SQL yields NULL where SPARQL yields 0. The failing
            // division leaves the alias unbound instead.
            (AggregateFunction::Avg | AggregateFunction::Sum, Some(var)) => write!(
                f,
                "( if ( count ( {} ) > 0 , {} , 1 / 0 ) as {} )",
                var, aggregate, self.alias
            ),
            _ => write!(f, "( {} as {} )", aggregate, self.alias),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphPattern {
    pub distinct: bool,
    pub projection: Vec<Selection>,
    pub aggregate: Option<AggregateProjection>,
    pub triples: Vec<TriplePattern>,
    pub filters: Vec<Filter>,
}

impl GraphPattern {
    pub fn to_sparql(&self) -> String {
        let mut s = String::new();
        if self.uses_xsd() {
            s.push_str(XSD_PREFIX);
            s.push(' ');
        }

        s.push_str("select ");
        if self.distinct {
            s.push_str("distinct ");
        }
        match &self.aggregate {
            Some(aggregate) => s.push_str(&aggregate.to_string()),
            None => s.push_str(&self.projection.iter().join(" ")),
        }

        s.push_str(" where { ");
        for triple in &self.triples {
            s.push_str(&triple.to_string());
            s.push(' ');
        }
        for filter in &self.filters {
            s.push_str(&filter.to_string());
            s.push(' ');
        }
        s.push('}');

        s
    }

    /// Every variable a filter or the projection reads must be bound by a
    /// triple pattern.
    pub fn check_bound(&self) -> Result<(), TranslationError> {
        let bound: HashSet<&Variable> = self
            .triples
            .iter()
            .flat_map(|triple| std::iter::once(&triple.subject).chain(triple.object.as_var()))
            .collect();

        let filtered = self
            .filters
            .iter()
            .flat_map(|filter| std::iter::once(&filter.lhs).chain(filter.rhs.as_var()));
        let projected = self.projection.iter().flat_map(|selection| match selection {
            Selection::Var(var) => vec![var],
            Selection::Concat { parts, .. } => parts.iter().filter_map(Term::as_var).collect(),
        });
        let aggregated = self
            .aggregate
            .iter()
            .filter_map(|aggregate| aggregate.target.as_ref());

        match filtered
            .chain(projected)
            .chain(aggregated)
            .find(|var| !bound.contains(var))
        {
            Some(var) => Err(TranslationError::DanglingVariable {
                variable: var.name().to_owned(),
            }),
            None => Ok(()),
        }
    }

    fn uses_xsd(&self) -> bool {
        self.filters.iter().any(|filter| filter.rhs.is_typed())
            || self.triples.iter().any(|triple| triple.object.is_typed())
    }
}

/// Compiles structured queries into graph patterns over the clinical graph.
#[derive(Clone, Debug)]
pub struct Emitter<'c> {
    catalog: &'c Catalog,
    config: TranslatorConfig,
}

impl<'c> Emitter<'c> {
    pub fn new(catalog: &'c Catalog, config: TranslatorConfig) -> Self {
        Self { catalog, config }
    }

    pub fn emit(&self, query: &StructuredQuery) -> Result<GraphPattern, TranslationError> {
        let pattern = PatternBuilder::compile(self.catalog, self.config.mode, query)?;
        debug!("emitted {} triple patterns", pattern.triples.len());
        Ok(pattern)
    }
}

/// Hands out variable names for one translation: the first request for a
/// base name gets it verbatim, later ones get `_1`, `_2`, ...
#[derive(Clone, Debug, Default)]
struct VarAllocator {
    issued: HashSet<String>,
}

impl VarAllocator {
    fn allocate(&mut self, base: &str) -> Variable {
        let mut name = base.to_owned();
        let mut occurrence = 0;
        while !self.issued.insert(name.clone()) {
            occurrence += 1;
            name = format!("{}_{}", base, occurrence);
        }
        Variable(name)
    }
}

#[derive(Clone, Debug)]
struct EntityScope<'c> {
    table: &'c Table,
    var: Variable,
}

#[derive(Clone, Copy, Debug)]
struct ResolvedColumn<'c> {
    scope: usize,
    table: &'c Table,
    column: &'c Column,
}

impl ResolvedColumn<'_> {
    fn qualified_name(&self) -> String {
        format!("{}.{}", self.table.name, self.column.name)
    }
}

#[derive(Debug)]
struct PatternBuilder<'c> {
    catalog: &'c Catalog,
    mode: Mode,
    root_key: RootKey,
    vars: VarAllocator,
    root: Variable,
    scopes: Vec<EntityScope<'c>>,
    /// Edge IRI, relative to its entity, to the variable holding its value.
    bindings: HashMap<(usize, String), Variable>,
    triples: Vec<TriplePattern>,
    filters: Vec<Filter>,
}

impl<'c> PatternBuilder<'c> {
    fn compile(
        catalog: &'c Catalog,
        mode: Mode,
        query: &StructuredQuery,
    ) -> Result<GraphPattern, TranslationError> {
        let mut vars = VarAllocator::default();
        let root = vars.allocate(query.root_key.column());

        let mut zelf = Self {
            catalog,
            mode,
            root_key: query.root_key,
            vars,
            root,
            scopes: vec![],
            bindings: HashMap::new(),
            triples: vec![],
            filters: vec![],
        };

        zelf.open_scopes(query)?;

        let mut projection = vec![];
        let mut aggregate = None;
        match query.aggregate {
            Some(marker) => {
                let target = match query.selected_fields.first() {
                    Some(field) => Some(zelf.aggregate_target(marker.function, marker.distinct, field)?),
                    None => None,
                };
                aggregate = Some(AggregateProjection {
                    function: marker.function,
                    distinct: marker.distinct,
                    target,
                    alias: zelf.vars.allocate(marker.function.name()),
                });
            }

            None => {
                for field in &query.selected_fields {
                    projection.push(zelf.select(field)?);
                }
            }
        }

        for predicate in &query.predicates {
            zelf.apply_predicate(predicate)?;
        }

        zelf.anchor_root();

        let pattern = GraphPattern {
            distinct: query.distinct,
            projection,
            aggregate,
            triples: zelf.triples,
            filters: zelf.filters,
        };
        pattern.check_bound()?;
        Ok(pattern)
    }

    fn open_scopes(&mut self, query: &StructuredQuery) -> Result<(), TranslationError> {
        for (index, name) in query.entities().enumerate() {
            let table = self
                .catalog
                .table(name)
                .ok_or_else(|| TranslationError::UnresolvedEntity {
                    table: name.clone(),
                })?;

            if self.mode == Mode::Simple && index > 0 {
                return Err(TranslationError::JoinInSimpleMode {
                    table: name.clone(),
                });
            }
            if self.scopes.iter().any(|scope| scope.table.name == table.name) {
                continue;
            }

            let var = if table.rows_are_roots(self.root_key) {
                self.root.clone()
            } else {
                let var = self.vars.allocate(table.name);
                self.triples.push(TriplePattern {
                    subject: self.root.clone(),
                    predicate: Verb::Iri(relation_iri(table.name)),
                    object: Term::Var(var.clone()),
                });
                var
            };

            self.scopes.push(EntityScope { table, var });
        }

        Ok(())
    }

    fn resolve(&self, field: &FieldRef) -> Result<ResolvedColumn<'c>, TranslationError> {
        let unresolved = || TranslationError::UnresolvedColumn {
            column: field.to_string(),
        };

        let scope = match &field.table {
            Some(name) => self
                .scopes
                .iter()
                .position(|scope| scope.table.name == name.as_str())
                .ok_or_else(|| match (self.catalog.table(name), self.mode) {
                    (Some(_), Mode::Simple) => TranslationError::JoinInSimpleMode {
                        table: name.clone(),
                    },
                    _ => TranslationError::UnresolvedEntity {
                        table: name.clone(),
                    },
                })?,

            None => {
                let mut candidates = self
                    .scopes
                    .iter()
                    .positions(|scope| scope.table.column(&field.column).is_some());
                let scope = candidates.next().ok_or_else(unresolved)?;
                if candidates.next().is_some() {
                    return Err(TranslationError::AmbiguousColumn {
                        column: field.column.clone(),
                    });
                }
                scope
            }
        };

        let table = self.scopes[scope].table;
        let column = table.column(&field.column).ok_or_else(unresolved)?;
        Ok(ResolvedColumn {
            scope,
            table,
            column,
        })
    }

    fn is_root_key(&self, column: &ResolvedColumn) -> bool {
        column.column.name == self.root_key.column()
    }

    /// Variable already holding `edge` of the entity in `scope`, if any.
    fn bound(&self, scope: usize, edge: &str) -> Option<Variable> {
        self.bindings.get(&(scope, edge.to_owned())).cloned()
    }

    fn bind_edge_to(&mut self, scope: usize, edge: String, var: Variable) {
        self.triples.push(TriplePattern {
            subject: self.scopes[scope].var.clone(),
            predicate: Verb::Iri(edge.clone()),
            object: Term::Var(var.clone()),
        });
        self.bindings.insert((scope, edge), var);
    }

    fn bind_edge(&mut self, scope: usize, edge: String, base_name: &str) -> Variable {
        if let Some(var) = self.bound(scope, &edge) {
            return var;
        }
        let var = self.vars.allocate(base_name);
        self.bind_edge_to(scope, edge, var.clone());
        var
    }

    fn bound_column(&self, column: &ResolvedColumn) -> Option<Variable> {
        if self.is_root_key(column) {
            return Some(self.root.clone());
        }
        self.bound(
            column.scope,
            &attribute_iri(column.table.name, column.column.name),
        )
    }

    fn bind_column(&mut self, column: &ResolvedColumn) -> Variable {
        if self.is_root_key(column) {
            return self.root.clone();
        }
        let edge = attribute_iri(column.table.name, column.column.name);
        self.bind_edge(column.scope, edge, column.column.name)
    }

    fn bind_part(&mut self, column: &ResolvedColumn, part: &str) -> Variable {
        let edge = compound_part_iri(column.table.name, column.column.name, part);
        let base_name = format!("{}_{}", column.column.name, part);
        self.bind_edge(column.scope, edge, &base_name)
    }

    fn select(&mut self, field: &FieldRef) -> Result<Selection, TranslationError> {
        let column = self.resolve(field)?;
        if column.column.kind != ColumnKind::Compound {
            return Ok(Selection::Var(self.bind_column(&column)));
        }

        let value = self.bind_part(&column, "value");
        let unit = self.bind_part(&column, "unit");
        Ok(Selection::Concat {
            parts: vec![
                Term::Var(value),
                Term::Literal(DATATYPE_MARKER.to_owned()),
                Term::Var(unit),
            ],
            alias: self.vars.allocate(column.column.name),
        })
    }

    fn aggregate_target(
        &mut self,
        function: AggregateFunction,
        distinct: bool,
        field: &FieldRef,
    ) -> Result<Variable, TranslationError> {
        let column = self.resolve(field)?;
        let unsupported = || TranslationError::UnsupportedAggregate {
            function: function.name().to_owned(),
            column: column.qualified_name(),
        };

        match (function, column.column.kind) {
            // A compound value exists exactly when its value part does.
            (AggregateFunction::Count, ColumnKind::Compound) if !distinct => {
                Ok(self.bind_part(&column, "value"))
            }
            (_, ColumnKind::Compound) => Err(unsupported()),
            (AggregateFunction::Avg | AggregateFunction::Sum, kind) if !kind.is_numeric() => {
                Err(unsupported())
            }
            _ => Ok(self.bind_column(&column)),
        }
    }

    fn apply_predicate(&mut self, predicate: &Predicate) -> Result<(), TranslationError> {
        let lhs = self.resolve(&predicate.field)?;
        match &predicate.value {
            Operand::Field(field) => {
                let rhs = self.resolve(field)?;
                if lhs.column.kind == ColumnKind::Compound || rhs.column.kind == ColumnKind::Compound
                {
                    return Err(TranslationError::UnsupportedPredicate {
                        fragment: predicate.to_string(),
                    });
                }

                if predicate.op == Comparison::Eq {
                    self.unify(&lhs, &rhs);
                } else {
                    let lhs = self.bind_column(&lhs);
                    let rhs = self.bind_column(&rhs);
                    self.filters.push(Filter {
                        lhs,
                        op: predicate.op,
                        rhs: Term::Var(rhs),
                    });
                }
                Ok(())
            }

            Operand::Literal(literal) => self.apply_literal(&lhs, predicate, literal),
        }
    }

    /// Makes two columns share one variable, so equal values join.
    fn unify(&mut self, lhs: &ResolvedColumn, rhs: &ResolvedColumn) {
        let rhs_edge = attribute_iri(rhs.table.name, rhs.column.name);
        let lhs_edge = attribute_iri(lhs.table.name, lhs.column.name);

        match (self.bound_column(lhs), self.bound_column(rhs)) {
            (Some(a), Some(b)) if a == b => {}
            (Some(a), Some(b)) => self.filters.push(Filter {
                lhs: a,
                op: Comparison::Eq,
                rhs: Term::Var(b),
            }),
            (Some(a), None) => self.bind_edge_to(rhs.scope, rhs_edge, a),
            (None, Some(b)) => self.bind_edge_to(lhs.scope, lhs_edge, b),
            (None, None) => {
                let var = self.bind_column(lhs);
                self.bind_edge_to(rhs.scope, rhs_edge, var);
            }
        }
    }

    fn apply_literal(
        &mut self,
        column: &ResolvedColumn,
        predicate: &Predicate,
        literal: &Literal,
    ) -> Result<(), TranslationError> {
        let unsupported = || TranslationError::UnsupportedPredicate {
            fragment: predicate.to_string(),
        };
        let op = predicate.op;

        if self.is_root_key(column) {
            if !matches!(op, Comparison::Eq | Comparison::Ne) {
                return Err(unsupported());
            }
            if !is_iri_segment(literal.text()) {
                return Err(TranslationError::InvalidLiteral {
                    column: column.qualified_name(),
                    literal: literal.text().to_owned(),
                });
            }
            self.filters.push(Filter {
                lhs: self.root.clone(),
                op,
                rhs: Term::Iri(root_node_iri(self.root_key, literal.text())),
            });
            return Ok(());
        }

        match column.column.kind {
            ColumnKind::Compound => {
                if op != Comparison::Eq {
                    return Err(unsupported());
                }
                let compound = split_compound(literal.text()).map_err(|source| {
                    TranslationError::MalformedLiteral {
                        column: column.qualified_name(),
                        source,
                    }
                })?;
                self.match_edge(column, "value", Term::Literal(compound.value));
                self.match_edge(column, "unit", Term::Literal(compound.annotation));
            }

            ColumnKind::Text => {
                let value = Term::Literal(literal.text().to_owned());
                if op == Comparison::Eq && self.bound_column(column).is_none() {
                    let edge = attribute_iri(column.table.name, column.column.name);
                    self.triples.push(TriplePattern {
                        subject: self.scopes[column.scope].var.clone(),
                        predicate: Verb::Iri(edge),
                        object: value,
                    });
                } else {
                    let lhs = self.bind_column(column);
                    self.filters.push(Filter { lhs, op, rhs: value });
                }
            }

            ColumnKind::Integer | ColumnKind::Decimal => {
                let value =
                    typed_literal(literal.text()).ok_or_else(|| TranslationError::InvalidLiteral {
                        column: column.qualified_name(),
                        literal: literal.text().to_owned(),
                    })?;
                let lhs = self.bind_column(column);
                self.filters.push(Filter { lhs, op, rhs: value });
            }
        }

        Ok(())
    }

    /// Requires one part of a compound column to equal `value`.
    fn match_edge(&mut self, column: &ResolvedColumn, part: &str, value: Term) {
        let edge = compound_part_iri(column.table.name, column.column.name, part);
        match self.bound(column.scope, &edge) {
            Some(lhs) => self.filters.push(Filter {
                lhs,
                op: Comparison::Eq,
                rhs: value,
            }),
            None => self.triples.push(TriplePattern {
                subject: self.scopes[column.scope].var.clone(),
                predicate: Verb::Iri(edge),
                object: value,
            }),
        }
    }

    /// Types the root variable when no triple pattern mentions it.
    fn anchor_root(&mut self) {
        let root = &self.root;
        let mentioned = self
            .triples
            .iter()
            .any(|triple| &triple.subject == root || triple.object.as_var() == Some(root));
        if !mentioned {
            self.triples.insert(
                0,
                TriplePattern {
                    subject: self.root.clone(),
                    predicate: Verb::Type,
                    object: Term::Iri(root_class_iri(self.root_key)),
                },
            );
        }
    }
}

/// Key values become the last segment of a node IRI.
fn is_iri_segment(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn typed_literal(text: &str) -> Option<Term> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    let datatype = match digits.split_once('.') {
        None if is_digits(digits) => XsdType::Integer,
        Some((int, frac)) if is_digits(int) && is_digits(frac) => XsdType::Decimal,
        _ => return None,
    };
    Some(Term::Typed {
        lexical: text.to_owned(),
        datatype,
    })
}
