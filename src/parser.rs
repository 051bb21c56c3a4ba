use std::borrow::BorrowMut;

use pest::{error::InputLocation, Parser as _};
use pest_derive::Parser;

use crate::ast::{
    Aggregate, AggregateFunction, Comparison, FieldRef, Identifier, Literal, Operand, Predicate,
    StructuredQuery,
};
use crate::config::{Mode, TranslatorConfig};
use crate::error::ParseError;
use crate::schema::KEY_COLUMNS;

#[derive(Parser)]
#[grammar = "sql.pest"]
struct Parser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;
type Pairs<'a> = pest::iterators::Pairs<'a, Rule>;

/// Parses one query of the supported SQL subset. Identifiers are case-folded;
/// literal values are kept as written.
pub fn parse_query(sql: &str, config: &TranslatorConfig) -> Result<StructuredQuery, ParseError> {
    let query = Parser::parse(Rule::query, sql)
        .map_err(|err| unsupported_construct(sql, &err))?
        .next()
        .unwrap();
    let mut pairs = query.into_inner();

    let select = expect_next_rule(&mut pairs, Rule::select_clause);
    let (selected_fields, distinct, aggregate) = convert_select(select);

    let from = expect_next_rule(&mut pairs, Rule::from_clause);
    let source_entity = expect_identifier(from.into_inner());

    let mut joined_entities = vec![];
    let mut predicates = vec![];
    for pair in pairs {
        match pair.as_rule() {
            Rule::join_clause => {
                let (table, condition) = convert_join(pair)?;
                if config.mode == Mode::Simple {
                    return Err(ParseError::JoinInSimpleMode { table });
                }
                joined_entities.push(table);
                predicates.push(condition);
            }

            Rule::where_clause => predicates.extend(pair.into_inner().map(Predicate::from)),

            Rule::EOI => {}

            _ => unreachable!(),
        }
    }

    Ok(StructuredQuery {
        selected_fields,
        distinct,
        aggregate,
        source_entity,
        joined_entities,
        predicates,
        root_key: config.root_key,
    })
}

fn unsupported_construct(sql: &str, err: &pest::error::Error<Rule>) -> ParseError {
    let position = match err.location {
        InputLocation::Pos(position) => position,
        InputLocation::Span((start, _)) => start,
    };

    let token = sql
        .get(position..)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default();
    let word: String = token
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    let fragment = if !word.is_empty() {
        word
    } else if !token.is_empty() {
        token.to_owned()
    } else {
        "end of input".to_owned()
    };

    ParseError::Unsupported { fragment, position }
}

fn expect_next_rule<'a, P: BorrowMut<Pairs<'a>>>(mut pairs: P, rule: Rule) -> Pair<'a> {
    let pair = pairs.borrow_mut().next().expect("missing pair");
    assert_eq!(pair.as_rule(), rule);
    pair
}

fn convert_identifier(pair: Pair) -> Identifier {
    assert_eq!(pair.as_rule(), Rule::identifier);
    pair.as_str().to_lowercase()
}

fn expect_identifier<'a, P: BorrowMut<Pairs<'a>>>(pairs: P) -> Identifier {
    convert_identifier(expect_next_rule(pairs, Rule::identifier))
}

fn convert_select(pair: Pair) -> (Vec<FieldRef>, bool, Option<Aggregate>) {
    let mut pairs = pair.into_inner();
    let mut first = pairs.next().expect("missing projection");

    if first.as_rule() == Rule::aggregate_call {
        let mut call = first.into_inner();
        let function = AggregateFunction::from(expect_next_rule(&mut call, Rule::aggregate_fn));
        let mut distinct = false;
        let mut fields = vec![];
        for pair in call {
            match pair.as_rule() {
                Rule::star => {}
                Rule::distinct => distinct = true,
                Rule::column_ref => fields.push(FieldRef::from(pair)),
                _ => unreachable!(),
            }
        }
        return (fields, false, Some(Aggregate { function, distinct }));
    }

    let distinct = first.as_rule() == Rule::distinct;
    if distinct {
        first = pairs.next().expect("missing column list");
    }
    assert_eq!(first.as_rule(), Rule::column_list);
    let fields = first.into_inner().map(FieldRef::from).collect();
    (fields, distinct, None)
}

fn convert_join(pair: Pair) -> Result<(Identifier, Predicate), ParseError> {
    let mut pairs = pair.into_inner();
    let table = expect_identifier(&mut pairs);

    let lhs_pair = expect_next_rule(&mut pairs, Rule::column_ref);
    let rhs_pair = expect_next_rule(&mut pairs, Rule::column_ref);
    let condition = format!("{} = {}", lhs_pair.as_str(), rhs_pair.as_str());
    let lhs = FieldRef::from(lhs_pair);
    let rhs = FieldRef::from(rhs_pair);

    // Joins follow the foreign-key convention: both sides name the same key.
    if lhs.column != rhs.column || !KEY_COLUMNS.contains(&lhs.column.as_str()) {
        return Err(ParseError::UnsupportedJoin { condition });
    }

    Ok((
        table,
        Predicate {
            field: lhs,
            op: Comparison::Eq,
            value: Operand::Field(rhs),
        },
    ))
}

impl From<Pair<'_>> for AggregateFunction {
    fn from(pair: Pair<'_>) -> Self {
        assert_eq!(pair.as_rule(), Rule::aggregate_fn);
        match pair.as_str().to_lowercase().as_str() {
            "count" => AggregateFunction::Count,
            "max" => AggregateFunction::Max,
            "min" => AggregateFunction::Min,
            "avg" => AggregateFunction::Avg,
            "sum" => AggregateFunction::Sum,
            _ => unreachable!(),
        }
    }
}

impl From<Pair<'_>> for FieldRef {
    fn from(pair: Pair<'_>) -> Self {
        assert_eq!(pair.as_rule(), Rule::column_ref);
        let pair = pair.into_inner().next().unwrap();

        match pair.as_rule() {
            Rule::qualified_column => {
                let mut pairs = pair.into_inner();
                let table = expect_identifier(&mut pairs);
                let column = expect_identifier(&mut pairs);
                FieldRef::qualified(table, column)
            }

            Rule::bare_column => FieldRef::bare(expect_identifier(pair.into_inner())),

            _ => unreachable!(),
        }
    }
}

impl From<Pair<'_>> for Literal {
    fn from(pair: Pair<'_>) -> Self {
        match pair.as_rule() {
            Rule::string_literal => {
                let interior = pair.into_inner().next().unwrap();
                Literal::String(interior.as_str().to_string())
            }

            Rule::number => Literal::Number(pair.as_str().to_string()),

            _ => unreachable!(),
        }
    }
}

impl From<Pair<'_>> for Comparison {
    fn from(pair: Pair<'_>) -> Self {
        assert_eq!(pair.as_rule(), Rule::comparison);
        match pair.as_str() {
            "=" => Comparison::Eq,
            "!=" | "<>" => Comparison::Ne,
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            _ => unreachable!(),
        }
    }
}

impl From<Pair<'_>> for Predicate {
    fn from(pair: Pair<'_>) -> Self {
        assert_eq!(pair.as_rule(), Rule::condition);
        let mut pairs = pair.into_inner();
        let field = FieldRef::from(expect_next_rule(&mut pairs, Rule::column_ref));
        let op = Comparison::from(expect_next_rule(&mut pairs, Rule::comparison));

        let rhs = pairs.next().unwrap();
        let value = match rhs.as_rule() {
            Rule::column_ref => Operand::Field(FieldRef::from(rhs)),
            _ => Operand::Literal(Literal::from(rhs)),
        };

        Self { field, op, value }
    }
}
