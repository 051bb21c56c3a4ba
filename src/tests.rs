use std::fs;

use oxigraph::io::RdfFormat;
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;

use crate::ast::RootKey;
use crate::config::{CorpusConfig, TranslatorConfig};
use crate::corpus::CorpusDriver;
use crate::engine::{QueryEngine, RdfEngine, SqliteEngine};
use crate::error::ErrorKind;
use crate::evaluator::{AnswerSet, Evaluator, Scalar, Verdict};
use crate::schema::{
    attribute_iri, compound_part_iri, relation_iri, root_class_iri, root_node_iri, Catalog,
    ColumnKind,
};
use crate::splitter::split_compound;
use crate::translator::Translator;

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

type Row = (&'static str, &'static [(&'static str, &'static str)]);

const ROWS: &[Row] = &[
    ("demographic", &[
        ("subject_id", "10006"), ("hadm_id", "142345"), ("name", "John Doe"), ("gender", "m"),
        ("age", "70"), ("marital_status", "married"), ("days_stay", "8"), ("expire_flag", "0"),
    ]),
    ("demographic", &[
        ("subject_id", "10011"), ("hadm_id", "105331"), ("name", "Jane Roe"), ("gender", "f"),
        ("age", "36"), ("marital_status", "single"), ("days_stay", "13"), ("expire_flag", "1"),
        ("dod_year", "2126.0"),
    ]),
    ("demographic", &[
        ("subject_id", "10013"), ("hadm_id", "165520"), ("name", "Mary Major"), ("gender", "f"),
        ("age", "87"), ("marital_status", "widowed"), ("days_stay", "2"), ("expire_flag", "1"),
        ("dod_year", "2125.0"),
    ]),
    ("demographic", &[
        ("subject_id", "10017"), ("hadm_id", "199207"), ("name", "Richard Miles"), ("gender", "m"),
        ("age", "65"), ("marital_status", "single"), ("days_stay", "10"), ("expire_flag", "0"),
    ]),
    ("demographic", &[
        ("subject_id", "10006"), ("hadm_id", "112213"), ("name", "John Doe"), ("gender", "m"),
        ("age", "71"), ("marital_status", "married"), ("days_stay", "3"), ("expire_flag", "0"),
    ]),
    ("diagnoses", &[
        ("subject_id", "10006"), ("hadm_id", "142345"), ("icd9_code", "4019"),
        ("short_title", "hypertension nos"), ("long_title", "unspecified essential hypertension"),
    ]),
    ("diagnoses", &[
        ("subject_id", "10006"), ("hadm_id", "142345"), ("icd9_code", "v5861"),
        ("short_title", "long-term use anticoagul"),
        ("long_title", "long-term (current) use of anticoagulants"),
    ]),
    ("diagnoses", &[
        ("subject_id", "10011"), ("hadm_id", "105331"), ("icd9_code", "4019"),
        ("short_title", "hypertension nos"), ("long_title", "unspecified essential hypertension"),
    ]),
    ("diagnoses", &[
        ("subject_id", "10013"), ("hadm_id", "165520"), ("icd9_code", "5849"),
        ("short_title", "acute kidney failure nos"), ("long_title", "acute kidney failure, unspecified"),
    ]),
    ("procedures", &[
        ("subject_id", "10006"), ("hadm_id", "142345"), ("icd9_code", "9671"),
        ("short_title", "cont inv mec ven <96 hrs"),
        ("long_title", "continuous invasive mechanical ventilation for less than 96 consecutive hours"),
    ]),
    ("procedures", &[
        ("subject_id", "10017"), ("hadm_id", "199207"), ("icd9_code", "3995"),
        ("short_title", "hemodialysis"), ("long_title", "hemodialysis"),
    ]),
    ("prescriptions", &[
        ("subject_id", "10011"), ("hadm_id", "105331"), ("drug_type", "main"),
        ("drug", "heparin"), ("route", "iv"),
    ]),
    ("prescriptions", &[
        ("subject_id", "10013"), ("hadm_id", "165520"), ("drug_type", "main"),
        ("drug", "furosemide"), ("route", "po"),
    ]),
    ("lab", &[
        ("subject_id", "10006"), ("hadm_id", "142345"), ("itemid", "51248"),
        ("charttime", "2164-10-23 21:10:00"), ("value_unit", "7.4^^mg/dl"), ("label", "mch"),
        ("fluid", "blood"), ("category", "hematology"),
    ]),
    ("lab", &[
        ("subject_id", "10011"), ("hadm_id", "105331"), ("itemid", "50912"),
        ("charttime", "2126-08-14 22:32:00"), ("flag", "abnormal"), ("value_unit", "1.2^^mg/dl"),
        ("label", "creatinine"), ("fluid", "blood"), ("category", "chemistry"),
    ]),
    ("lab", &[
        ("subject_id", "10017"), ("hadm_id", "199207"), ("itemid", "50912"),
        ("charttime", "2130-02-14 08:30:00"), ("flag", "abnormal"), ("value_unit", "3.5^^mg/dl"),
        ("label", "creatinine"), ("fluid", "blood"), ("category", "chemistry"),
    ]),
];

fn column_kind(catalog: &Catalog, table: &str, column: &str) -> ColumnKind {
    catalog.table(table).unwrap().column(column).unwrap().kind
}

fn setup_db() -> Connection {
    let catalog = Catalog::mimic();
    let conn = Connection::open_in_memory().unwrap();

    for table in catalog.tables() {
        let columns = table.columns.iter().map(|column| {
            let ty = match column.kind {
                ColumnKind::Integer => "INTEGER",
                ColumnKind::Decimal => "REAL",
                ColumnKind::Text | ColumnKind::Compound => "TEXT",
            };
            format!("{} {}", column.name, ty)
        });
        conn.execute_batch(&format!(
            "CREATE TABLE {}({});",
            table.name,
            itertools::join(columns, ", ")
        ))
        .unwrap();
    }

    for (table, cells) in ROWS {
        let values = cells.iter().map(|&(column, value)| match column_kind(&catalog, table, column) {
            ColumnKind::Integer => Value::Integer(value.parse().unwrap()),
            ColumnKind::Decimal => Value::Real(value.parse().unwrap()),
            ColumnKind::Text | ColumnKind::Compound => Value::Text(value.to_owned()),
        });
        let sql = format!(
            "INSERT INTO {}({}) VALUES ({})",
            table,
            itertools::join(cells.iter().map(|(column, _)| column), ", "),
            itertools::join(cells.iter().map(|_| "?"), ", ")
        );
        conn.execute(&sql, params_from_iter(values)).unwrap();
    }

    conn
}

fn iri(path: &str) -> String {
    format!("<{}>", path)
}

/// The same rows as `setup_db`, laid out as the knowledge graph for `config`.
fn knowledge_graph(config: TranslatorConfig) -> String {
    let catalog = Catalog::mimic();
    let root_column = config.root_key.column();
    let mut turtle = String::new();

    for (index, (table, cells)) in ROWS.iter().enumerate() {
        let root_value = cells
            .iter()
            .find(|(column, _)| *column == root_column)
            .map(|(_, value)| *value)
            .unwrap();
        let root = iri(&root_node_iri(config.root_key, root_value));
        turtle += &format!("{} a {} .\n", root, iri(&root_class_iri(config.root_key)));

        let node = if catalog.table(table).unwrap().rows_are_roots(config.root_key) {
            root
        } else {
            let node = iri(&format!("/{}/row_{}", table, index));
            turtle += &format!("{} {} {} .\n", root, iri(&relation_iri(table)), node);
            node
        };

        for &(column, value) in cells.iter() {
            if column == root_column {
                continue;
            }
            match column_kind(&catalog, table, column) {
                ColumnKind::Compound => {
                    let compound = split_compound(value).unwrap();
                    for (part, text) in [("value", compound.value), ("unit", compound.annotation)] {
                        let edge = iri(&compound_part_iri(table, column, part));
                        turtle += &format!("{} {} {:?} .\n", node, edge, text);
                    }
                }
                kind => {
                    let edge = iri(&attribute_iri(table, column));
                    let object = match kind {
                        ColumnKind::Integer => format!("{:?}^^<{}integer>", value, XSD),
                        ColumnKind::Decimal => format!("{:?}^^<{}decimal>", value, XSD),
                        _ => format!("{:?}", value),
                    };
                    turtle += &format!("{} {} {} .\n", node, edge, object);
                }
            }
        }
    }

    turtle
}

fn setup_kg(config: TranslatorConfig) -> RdfEngine {
    let engine = RdfEngine::new().unwrap();
    engine
        .load(RdfFormat::Turtle, knowledge_graph(config).as_bytes())
        .unwrap();
    engine
}

fn setup_evaluator(config: TranslatorConfig) -> Evaluator<SqliteEngine, RdfEngine> {
    Evaluator::new(SqliteEngine::from_connection(setup_db()), setup_kg(config))
}

fn admission_star() -> TranslatorConfig {
    TranslatorConfig::complex().with_root_key(RootKey::Admission)
}

fn answers(rows: &[&[&str]]) -> AnswerSet {
    AnswerSet::from_rows(
        rows.iter()
            .map(|row| row.iter().map(|cell| Scalar::Text(cell.to_string())).collect())
            .collect(),
    )
}

fn test_query(config: TranslatorConfig, sql: &str, expected: &[&[&str]]) {
    let translation = Translator::new(config).translate(sql).unwrap();
    let sparql = &translation.sparql.text;
    println!("***** BEGIN SPARQL *****");
    println!("{}", sparql);
    println!("***** END SPARQL *****");

    let evaluation = setup_evaluator(config).evaluate(sql, sparql).unwrap();
    assert_eq!(evaluation.relational, answers(expected));
    assert_eq!(evaluation.graph, answers(expected));
    assert_eq!(evaluation.verdict, Verdict::Equivalent);
}

#[test]
fn test_fixture_graph_size() {
    let engine = setup_kg(admission_star());
    let rows = engine
        .execute("select ?s where { ?s a </hadm_id> }")
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert!(!engine.is_empty().unwrap());
}

#[test]
fn test_name_of_subject() {
    test_query(
        TranslatorConfig::simple().with_root_key(RootKey::Subject),
        "select demographic.name from demographic where demographic.subject_id = '10006'",
        &[&["John Doe"], &["John Doe"]],
    );
}

#[test]
fn test_admissions_of_one_subject_stay_apart() {
    test_query(
        TranslatorConfig::complex(),
        "select demographic.age, demographic.days_stay from demographic where demographic.subject_id = '10006'",
        &[&["70", "8"], &["71", "3"]],
    );
    test_query(
        TranslatorConfig::complex(),
        "select count ( * ) from demographic",
        &[&["5"]],
    );
}

#[test]
fn test_single_table_rows_keep_identity() {
    test_query(
        TranslatorConfig::simple(),
        "select count ( * ) from procedures",
        &[&["2"]],
    );
    test_query(
        TranslatorConfig::simple(),
        "select diagnoses.short_title from diagnoses where diagnoses.icd9_code = '4019'",
        &[&["hypertension nos"], &["hypertension nos"]],
    );
}

#[test]
fn test_join_counts_admissions() {
    let sql = "select count ( distinct demographic.hadm_id ) from demographic inner join diagnoses on demographic.hadm_id = diagnoses.hadm_id where diagnoses.icd9_code = '4019'";
    let translation = Translator::new(admission_star()).translate(sql).unwrap();
    assert_eq!(translation.pattern.triples.len(), 2);

    test_query(admission_star(), sql, &[&["2"]]);
}

#[test]
fn test_join_on_subject_root() {
    test_query(
        TranslatorConfig::complex(),
        "select diagnoses.short_title from demographic inner join diagnoses on demographic.hadm_id = diagnoses.hadm_id where demographic.gender = 'm'",
        &[&["hypertension nos"], &["long-term use anticoagul"]],
    );
}

#[test]
fn test_join_two_row_tables() {
    test_query(
        admission_star(),
        "select diagnoses.short_title, procedures.short_title from diagnoses inner join procedures on diagnoses.hadm_id = procedures.hadm_id",
        &[
            &["hypertension nos", "cont inv mec ven <96 hrs"],
            &["long-term use anticoagul", "cont inv mec ven <96 hrs"],
        ],
    );
}

#[test]
fn test_numeric_filter() {
    test_query(
        TranslatorConfig::simple(),
        "select count ( distinct demographic.subject_id ) from demographic where demographic.gender = 'f' and demographic.age < 65",
        &[&["1"]],
    );
    test_query(
        TranslatorConfig::simple(),
        "select demographic.name, demographic.days_stay from demographic where demographic.days_stay >= 10",
        &[&["Jane Roe", "13"], &["Richard Miles", "10"]],
    );
}

#[test]
fn test_aggregates() {
    test_query(
        TranslatorConfig::simple(),
        "select avg ( demographic.age ) from demographic where demographic.gender = 'f'",
        &[&["61.5"]],
    );
    test_query(
        TranslatorConfig::simple(),
        "select max ( demographic.days_stay ) from demographic",
        &[&["13"]],
    );
    test_query(
        TranslatorConfig::simple(),
        "select min ( demographic.dod_year ) from demographic",
        &[&["2125"]],
    );
    test_query(
        TranslatorConfig::simple(),
        "select count ( * ) from demographic",
        &[&["5"]],
    );
}

#[test]
fn test_aggregates_over_no_rows_are_null() {
    test_query(
        TranslatorConfig::simple(),
        "select avg ( demographic.age ) from demographic where demographic.gender = 'x'",
        &[&[""]],
    );
    test_query(
        TranslatorConfig::simple(),
        "select sum ( demographic.days_stay ) from demographic where demographic.gender = 'x'",
        &[&[""]],
    );
    test_query(
        TranslatorConfig::simple(),
        "select sum ( demographic.days_stay ) from demographic where demographic.gender = 'f'",
        &[&["15"]],
    );
}

#[test]
fn test_distinct() {
    test_query(
        TranslatorConfig::complex(),
        "select distinct demographic.marital_status from demographic where demographic.expire_flag = 0",
        &[&["married"], &["single"]],
    );
}

#[test]
fn test_flat_graph_single_table() {
    test_query(
        TranslatorConfig::simple(),
        "select prescriptions.drug from prescriptions where prescriptions.route = 'iv'",
        &[&["heparin"]],
    );
}

#[test]
fn test_compound_literal() {
    test_query(
        admission_star(),
        "select lab.itemid from lab where lab.value_unit = '7.4^^mg/dl'",
        &[&["51248"]],
    );
}

#[test]
fn test_compound_projection() {
    test_query(
        admission_star(),
        "select lab.value_unit, lab.charttime from lab where lab.itemid = '50912'",
        &[
            &["1.2^^mg/dl", "2126-08-14 22:32:00"],
            &["3.5^^mg/dl", "2130-02-14 08:30:00"],
        ],
    );
}

#[test]
fn test_empty_answers_are_equivalent() {
    test_query(
        admission_star(),
        "select demographic.name from demographic where demographic.marital_status = 'divorced'",
        &[],
    );
}

#[test]
fn test_literal_spacing_reaches_the_engine() {
    let sql = "select demographic.name from demographic where demographic.marital_status = 'single  x'";
    let translation = Translator::new(TranslatorConfig::simple()).translate(sql).unwrap();
    assert_eq!(translation.sparql.text, translation.pattern.to_sparql());
    assert!(translation.sparql.text.contains("\"single  x\""));

    test_query(TranslatorConfig::simple(), sql, &[]);
}

#[test]
fn test_row_order_is_ignored() {
    let config = TranslatorConfig::simple();
    let translation = Translator::new(config)
        .translate("select demographic.name from demographic")
        .unwrap();

    let evaluator = setup_evaluator(config);
    for order in ["asc", "desc"] {
        let sql = format!("select demographic.name from demographic order by demographic.age {}", order);
        let evaluation = evaluator.evaluate(&sql, &translation.sparql.text).unwrap();
        assert_eq!(evaluation.verdict, Verdict::Equivalent);
    }
}

#[test]
fn test_shape_mismatch_does_not_raise() {
    let evaluation = setup_evaluator(TranslatorConfig::simple())
        .evaluate(
            "select name, age from demographic",
            "select ?name where { ?hadm_id </demographic/name> ?name . }",
        )
        .unwrap();
    assert_eq!(
        evaluation.verdict,
        Verdict::ShapeMismatch {
            relational: 2,
            graph: 1
        }
    );
}

#[test]
fn test_wrong_translation_is_not_equivalent() {
    let evaluation = setup_evaluator(TranslatorConfig::simple())
        .evaluate(
            "select name from demographic where gender = 'f'",
            "select ?name where { ?hadm_id </demographic/name> ?name . }",
        )
        .unwrap();
    assert_eq!(evaluation.verdict, Verdict::NotEquivalent);

    assert_eq!(evaluation.relational.len(), 2);
    assert_eq!(evaluation.graph.len(), 5);
    assert_eq!(evaluation.relational.contains(&["Jane Roe"]), 1);
    assert_eq!(evaluation.graph.contains(&["John Doe"]), 2);
}

#[test]
fn test_execution_errors() {
    let evaluator = setup_evaluator(TranslatorConfig::simple());
    let err = evaluator
        .evaluate("select blood_type from demographic", "select ?x where { ?x ?p ?o }")
        .unwrap_err();
    assert!(err.to_string().starts_with("relational engine: "));

    let err = evaluator
        .evaluate("select name from demographic", "select ?x where {")
        .unwrap_err();
    assert!(err.to_string().starts_with("graph engine: "));
}

#[test]
fn test_unknown_column_is_reported() {
    let err = Translator::new(TranslatorConfig::simple())
        .translate("select demographic.name from demographic where demographic.blood_type = 'o'")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Translation);
    assert!(err.to_string().contains("demographic.blood_type"));
}

#[test]
fn test_convert_and_execute() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();

    let examples = [
        json!({
            "question_refine_tok": ["what", "is", "the", "name", "of", "subject", "id", "10006", "?"],
            "sql": "SELECT DEMOGRAPHIC.\"NAME\" FROM DEMOGRAPHIC WHERE DEMOGRAPHIC.\"SUBJECT_ID\" = '10006'",
        }),
        json!({
            "question_refine_tok": ["how", "many", "admissions", "have", "4019", "?"],
            "sql": "SELECT COUNT ( DISTINCT DEMOGRAPHIC.\"HADM_ID\" ) FROM DEMOGRAPHIC INNER JOIN DIAGNOSES on DEMOGRAPHIC.HADM_ID = DIAGNOSES.HADM_ID WHERE DIAGNOSES.\"ICD9_CODE\" = '4019'",
        }),
        json!({
            "question_refine_tok": ["blood", "type", "?"],
            "sql": "SELECT DEMOGRAPHIC.\"NAME\" FROM DEMOGRAPHIC WHERE DEMOGRAPHIC.\"BLOOD_TYPE\" = 'o'",
        }),
    ];
    let lines: Vec<String> = examples.iter().map(|example| example.to_string()).collect();
    fs::write(input.join("dev.json"), lines.join("\n")).unwrap();

    // Graph files are loaded by extension.
    let kg_path = dir.path().join("kg.ttl");
    fs::write(&kg_path, knowledge_graph(admission_star())).unwrap();
    let evaluator = Evaluator::new(
        SqliteEngine::from_connection(setup_db()),
        RdfEngine::open(&kg_path).unwrap(),
    );

    let config = CorpusConfig {
        input_dir: input,
        output_dir: dir.path().join("out"),
        splits: vec!["dev".to_owned()],
        execute: true,
        ..CorpusConfig::default()
    };
    let mut driver =
        CorpusDriver::new(config, Translator::new(admission_star())).with_evaluator(evaluator);
    let reports = driver.run().unwrap();

    let report = &reports[0];
    assert_eq!(report.total, 3);
    assert_eq!(report.equivalent, 2);
    assert_eq!(report.failures.get(&ErrorKind::Translation), Some(&1));
    assert_eq!(report.accuracy(), Some(2.0 / 3.0));

    let output = fs::read_to_string(dir.path().join("out/dev.json")).unwrap();
    assert_eq!(output.lines().count(), 2);
    assert!(!output.contains("blood_type"));
    assert!(fs::read_to_string(dir.path().join("out/vocab"))
        .unwrap()
        .lines()
        .all(|line| !line.starts_with("blood ")));
}
