//! The fixed clinical catalog the translator resolves columns against.

use crate::ast::RootKey;

pub const ROOT_TABLE: &str = "demographic";
pub const KEY_COLUMNS: [&str; 2] = ["subject_id", "hadm_id"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Decimal,
    /// `value^^unit`, stored in the graph as two edges.
    Compound,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Decimal)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: Vec<Column>,
}

impl Table {
    fn new(name: &'static str, columns: &[(&'static str, ColumnKind)]) -> Self {
        let columns = KEY_COLUMNS
            .iter()
            .map(|&name| (name, ColumnKind::Text))
            .chain(columns.iter().copied())
            .map(|(name, kind)| Column { name, kind })
            .collect();
        Self { name, columns }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_TABLE
    }

    /// Whether each row of this table is itself a root node. Demographic rows
    /// are admissions, so under a subject root they become nodes of their own
    /// like the rows of every other table.
    pub fn rows_are_roots(&self, root_key: RootKey) -> bool {
        self.is_root() && root_key == RootKey::Admission
    }
}

#[derive(Clone, Debug)]
pub struct Catalog {
    tables: Vec<Table>,
}

impl Catalog {
    pub fn mimic() -> Self {
        use ColumnKind::*;

        let tables = vec![
            Table::new(
                "demographic",
                &[
                    ("name", Text),
                    ("marital_status", Text),
                    ("age", Integer),
                    ("dob", Text),
                    ("gender", Text),
                    ("language", Text),
                    ("religion", Text),
                    ("admission_type", Text),
                    ("days_stay", Integer),
                    ("insurance", Text),
                    ("ethnicity", Text),
                    ("expire_flag", Integer),
                    ("admission_location", Text),
                    ("discharge_location", Text),
                    ("diagnosis", Text),
                    ("dod", Text),
                    ("dob_year", Integer),
                    ("dod_year", Decimal),
                    ("admittime", Text),
                    ("dischtime", Text),
                    ("admityear", Integer),
                ],
            ),
            Table::new(
                "diagnoses",
                &[
                    ("icd9_code", Text),
                    ("short_title", Text),
                    ("long_title", Text),
                ],
            ),
            Table::new(
                "procedures",
                &[
                    ("icd9_code", Text),
                    ("short_title", Text),
                    ("long_title", Text),
                ],
            ),
            Table::new(
                "prescriptions",
                &[
                    ("icustay_id", Text),
                    ("drug_type", Text),
                    ("drug", Text),
                    ("formulary_drug_cd", Text),
                    ("route", Text),
                    ("drug_dose", Text),
                ],
            ),
            Table::new(
                "lab",
                &[
                    ("itemid", Text),
                    ("charttime", Text),
                    ("flag", Text),
                    ("value_unit", Compound),
                    ("label", Text),
                    ("fluid", Text),
                    ("category", Text),
                ],
            ),
        ];

        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::mimic()
    }
}

/// IRI of a root node's class, e.g. `/hadm_id`.
pub fn root_class_iri(root_key: RootKey) -> String {
    format!("/{}", root_key.column())
}

/// IRI of a root node, e.g. `/hadm_id/100001`.
pub fn root_node_iri(root_key: RootKey, value: &str) -> String {
    format!("/{}/{}", root_key.column(), value)
}

/// Edge linking a root node to a row of `table`.
pub fn relation_iri(table: &str) -> String {
    format!("/{}", table)
}

pub fn attribute_iri(table: &str, column: &str) -> String {
    format!("/{}/{}", table, column)
}

pub fn compound_part_iri(table: &str, column: &str, part: &str) -> String {
    format!("/{}/{}/{}", table, column, part)
}
