use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ast::RootKey;

/// Grammar variant: flat single-entity queries or star-joined ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Simple,
    Complex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub mode: Mode,
    pub root_key: RootKey,
}

impl TranslatorConfig {
    /// Flat graph, anchored at admissions.
    pub fn simple() -> Self {
        Self {
            mode: Mode::Simple,
            root_key: RootKey::Admission,
        }
    }

    /// Star graph, anchored at subjects.
    pub fn complex() -> Self {
        Self {
            mode: Mode::Complex,
            root_key: RootKey::Subject,
        }
    }

    pub fn with_root_key(mut self, root_key: RootKey) -> Self {
        self.root_key = root_key;
        self
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self::simple()
    }
}

/// Settings for rewriting a dataset split family.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Split names; each is read from `<input_dir>/<split>.json`.
    pub splits: Vec<String>,
    /// Execute both queries and check equivalence.
    pub execute: bool,
    pub sql_field: String,
    pub token_field: String,
    pub question_token_field: String,
    pub vocab_file: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            splits: vec!["train".to_owned(), "dev".to_owned(), "test".to_owned()],
            execute: false,
            sql_field: "sql".to_owned(),
            token_field: "sql_tok".to_owned(),
            question_token_field: "question_refine_tok".to_owned(),
            vocab_file: "vocab".to_owned(),
        }
    }
}
