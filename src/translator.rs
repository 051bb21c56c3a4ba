use log::debug;

use crate::ast::StructuredQuery;
use crate::compiler::{Emitter, GraphPattern};
use crate::config::TranslatorConfig;
use crate::error::Result;
use crate::normalizer::{normalize, NormalizedQuery};
use crate::parser::parse_query;
use crate::schema::Catalog;

/// Output of translating one SQL query.
#[derive(Clone, Debug)]
pub struct Translation {
    pub query: StructuredQuery,
    pub pattern: GraphPattern,
    pub sparql: NormalizedQuery,
}

/// Parse, emit and normalize with one fixed catalog and configuration.
#[derive(Clone, Debug)]
pub struct Translator {
    catalog: Catalog,
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self::with_catalog(Catalog::mimic(), config)
    }

    pub fn with_catalog(catalog: Catalog, config: TranslatorConfig) -> Self {
        Self { catalog, config }
    }

    pub fn translate(&self, sql: &str) -> Result<Translation> {
        let query = parse_query(sql, &self.config)?;
        let pattern = Emitter::new(&self.catalog, self.config).emit(&query)?;
        let sparql = normalize(&pattern.to_sparql())?;
        debug!("{} => {}", sql, sparql.text);
        Ok(Translation {
            query,
            pattern,
            sparql,
        })
    }
}
