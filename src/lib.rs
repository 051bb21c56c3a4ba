pub mod ast;
pub mod compiler;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod normalizer;
pub mod parser;
pub mod schema;
pub mod splitter;
pub mod translator;

#[cfg(test)]
mod tests;

pub use compiler::{Emitter, GraphPattern};
pub use config::{CorpusConfig, Mode, TranslatorConfig};
pub use corpus::{CorpusDriver, SplitReport};
pub use engine::{QueryEngine, RdfEngine, SqliteEngine};
pub use error::{Error, ErrorKind};
pub use evaluator::{Evaluator, Verdict};
pub use normalizer::normalize;
pub use parser::parse_query;
pub use translator::{Translation, Translator};
