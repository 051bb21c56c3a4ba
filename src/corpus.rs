//! Split-by-split dataset conversion and vocabulary building.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::config::CorpusConfig;
use crate::engine::{QueryEngine, RdfEngine, SqliteEngine};
use crate::error::{self, ErrorKind, RecordError};
use crate::evaluator::{Evaluator, Verdict};
use crate::normalizer::NormalizedQuery;
use crate::translator::Translator;

/// What happened to one example. Every example gets exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Equivalent,
    NotEquivalent,
    ShapeMismatch,
    /// Translated without execution.
    Translated,
    Failed(ErrorKind),
}

impl From<Verdict> for Outcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Equivalent => Outcome::Equivalent,
            Verdict::NotEquivalent => Outcome::NotEquivalent,
            Verdict::ShapeMismatch { .. } => Outcome::ShapeMismatch,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub split: String,
    pub executed: bool,
    pub total: usize,
    pub equivalent: usize,
    pub not_equivalent: usize,
    pub shape_mismatch: usize,
    pub translated: usize,
    pub failures: BTreeMap<ErrorKind, usize>,
}

impl SplitReport {
    pub fn new(split: impl Into<String>, executed: bool) -> Self {
        Self {
            split: split.into(),
            executed,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Equivalent => self.equivalent += 1,
            Outcome::NotEquivalent => self.not_equivalent += 1,
            Outcome::ShapeMismatch => self.shape_mismatch += 1,
            Outcome::Translated => self.translated += 1,
            Outcome::Failed(kind) => *self.failures.entry(kind).or_default() += 1,
        }
    }

    pub fn written(&self) -> usize {
        self.equivalent + self.not_equivalent + self.shape_mismatch + self.translated
    }

    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }

    /// Equivalent examples over all examples, if the split was executed.
    pub fn accuracy(&self) -> Option<f64> {
        if self.executed && self.total > 0 {
            Some(self.equivalent as f64 / self.total as f64)
        } else {
            None
        }
    }
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} examples, {} written",
            self.split,
            self.total,
            self.written()
        )?;
        if self.executed {
            write!(
                f,
                ", {} equivalent, {} not equivalent, {} shape mismatch",
                self.equivalent, self.not_equivalent, self.shape_mismatch
            )?;
        }
        write!(f, ", {} failed", self.failed())?;
        if !self.failures.is_empty() {
            let kinds = self
                .failures
                .iter()
                .map(|(kind, count)| format!("{}: {}", kind, count));
            write!(f, " ({})", itertools::join(kinds, ", "))?;
        }
        if let Some(accuracy) = self.accuracy() {
            write!(f, ", accuracy {:.4}", accuracy)?;
        }
        Ok(())
    }
}

/// Token frequencies, ranked by count with ties in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct Vocabulary {
    counts: HashMap<String, (usize, usize)>,
}

impl Vocabulary {
    /// Counts every token that is not empty or pure whitespace.
    pub fn add<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            let token = token.as_ref();
            if token.trim().is_empty() {
                continue;
            }
            let first_seen = self.counts.len();
            self.counts.entry(token.to_owned()).or_insert((0, first_seen)).0 += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<_> = self.counts.iter().collect();
        entries.sort_by_key(|(_, &(count, first_seen))| (Reverse(count), first_seen));
        entries
            .into_iter()
            .map(|(token, &(count, _))| (token.as_str(), count))
            .collect()
    }

    /// One `token frequency` line per token.
    pub fn write_to(&self, mut out: impl Write) -> io::Result<()> {
        for (token, count) in self.ranked() {
            writeln!(out, "{} {}", token, count)?;
        }
        out.flush()
    }
}

/// Rewrites dataset splits from SQL to graph queries, optionally checking
/// each translation against both backing engines.
pub struct CorpusDriver<R = SqliteEngine, G = RdfEngine> {
    config: CorpusConfig,
    translator: Translator,
    evaluator: Option<Evaluator<R, G>>,
    vocabulary: Vocabulary,
}

impl CorpusDriver {
    pub fn new(config: CorpusConfig, translator: Translator) -> Self {
        Self {
            config,
            translator,
            evaluator: None,
            vocabulary: Vocabulary::default(),
        }
    }
}

impl<R: QueryEngine, G: QueryEngine> CorpusDriver<R, G> {
    pub fn with_evaluator<R2, G2>(self, evaluator: Evaluator<R2, G2>) -> CorpusDriver<R2, G2> {
        CorpusDriver {
            config: self.config,
            translator: self.translator,
            evaluator: Some(evaluator),
            vocabulary: self.vocabulary,
        }
    }

    /// Converts every configured split, then writes the vocabulary. All
    /// splits are read before anything is written.
    pub fn run(&mut self) -> Result<Vec<SplitReport>> {
        let inputs = self
            .config
            .splits
            .iter()
            .map(|split| -> Result<(String, Vec<Map<String, Value>>)> {
                let path = self.config.input_dir.join(format!("{}.json", split));
                let examples = read_examples(&path)?;
                info!("read {} examples from {}", examples.len(), path.display());
                Ok((split.clone(), examples))
            })
            .collect::<Result<Vec<_>>>()?;

        let reports = inputs
            .into_iter()
            .map(|(split, examples)| self.convert_split(&split, examples))
            .collect::<Result<Vec<_>>>()?;
        self.write_vocabulary()?;
        Ok(reports)
    }

    fn convert_split(
        &mut self,
        split: &str,
        examples: Vec<Map<String, Value>>,
    ) -> Result<SplitReport> {
        let file_name = format!("{}.json", split);

        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("failed to create {}", self.config.output_dir.display())
        })?;
        let output_path = self.config.output_dir.join(&file_name);
        let output = File::create(&output_path)
            .with_context(|| format!("failed to create {}", output_path.display()))?;
        let mut output = BufWriter::new(output);

        let mut report = SplitReport::new(split, self.evaluator.is_some());
        for (index, mut example) in examples.into_iter().enumerate() {
            let (sparql, outcome) = match self.convert_example(&example) {
                Ok(converted) => converted,
                Err(err) => {
                    warn!("{} #{}: {}", split, index, err);
                    report.record(Outcome::Failed(err.kind()));
                    continue;
                }
            };
            report.record(outcome);

            let tokens = sparql.tokens;
            if let Some(Value::Array(question)) = example.get(&self.config.question_token_field) {
                self.vocabulary.add(question.iter().filter_map(Value::as_str));
            }
            self.vocabulary.add(&tokens);

            example.insert(self.config.sql_field.clone(), Value::String(sparql.stored));
            example.insert(
                self.config.token_field.clone(),
                Value::Array(tokens.into_iter().map(Value::String).collect()),
            );
            serde_json::to_writer(&mut output, &example)?;
            output.write_all(b"\n")?;
        }
        output.flush()?;

        debug_assert_eq!(report.total, report.written() + report.failed());
        info!("{}", report);
        info!("wrote {}", output_path.display());
        Ok(report)
    }

    fn convert_example(
        &self,
        example: &Map<String, Value>,
    ) -> error::Result<(NormalizedQuery, Outcome)> {
        let sql = example
            .get(&self.config.sql_field)
            .and_then(Value::as_str)
            .ok_or_else(|| RecordError {
                field: self.config.sql_field.clone(),
            })?
            .to_lowercase();

        let translation = self.translator.translate(&sql)?;
        let outcome = match &self.evaluator {
            Some(evaluator) => {
                let evaluation = evaluator.evaluate(&sql, &translation.sparql.text)?;
                if !evaluation.verdict.is_equivalent() {
                    warn!(
                        "{:?}: {} => {}",
                        evaluation.verdict, sql, translation.sparql.text
                    );
                    debug!(
                        "relational {:?}, graph {:?}",
                        evaluation.relational, evaluation.graph
                    );
                }
                evaluation.verdict.into()
            }
            None => Outcome::Translated,
        };
        Ok((translation.sparql, outcome))
    }

    fn write_vocabulary(&self) -> Result<()> {
        let path = self.config.output_dir.join(&self.config.vocab_file);
        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        self.vocabulary.write_to(BufWriter::new(file))?;
        info!("vocabulary of {} tokens written to {}", self.vocabulary.len(), path.display());
        Ok(())
    }
}

/// Reads a newline-delimited JSON split. Any unreadable line is fatal.
pub fn read_examples(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut examples = vec![];
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let example = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid example", path.display(), number + 1))?;
        examples.push(example);
    }
    Ok(examples)
}
