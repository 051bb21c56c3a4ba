use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustyline::{error::ReadlineError, Editor};
use structopt::StructOpt;

use sql2sparql::ast::RootKey;
use sql2sparql::{
    CorpusConfig, CorpusDriver, Evaluator, RdfEngine, SqliteEngine, Translator, TranslatorConfig,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "sql2sparql", about = "Translate clinical SQL queries to SPARQL")]
struct Opt {
    /// Star-shaped graph with joins, rooted at subject_id by default
    #[structopt(long, global = true)]
    complex: bool,

    /// Root key the graph is anchored at (subject_id or hadm_id)
    #[structopt(long, global = true)]
    root: Option<RootKey>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Translate queries interactively
    Translate {
        /// SQLite database to run each query against
        #[structopt(long, parse(from_os_str), requires = "kg")]
        db: Option<PathBuf>,

        /// Knowledge graph file to run each translation against
        #[structopt(long, parse(from_os_str), requires = "db")]
        kg: Option<PathBuf>,
    },

    /// Rewrite dataset splits and build their vocabulary
    Convert {
        #[structopt(long, parse(from_os_str))]
        input: PathBuf,

        #[structopt(long, parse(from_os_str))]
        output: PathBuf,

        #[structopt(long, default_value = "train,dev,test", use_delimiter = true)]
        splits: Vec<String>,

        /// Check every translation against both engines
        #[structopt(long, requires_all = &["db", "kg"])]
        execute: bool,

        #[structopt(long, parse(from_os_str))]
        db: Option<PathBuf>,

        #[structopt(long, parse(from_os_str))]
        kg: Option<PathBuf>,
    },
}

type EngineEvaluator = Evaluator<SqliteEngine, RdfEngine>;

fn open_evaluator(db: &Path, kg: &Path) -> Result<EngineEvaluator> {
    let relational = SqliteEngine::open(db).context("failed to open database")?;
    let graph = RdfEngine::open(kg).context("failed to load knowledge graph")?;
    Ok(Evaluator::new(relational, graph))
}

fn handle_input(
    translator: &Translator,
    evaluator: Option<&EngineEvaluator>,
    sql: &str,
) -> Result<String> {
    let translation = translator.translate(&sql.to_lowercase())?;
    let mut output = translation.sparql.text;
    if let Some(evaluator) = evaluator {
        let evaluation = evaluator.evaluate(&sql.to_lowercase(), &output)?;
        output.push_str(&format!(
            "\n{:?}: {} relational rows, {} graph rows",
            evaluation.verdict,
            evaluation.relational.len(),
            evaluation.graph.len()
        ));
    }
    Ok(output)
}

fn repl(translator: Translator, evaluator: Option<EngineEvaluator>) -> Result<()> {
    let mut editor = Editor::<()>::new();

    loop {
        let readline = editor.readline("> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                editor.add_history_entry(line.as_str());

                match handle_input(&translator, evaluator.as_ref(), &line) {
                    Ok(sparql) => {
                        println!("{}", sparql);
                    }
                    Err(e) => {
                        println!("Error: {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();
    let mut config = if opt.complex {
        TranslatorConfig::complex()
    } else {
        TranslatorConfig::simple()
    };
    if let Some(root) = opt.root {
        config = config.with_root_key(root);
    }
    let translator = Translator::new(config);

    match opt.command {
        Command::Translate { db, kg } => {
            let evaluator = match (db, kg) {
                (Some(db), Some(kg)) => Some(open_evaluator(&db, &kg)?),
                _ => None,
            };
            repl(translator, evaluator)
        }
        Command::Convert {
            input,
            output,
            splits,
            execute,
            db,
            kg,
        } => {
            let config = CorpusConfig {
                input_dir: input,
                output_dir: output,
                splits,
                execute,
                ..CorpusConfig::default()
            };

            let driver = CorpusDriver::new(config.clone(), translator);
            let reports = match (config.execute, db, kg) {
                (true, Some(db), Some(kg)) => {
                    driver.with_evaluator(open_evaluator(&db, &kg)?).run()?
                }
                _ => {
                    let mut driver = driver;
                    driver.run()?
                }
            };

            for report in reports {
                println!("{}", report);
            }
            Ok(())
        }
    }
}
