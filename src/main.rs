#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # examgrade
//!
//! Command-line front end: batch grading, plus small tools for checking
//! templates, doctests and finished reports by hand.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use examgrade::{
    batch::{self, BatchOptions},
    config,
    doctest::{self, ParseOptions},
    grade,
    report::{self, GradingReport},
    runtime::python,
    snapshot::Snapshots,
    store::{LocalExamStore, LocalQuestionSource},
    template::{self, FixupTable},
    types::{Question, Submission},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade every student on an exam's roster
    Grade {
        /// Exam id
        exam:    String,
        /// Concurrent students
        workers: Option<usize>,
        /// Use the submissions cache
        cached:  bool,
        /// Skip students already in the report
        resume:  bool,
        /// Per-call deadline in seconds
        timeout: Option<u64>,
    },
    /// Render one template for one set of answers
    Render {
        /// Template file
        template:  PathBuf,
        /// Answers JSON file
        answers:   PathBuf,
        /// Fixup table JSON file
        fixups:    Option<PathBuf>,
        /// Questions JSON file
        questions: Option<PathBuf>,
    },
    /// Parse a doctest transcript
    Doctests {
        /// Transcript file
        file:   PathBuf,
        /// Use strict mode
        strict: bool,
        /// Prompt that opens a test
        prompt: Option<String>,
    },
    /// Summarize a finished report
    Summary {
        /// Report JSON file
        report: PathBuf,
    },
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Cli {
    /// Log at debug level
    verbose: bool,
    /// Command to run
    cmd:     Cmd,
}

/// Parse the command line arguments and return a `Cli`
fn options() -> Cli {
    let verbose = short('v')
        .long("verbose")
        .help("Log at debug level")
        .switch();

    let grade = {
        let exam = positional::<String>("EXAM").help("Exam id");
        let workers = long("workers")
            .help("Number of students graded concurrently")
            .argument::<usize>("N")
            .optional();
        let cached = long("cached")
            .help("Read submissions from the local cache instead of the store")
            .switch();
        let resume = long("resume")
            .help("Skip students already present in the report")
            .switch();
        let timeout = long("timeout")
            .help("Seconds allowed for loading a program and for each test")
            .argument::<u64>("SECS")
            .optional();
        construct!(Cmd::Grade {
            workers,
            cached,
            resume,
            timeout,
            exam
        })
        .to_options()
        .command("grade")
        .help("Grade every student on an exam's roster")
    };

    let render = {
        let fixups = long("fixups")
            .help("JSON fixup table")
            .argument::<PathBuf>("FILE")
            .optional();
        let questions = long("questions")
            .help("JSON list of questions; defaults to one per answer")
            .argument::<PathBuf>("FILE")
            .optional();
        let template = positional::<PathBuf>("TEMPLATE_FILE").help("Template source");
        let answers = positional::<PathBuf>("ANSWERS_JSON").help("Answers keyed by question id");
        construct!(Cmd::Render {
            fixups,
            questions,
            template,
            answers
        })
        .to_options()
        .command("render")
        .help("Print a template rendered with the given answers")
    };

    let doctests = {
        let strict = long("strict")
            .help("Reject continuation lines and multi-line output")
            .switch();
        let prompt = long("prompt")
            .help("Prompt that opens a test (default \">>> \")")
            .argument::<String>("P")
            .optional();
        let file = positional::<PathBuf>("FILE").help("Transcript file");
        construct!(Cmd::Doctests {
            strict,
            prompt,
            file
        })
        .to_options()
        .command("doctests")
        .help("Print the tests in a transcript as JSON")
    };

    let summary = {
        let report = positional::<PathBuf>("REPORT_JSON").help("Report written by `grade`");
        construct!(Cmd::Summary { report })
            .to_options()
            .command("summary")
            .help("Print per-template pass/fail counts for a report")
    };

    let cmd = construct!([grade, render, doctests, summary]);

    construct!(Cli { verbose, cmd })
        .to_options()
        .descr("Grades free-response exam answers against doctests")
        .run()
}

/// Runs the batch job.
async fn grade(
    exam: String,
    workers: Option<usize>,
    cached: bool,
    resume: bool,
    timeout: Option<u64>,
) -> Result<()> {
    let cfg = config::ensure_initialized()?;

    let python = match python::interpreter_path() {
        Ok(path) => {
            match python::interpreter_version(path.as_os_str()).await {
                Ok(version) => tracing::info!("Using {version} at {}", path.display()),
                Err(e) => tracing::warn!("{e:#}"),
            }
            path
        }
        Err(e) => {
            tracing::warn!("{e:#}; Python templates will fail to load");
            PathBuf::from("python3")
        }
    };

    let store = LocalExamStore::new(cfg.data_dir());
    let questions =
        LocalQuestionSource::load(&cfg.data_dir().join(&exam).join("questions.json")).await?;
    let snapshots = Snapshots::from_endpoint(cfg.http_client(), cfg.snapshot_url());

    let opts = BatchOptions::builder()
        .exam(exam)
        .workers(workers.unwrap_or(cfg.workers()))
        .cached(cached)
        .resume(resume)
        .checkpoint_every(cfg.checkpoint_every())
        .timeout(timeout.map(Duration::from_secs).unwrap_or(cfg.timeout()))
        .python(python)
        .out_dir(cfg.out_dir())
        .build();

    let summary = batch::run_batch(&store, Arc::new(questions), Arc::new(snapshots), &opts).await?;

    let line = format!(
        "{} graded, {} failed, {} skipped",
        summary.graded, summary.failed, summary.skipped
    );
    if summary.failed > 0 || summary.interrupted {
        eprintln!("{}", line.yellow());
    } else {
        eprintln!("{}", line.green());
    }
    eprintln!("Report written to {}", summary.report_path.display());
    Ok(())
}

/// Prints a rendered template.
fn render(
    template_path: PathBuf,
    answers_path: PathBuf,
    fixups_path: Option<PathBuf>,
    questions_path: Option<PathBuf>,
) -> Result<()> {
    let template = std::fs::read_to_string(&template_path)
        .with_context(|| format!("Could not read {}", template_path.display()))?;
    let answers: Submission = read_json(&answers_path)?;
    let fixups: FixupTable = match fixups_path {
        Some(path) => read_json(&path)?,
        None => FixupTable::new(),
    };
    let questions: Vec<Question> = match questions_path {
        Some(path) => read_json(&path)?,
        None => answers
            .keys()
            .map(|id| Question {
                id:            id.clone(),
                substitutions: BTreeMap::new(),
            })
            .collect(),
    };
    let questions = grade::questions_by_id(questions);

    let rendered = template::render(&template, &answers, &questions, &fixups, Default::default())
        .with_context(|| format!("Could not render {}", template_path.display()))?;
    println!("{}", rendered.source());
    Ok(())
}

/// Prints the tests in a transcript as JSON.
fn doctests(file: PathBuf, strict: bool, prompt: Option<String>) -> Result<()> {
    let transcript = std::fs::read_to_string(&file)
        .with_context(|| format!("Could not read {}", file.display()))?;
    let opts = ParseOptions::builder()
        .maybe_prompt(prompt)
        .strict(strict)
        .build();
    let tests = doctest::parse(&transcript, &opts)
        .with_context(|| format!("Could not parse {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&tests)?);
    Ok(())
}

/// Prints a report summary table.
async fn summary(path: PathBuf) -> Result<()> {
    let report = GradingReport::load(&path).await?;
    if report.is_empty() {
        eprintln!("{}", format!("{} has no graded students", path.display()).yellow());
        return Ok(());
    }
    let rows = report::summarize(&report);
    println!("{}", report::summary_table(&rows, report.len()));
    Ok(())
}

/// Reads and decodes a JSON file.
fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Could not parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter_layer = LevelFilter::from_level(level);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match cli.cmd {
        Cmd::Grade {
            exam,
            workers,
            cached,
            resume,
            timeout,
        } => grade(exam, workers, cached, resume, timeout).await?,
        Cmd::Render {
            template,
            answers,
            fixups,
            questions,
        } => render(template, answers, fixups, questions)?,
        Cmd::Doctests {
            file,
            strict,
            prompt,
        } => doctests(file, strict, prompt)?,
        Cmd::Summary { report } => summary(report).await?,
    };

    Ok(())
}
