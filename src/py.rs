#![allow(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Python bindings for rendering templates, parsing transcripts and grading
//! a single program from a notebook or script.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use pyo3::{Bound, create_exception, exceptions::PyException, prelude::*, types::PyModule};

use crate::{
    compare, config,
    doctest::{self, ParseOptions},
    executor, report,
    runtime::{Runtime, python},
    template::{self, FixupTable},
    types::{Language, Question, Submission, TemplateOutcome},
};

create_exception!(examgrade, ExamgradeError, PyException);

/// Converts any displayable error into an `ExamgradeError`.
fn to_py(err: impl std::fmt::Display) -> PyErr {
    PyErr::new::<ExamgradeError, _>(err.to_string())
}

/// Converts an `anyhow` error, keeping its context chain.
fn anyhow_to_py(err: anyhow::Error) -> PyErr {
    PyErr::new::<ExamgradeError, _>(format!("{err:#}"))
}

/// Renders `template` with answers given as a JSON object keyed by question
/// id, returning the program source.
#[pyfunction]
#[pyo3(signature = (template, answers_json, fixups_json = None))]
fn render_template(template: &str, answers_json: &str, fixups_json: Option<&str>) -> PyResult<String> {
    let answers: Submission = serde_json::from_str(answers_json).map_err(to_py)?;
    let fixups: FixupTable = match fixups_json {
        Some(raw) => serde_json::from_str(raw).map_err(to_py)?,
        None => FixupTable::new(),
    };
    let questions: BTreeMap<String, Question> = answers
        .keys()
        .map(|id| {
            (
                id.clone(),
                Question {
                    id:            id.clone(),
                    substitutions: BTreeMap::new(),
                },
            )
        })
        .collect();

    template::render(template, &answers, &questions, &fixups, Default::default())
        .map(|rendered| rendered.source().to_string())
        .map_err(to_py)
}

/// Parses a doctest transcript and returns its tests as a JSON list.
#[pyfunction]
#[pyo3(signature = (transcript, prompt = None, strict = false))]
fn parse_doctests(transcript: &str, prompt: Option<String>, strict: bool) -> PyResult<String> {
    let opts = ParseOptions::builder()
        .maybe_prompt(prompt)
        .strict(strict)
        .build();
    let tests = doctest::parse(transcript, &opts).map_err(to_py)?;
    serde_json::to_string(&tests).map_err(to_py)
}

/// Loads `program`, runs the tests in `doctests` against it and returns the
/// transcript a batch run would record.
#[pyfunction]
#[pyo3(signature = (language, program, doctests, timeout_secs = config::DEFAULT_TIMEOUT_SECS))]
fn grade_program(language: &str, program: &str, doctests: &str, timeout_secs: u64) -> PyResult<String> {
    let language = match language.to_ascii_lowercase().as_str() {
        "python" => Language::Python,
        "scheme" => Language::Scheme,
        other => return Err(to_py(format!("unknown language `{other}`"))),
    };
    let opts = ParseOptions::with_prompt(language.prompt());
    let mut tests = doctest::parse(doctests, &opts).map_err(to_py)?;
    let timeout = Duration::from_secs(timeout_secs);

    let interpreter = match language {
        Language::Python => python::interpreter_path().map_err(anyhow_to_py)?,
        Language::Scheme => PathBuf::new(),
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(to_py)?;

    rt.block_on(async {
        let mut runtime = Runtime::new(language, interpreter);
        let execution = executor::execute(program, &mut runtime, timeout)
            .await
            .map_err(to_py)?;
        compare::compare(&mut tests, &execution, &mut runtime, timeout)
            .await
            .map_err(to_py)?;

        let outcome = TemplateOutcome {
            display_name: String::new(),
            program: program.to_string(),
            execution,
            tests,
        };
        Ok(report::render_transcript("", &outcome)
            .trim_start_matches('\n')
            .to_string())
    })
}

/// Module entry point.
#[pymodule]
pub fn examgrade(py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("ExamgradeError", py.get_type::<ExamgradeError>())?;
    m.add_function(wrap_pyfunction!(render_template, m)?)?;
    m.add_function(wrap_pyfunction!(parse_doctests, m)?)?;
    m.add_function(wrap_pyfunction!(grade_program, m)?)?;
    Ok(())
}
