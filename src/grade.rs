#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grades one student against one template.

use std::{collections::BTreeMap, ffi::OsString, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bon::Builder;

use crate::{
    compare, config, executor,
    runtime::Runtime,
    template::{self, FixupTable, SubstitutionMode},
    types::{Language, Question, Submission, Test, TemplateOutcome},
};

/// A named template with its language and parsed tests. Built once per
/// batch and shared by every student.
#[derive(Debug, Clone, PartialEq)]
pub struct Archetype {
    /// Template name, which keys the report.
    pub name:     String,
    /// Language the template is written in.
    pub language: Language,
    /// Template source.
    pub template: String,
    /// Expected interactions.
    pub tests:    Vec<Test>,
    /// Globals defined after the program loads, so they override any
    /// definition of the same name in the program.
    pub bindings: BTreeMap<String, serde_json::Value>,
}

/// Settings shared by every unit in a batch.
#[derive(Debug, Clone, Builder)]
pub struct GradeSettings {
    /// Per-question answer fixups.
    #[builder(default)]
    #[builder(getter)]
    fixups:  Arc<FixupTable>,
    /// Where question substitutions apply.
    #[builder(default)]
    #[builder(getter)]
    mode:    SubstitutionMode,
    /// Deadline for loading the program and for each test.
    #[builder(default = Duration::from_secs(config::DEFAULT_TIMEOUT_SECS))]
    #[builder(getter)]
    timeout: Duration,
    /// Python interpreter for Python templates.
    #[builder(into)]
    #[builder(getter)]
    python:  OsString,
}

/// Renders, loads and tests one (student, template) pair.
///
/// The runtime is created here and dropped on return, so nothing a student
/// defines outlives the unit.
pub async fn grade_template(
    archetype: &Archetype,
    submission: &Submission,
    questions: &BTreeMap<String, Question>,
    settings: &GradeSettings,
) -> Result<TemplateOutcome> {
    let rendered = template::render(
        &archetype.template,
        submission,
        questions,
        &settings.fixups,
        settings.mode,
    )
    .with_context(|| format!("Could not render template {}", archetype.name))?;

    let display_name = rendered.substitute(&archetype.name);
    let subs = rendered.substitutions();
    let mut tests: Vec<Test> = archetype
        .tests
        .iter()
        .map(|t| t.substituted(&subs))
        .collect();

    let mut runtime = Runtime::new(archetype.language, settings.python.clone());
    let execution = executor::execute(rendered.source(), &mut runtime, settings.timeout)
        .await
        .with_context(|| format!("Could not load template {}", archetype.name))?;
    tracing::debug!(
        template = %archetype.name,
        status = execution.status.as_deref().unwrap_or("ok"),
        "program loaded"
    );

    for (name, value) in &archetype.bindings {
        runtime
            .bind(name, value, settings.timeout)
            .await
            .with_context(|| format!("Could not bind {name} for template {}", archetype.name))?;
    }

    compare::compare(&mut tests, &execution, &mut runtime, settings.timeout)
        .await
        .with_context(|| format!("Could not run tests for template {}", archetype.name))?;

    Ok(TemplateOutcome {
        display_name,
        program: rendered.source().to_string(),
        execution,
        tests,
    })
}

/// Indexes a question list by id.
pub fn questions_by_id(questions: Vec<Question>) -> BTreeMap<String, Question> {
    questions.into_iter().map(|q| (q.id.clone(), q)).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::compare::is_success;

    fn settings() -> GradeSettings {
        GradeSettings::builder()
            .python("python3")
            .timeout(Duration::from_secs(2))
            .build()
    }

    fn scheme_archetype() -> Archetype {
        Archetype {
            name:     "square".into(),
            language: Language::Scheme,
            template: "(define (square x)\n{____Q1})".into(),
            tests:    vec![Test::new("(square 3)", "9"), Test::new("(square -2)", "4")],
            bindings: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn passing_scheme_answer() {
        let submission: Submission = [("Q1".to_string(), json!("(* x x)"))].into();
        let questions = questions_by_id(vec![Question {
            id:            "Q1".into(),
            substitutions: BTreeMap::new(),
        }]);
        let outcome = grade_template(&scheme_archetype(), &submission, &questions, &settings())
            .await
            .unwrap();
        assert!(outcome.execution.is_clean());
        assert!(outcome.tests.iter().all(|t| t.result.as_deref().is_some_and(is_success)));
        assert_eq!(outcome.program, "(define (square x)\n    (* x x))");
    }

    #[tokio::test]
    async fn unanswered_question_leaves_placeholder_empty() {
        let outcome = grade_template(
            &scheme_archetype(),
            &Submission::new(),
            &BTreeMap::new(),
            &settings(),
        )
        .await
        .unwrap();
        assert_eq!(
            outcome.execution.status.as_deref(),
            Some("SchemeError: badly formed expression: (define (square x))")
        );
        assert!(outcome.tests.iter().all(|t| t.result.is_none()));
    }

    #[tokio::test]
    async fn substitutions_reach_tests_and_name() {
        let archetype = Archetype {
            name:     "sq_fn".into(),
            language: Language::Scheme,
            template: "(define (sq_fn x) {Q1})".into(),
            tests:    vec![Test::new("(sq_fn 5)", "25")],
            bindings: BTreeMap::new(),
        };
        let submission: Submission = [("Q1".to_string(), json!("(* x x)"))].into();
        let questions = questions_by_id(vec![Question {
            id:            "Q1".into(),
            substitutions: [("sq_fn".to_string(), "blorp".to_string())].into(),
        }]);
        let outcome = grade_template(&archetype, &submission, &questions, &settings())
            .await
            .unwrap();
        assert_eq!(outcome.display_name, "blorp");
        assert_eq!(outcome.tests[0].stmt, "(blorp 5)");
        assert_eq!(outcome.tests[0].result.as_deref(), Some("SUCCESS: Got 25"));
    }

    #[tokio::test]
    async fn bindings_are_visible_to_the_program() {
        let mut archetype = scheme_archetype();
        archetype.template = "(define (square x) (* x scale))".into();
        archetype.tests = vec![Test::new("(square 3)", "30")];
        archetype.bindings.insert("scale".into(), json!(10));
        let outcome = grade_template(&archetype, &Submission::new(), &BTreeMap::new(), &settings())
            .await
            .unwrap();
        assert_eq!(outcome.tests[0].result.as_deref(), Some("SUCCESS: Got 30"));
    }

    #[tokio::test]
    async fn bindings_override_program_definitions() {
        let mut archetype = scheme_archetype();
        archetype.template = "(define limit 1)\n(define (under? x) (< x limit))".into();
        archetype.tests = vec![Test::new("limit", "10"), Test::new("(under? 5)", "#t")];
        archetype.bindings.insert("limit".into(), json!(10));
        let outcome = grade_template(&archetype, &Submission::new(), &BTreeMap::new(), &settings())
            .await
            .unwrap();
        assert!(outcome.execution.is_clean());
        assert_eq!(outcome.tests[0].result.as_deref(), Some("SUCCESS: Got 10"));
        assert_eq!(outcome.tests[1].result.as_deref(), Some("SUCCESS: Got #t"));
    }
}
