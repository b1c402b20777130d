#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Shared data model: questions, submissions, tests and execution results.

use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};

/// A student's answers, keyed by question id.
///
/// Values are usually strings; anything else (numbers, selected options) is
/// carried along but never substituted into a template.
pub type Submission = BTreeMap<String, serde_json::Value>;

/// A per-student question, carrying the textual substitutions produced when
/// the exam was scrambled for that student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Question id, matching the keys used in submissions and templates.
    pub id:            String,
    /// Literal find/replace pairs (e.g. scrambled variable names).
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
}

/// An ordered table of literal find/replace pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Substitutions(BTreeMap<String, String>);

impl Substitutions {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges another table in; later entries win on key collisions.
    pub fn extend<'a>(&mut self, other: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (k, v) in other {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Applies every pair, in key order, to `s`.
    pub fn apply(&self, s: &str) -> String {
        let mut out = s.to_string();
        for (from, to) in &self.0 {
            if from.is_empty() {
                continue;
            }
            out = out.replace(from.as_str(), to);
        }
        out
    }

    /// Returns true if the table holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Substitutions {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Executable languages a template can be written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python, run in a child interpreter.
    #[default]
    Python,
    /// Scheme, run by the embedded interpreter.
    Scheme,
}

impl Language {
    /// File extension used for snapshots of programs in this language.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Scheme => "scm",
        }
    }

    /// Interactive prompt used in this language's doctest transcripts.
    pub fn prompt(&self) -> &'static str {
        match self {
            Language::Python => ">>> ",
            Language::Scheme => "scm> ",
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Scheme => write!(f, "scheme"),
        }
    }
}

/// One expected interaction: a statement and the output it should produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    /// Statement to evaluate; may span several lines.
    pub stmt:   String,
    /// Expected printed representation.
    #[serde(default)]
    pub out:    String,
    /// Verdict, set only once the statement actually ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Test {
    /// Creates a test that has not been run yet.
    pub fn new(stmt: impl Into<String>, out: impl Into<String>) -> Self {
        Self {
            stmt:   stmt.into(),
            out:    out.into(),
            result: None,
        }
    }

    /// Returns a fresh copy with both sides rewritten by `subs` and no
    /// verdict.
    pub fn substituted(&self, subs: &Substitutions) -> Self {
        Self {
            stmt:   subs.apply(&self.stmt),
            out:    subs.apply(&self.out),
            result: None,
        }
    }
}

/// Outcome of loading a program into a runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` when the program ran to completion; otherwise the error
    /// message, or `"Timeout"`.
    pub status: Option<String>,
    /// Everything the program printed, including error lines.
    pub stdout: String,
}

impl ExecutionResult {
    /// Returns true if the program loaded without error.
    pub fn is_clean(&self) -> bool {
        self.status.is_none()
    }
}

/// Outcome of grading one (student, template) pair.
#[derive(Debug, Clone, Default)]
pub struct TemplateOutcome {
    /// Template name, after substitutions.
    pub display_name: String,
    /// Rendered program source.
    pub program:      String,
    /// Load status.
    pub execution:    ExecutionResult,
    /// Per-student tests, with verdicts filled in where they ran.
    pub tests:        Vec<Test>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutions_apply_in_key_order() {
        let subs: Substitutions = [
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
        ]
        .into_iter()
        .collect();
        // "a" -> "b" runs first, then every "b" becomes "c".
        assert_eq!(subs.apply("ab"), "cc");
    }

    #[test]
    fn substituted_test_drops_stale_result() {
        let mut t = Test::new("f(x)", "x");
        t.result = Some("SUCCESS: Got x".into());
        let subs: Substitutions = [("x".to_string(), "y".to_string())].into_iter().collect();
        let fresh = t.substituted(&subs);
        assert_eq!(fresh.stmt, "f(y)");
        assert_eq!(fresh.out, "y");
        assert!(fresh.result.is_none());
    }

    #[test]
    fn question_defaults_to_no_substitutions() {
        let q: Question = serde_json::from_str(r#"{"id": "Q1"}"#).unwrap();
        assert!(q.substitutions.is_empty());
    }
}
