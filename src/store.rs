#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Where exams, rosters, submissions and questions come from.
//!
//! The batch job talks to these through [`ExamStore`] and
//! [`QuestionSource`]. The local implementations read JSON files laid out
//! as `<data_dir>/<exam>/{exam,roster,submissions,questions}.json`.

use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    doctest::{self, ParseOptions},
    grade::Archetype,
    template::{FixupTable, SubstitutionMode},
    types::{Language, Question, Submission},
};

/// One template as stored in an exam document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Language the template is written in.
    #[serde(default)]
    pub language: Language,
    /// Template source with placeholders.
    pub template: String,
    /// Doctest transcript, in the language's prompt style.
    #[serde(default)]
    pub doctests: String,
    /// Parse the transcript in strict mode.
    #[serde(default)]
    pub strict:   bool,
    /// Globals defined once the program has loaded.
    #[serde(default)]
    pub bindings: BTreeMap<String, serde_json::Value>,
}

/// The grading-relevant part of an exam.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamDocument {
    /// Templates by name.
    #[serde(default)]
    pub templates:         BTreeMap<String, TemplateSpec>,
    /// Per-question answer fixups.
    #[serde(default)]
    pub fixups:            FixupTable,
    /// Where question substitutions apply.
    #[serde(default)]
    pub substitution_mode: SubstitutionMode,
}

impl ExamDocument {
    /// Parses every template's doctests once, producing the archetypes a
    /// batch grades against.
    pub fn archetypes(&self) -> Result<Vec<Archetype>> {
        self.templates
            .iter()
            .map(|(name, spec)| {
                let opts = ParseOptions::builder()
                    .prompt(spec.language.prompt())
                    .strict(spec.strict)
                    .build();
                let tests = doctest::parse(&spec.doctests, &opts)
                    .with_context(|| format!("Could not parse doctests for template {name}"))?;
                Ok(Archetype {
                    name: name.clone(),
                    language: spec.language,
                    template: spec.template.clone(),
                    tests,
                    bindings: spec.bindings.clone(),
                })
            })
            .collect()
    }
}

/// A student on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRosterEntry")]
pub struct RosterEntry {
    /// Student email, which keys submissions and the report.
    pub email:    String,
    /// Anything else the roster carries (deadlines, sections).
    pub metadata: serde_json::Value,
}

/// Accepted roster row shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRosterEntry {
    /// `{"email": ..., "metadata": ...}`
    Full {
        /// Student email.
        email:    String,
        /// Extra data.
        #[serde(default)]
        metadata: serde_json::Value,
    },
    /// `[email, metadata]`
    Pair(String, serde_json::Value),
    /// A bare email.
    Email(String),
}

impl From<RawRosterEntry> for RosterEntry {
    fn from(raw: RawRosterEntry) -> Self {
        let (email, metadata) = match raw {
            RawRosterEntry::Full { email, metadata } => (email, metadata),
            RawRosterEntry::Pair(email, metadata) => (email, metadata),
            RawRosterEntry::Email(email) => (email, serde_json::Value::Null),
        };
        Self { email, metadata }
    }
}

/// Source of exams, rosters and submissions.
pub trait ExamStore: Send + Sync {
    /// Fetches the exam document.
    fn get_exam(&self, exam: &str) -> impl Future<Output = Result<ExamDocument>> + Send;
    /// Fetches the roster.
    fn get_roster(&self, exam: &str) -> impl Future<Output = Result<Vec<RosterEntry>>> + Send;
    /// Fetches every student's latest answers, keyed by email.
    fn get_submissions(
        &self,
        exam: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, Submission>>> + Send;
}

/// Reads and decodes a JSON file.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Could not parse {}", path.display()))
}

/// An [`ExamStore`] backed by a directory per exam.
#[derive(Debug, Clone)]
pub struct LocalExamStore {
    /// Directory holding one subdirectory per exam.
    root: PathBuf,
}

impl LocalExamStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of `file` for `exam`.
    fn file(&self, exam: &str, file: &str) -> PathBuf {
        self.root.join(exam).join(file)
    }
}

impl ExamStore for LocalExamStore {
    async fn get_exam(&self, exam: &str) -> Result<ExamDocument> {
        read_json(&self.file(exam, "exam.json")).await
    }

    async fn get_roster(&self, exam: &str) -> Result<Vec<RosterEntry>> {
        read_json(&self.file(exam, "roster.json")).await
    }

    async fn get_submissions(&self, exam: &str) -> Result<BTreeMap<String, Submission>> {
        read_json(&self.file(exam, "submissions.json")).await
    }
}

/// Produces the per-student question list (with scrambling substitutions)
/// for an exam.
pub trait QuestionSource: Send + Sync {
    /// Returns `email`'s questions.
    fn extract_questions(&self, email: &str, exam: &ExamDocument) -> Result<Vec<Question>>;
}

/// Key in `questions.json` whose questions apply to students without their
/// own entry.
pub const DEFAULT_QUESTIONS_KEY: &str = "*";

/// A [`QuestionSource`] backed by a JSON map of email to questions.
#[derive(Debug, Clone, Default)]
pub struct LocalQuestionSource {
    /// Questions by email, with an optional `"*"` default.
    by_email: BTreeMap<String, Vec<Question>>,
}

impl LocalQuestionSource {
    /// Wraps an in-memory map.
    pub fn new(by_email: BTreeMap<String, Vec<Question>>) -> Self {
        Self { by_email }
    }

    /// Loads `questions.json` from `path`. A missing file yields an empty
    /// source.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!("{} not found; students get no questions", path.display());
            return Ok(Self::default());
        }
        Ok(Self::new(read_json(path).await?))
    }
}

impl QuestionSource for LocalQuestionSource {
    fn extract_questions(&self, email: &str, _exam: &ExamDocument) -> Result<Vec<Question>> {
        Ok(self
            .by_email
            .get(email)
            .or_else(|| self.by_email.get(DEFAULT_QUESTIONS_KEY))
            .cloned()
            .unwrap_or_default())
    }
}

/// Path of the submissions cache for `exam`.
pub fn submissions_cache_path(out_dir: &Path, exam: &str) -> PathBuf {
    out_dir.join(format!("{exam}_submissions.json"))
}

/// Reads a previously written submissions cache.
pub async fn read_submissions_cache(path: &Path) -> Result<BTreeMap<String, Submission>> {
    read_json(path).await
}

/// Writes the submissions cache.
pub async fn write_submissions_cache(
    path: &Path,
    submissions: &BTreeMap<String, Submission>,
) -> Result<()> {
    let raw = serde_json::to_string(submissions).context("Could not serialize submissions")?;
    tokio::fs::write(path, raw)
        .await
        .with_context(|| format!("Could not write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_accepts_several_shapes() {
        let roster: Vec<RosterEntry> = serde_json::from_str(
            r#"[{"email": "a@x.edu", "metadata": {"deadline": 5}}, ["b@x.edu", 10], "c@x.edu"]"#,
        )
        .unwrap();
        let emails: Vec<_> = roster.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, ["a@x.edu", "b@x.edu", "c@x.edu"]);
        assert_eq!(roster[1].metadata, serde_json::json!(10));
    }

    #[test]
    fn archetypes_use_language_prompt() {
        let exam: ExamDocument = serde_json::from_str(
            r#"{
                "templates": {
                    "sq": {"language": "scheme", "template": "{Q1}", "doctests": "scm> (sq 2)\n4"},
                    "py": {"template": "{Q2}", "doctests": ">>> f()\n1"}
                },
                "fixups": {"Q1": [{"strip_prefix": "return "}]}
            }"#,
        )
        .unwrap();
        let archetypes = exam.archetypes().unwrap();
        assert_eq!(archetypes.len(), 2);
        let py = &archetypes[0];
        assert_eq!(py.name, "py");
        assert_eq!(py.tests[0].stmt, "f()");
        let sq = &archetypes[1];
        assert_eq!(sq.language, Language::Scheme);
        assert_eq!(sq.tests[0].stmt, "(sq 2)");
        assert_eq!(sq.tests[0].out, "4");
        assert_eq!(exam.fixups.apply("Q1", "return x"), "x");
    }

    #[test]
    fn strict_templates_reject_continuations() {
        let exam: ExamDocument = serde_json::from_str(
            r#"{"templates": {"t": {"template": "", "strict": true, "doctests": ">>> f(\n... 1)\n2"}}}"#,
        )
        .unwrap();
        assert!(exam.archetypes().is_err());
    }

    #[test]
    fn question_source_falls_back_to_default() {
        let mut map = BTreeMap::new();
        map.insert(
            "*".to_string(),
            vec![Question {
                id:            "Q1".into(),
                substitutions: BTreeMap::new(),
            }],
        );
        let source = LocalQuestionSource::new(map);
        let qs = source
            .extract_questions("nobody@x.edu", &ExamDocument::default())
            .unwrap();
        assert_eq!(qs.len(), 1);
    }

    #[tokio::test]
    async fn local_store_reads_exam_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exam_dir = dir.path().join("final");
        std::fs::create_dir_all(&exam_dir).unwrap();
        std::fs::write(exam_dir.join("exam.json"), r#"{"templates": {}}"#).unwrap();
        std::fs::write(exam_dir.join("roster.json"), r#"["a@x.edu"]"#).unwrap();
        std::fs::write(exam_dir.join("submissions.json"), r#"{"a@x.edu": {"Q1": "x"}}"#).unwrap();

        let store = LocalExamStore::new(dir.path());
        assert!(store.get_exam("final").await.unwrap().templates.is_empty());
        assert_eq!(store.get_roster("final").await.unwrap()[0].email, "a@x.edu");
        let subs = store.get_submissions("final").await.unwrap();
        assert_eq!(subs["a@x.edu"]["Q1"], serde_json::json!("x"));

        assert!(store.get_exam("missing").await.is_err());
    }
}
