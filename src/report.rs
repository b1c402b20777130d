#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Transcripts, snapshot contents, and the aggregate grading report.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, object::Rows},
};

use crate::{
    compare::NOT_EXECUTED,
    types::{Language, TemplateOutcome},
};

/// Load status shown when the program ran cleanly.
pub const NO_ISSUES: &str = "No issues";

/// Formats a statement the way an interactive session would echo it.
fn echo_statement(prompt: &str, stmt: &str) -> String {
    format!("{prompt}{}", stmt.trim().split('\n').join("\n... "))
}

/// Renders the transcript recorded in the report for one
/// (student, template) pair.
///
/// The first line is the snapshot reference, the second the load status, and
/// each test follows as the echoed statement and its verdict.
pub fn render_transcript(reference: &str, outcome: &TemplateOutcome) -> String {
    let status = outcome.execution.status.as_deref().unwrap_or(NO_ISSUES);
    let tests = outcome
        .tests
        .iter()
        .map(|test| {
            format!(
                "{}\n{}",
                echo_statement(">>> ", &test.stmt),
                test.result.as_deref().unwrap_or(NOT_EXECUTED)
            )
        })
        .join("\n");
    format!("{reference}\n{status}\n{tests}")
}

/// File name of the snapshot for `outcome`.
pub fn snapshot_name(language: Language, outcome: &TemplateOutcome) -> String {
    format!("{}.{}", outcome.display_name, language.extension())
}

/// Contents of the snapshot for `outcome`: the program followed by its
/// cases, laid out so the file still runs.
pub fn snapshot_contents(language: Language, outcome: &TemplateOutcome) -> String {
    match language {
        Language::Python => {
            let cases = outcome
                .tests
                .iter()
                .enumerate()
                .map(|(i, test)| {
                    let mut case = format!("# Case {i}\n{}", echo_statement(">>> ", &test.stmt));
                    if !test.out.is_empty() {
                        case.push('\n');
                        case.push_str(test.out.trim());
                    }
                    case
                })
                .join("\n");
            format!(
                "{}\n\n\ndef placeholder():\n    pass\n\n\nplaceholder.__doc__ = '''\n{cases}\n'''\n",
                outcome.program
            )
        }
        Language::Scheme => {
            let cases = outcome
                .tests
                .iter()
                .enumerate()
                .map(|(i, test)| {
                    let mut lines = vec![format!("; Case {i}")];
                    lines.extend(test.stmt.trim().lines().map(|l| format!("; scm> {l}")));
                    lines.extend(test.out.trim().lines().map(|l| format!("; {l}")));
                    lines.join("\n")
                })
                .join("\n");
            format!("{}\n\n{cases}\n", outcome.program)
        }
    }
}

/// Transcripts for every graded student: email, then template name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradingReport(BTreeMap<String, BTreeMap<String, String>>);

impl GradingReport {
    /// An empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every transcript for one student, replacing any earlier entry.
    pub fn insert_student(&mut self, email: impl Into<String>, transcripts: BTreeMap<String, String>) {
        self.0.insert(email.into(), transcripts);
    }

    /// Returns true if `email` has been graded.
    pub fn contains(&self, email: &str) -> bool {
        self.0.contains_key(email)
    }

    /// Returns one student's transcripts.
    pub fn student(&self, email: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(email)
    }

    /// Number of graded students.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no student has been graded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(email, transcripts)` in email order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, String>)> {
        self.0.iter()
    }

    /// Reads a report written earlier. A missing file is an empty report.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self::new());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Could not read report {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Could not parse report {}", path.display()))
    }

    /// Writes the report, replacing `path` only once the new contents are
    /// fully on disk.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string(self).context("Could not serialize report")?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, raw)
            .await
            .with_context(|| format!("Could not write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Could not move report into place at {}", path.display()))
    }
}

/// Path of the report for `exam`.
pub fn report_path(out_dir: &Path, exam: &str) -> PathBuf {
    out_dir.join(format!("{exam}_doctests.json"))
}

/// Pass/fail counts for one template across a report.
#[derive(Tabled, Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSummary {
    /// Template name.
    #[tabled(rename = "Template")]
    pub template:     String,
    /// Students with a transcript for this template.
    #[tabled(rename = "Students")]
    pub students:     usize,
    /// Students whose program loaded cleanly.
    #[tabled(rename = "Loaded")]
    pub loaded:       usize,
    /// Passing test verdicts.
    #[tabled(rename = "Passed")]
    pub passed:       usize,
    /// Failing test verdicts.
    #[tabled(rename = "Failed")]
    pub failed:       usize,
    /// Tests that never ran.
    #[tabled(rename = "Not executed")]
    pub not_executed: usize,
}

/// Counts verdicts per template.
pub fn summarize(report: &GradingReport) -> Vec<TemplateSummary> {
    let mut by_template: BTreeMap<&str, TemplateSummary> = BTreeMap::new();
    for (_, transcripts) in report.iter() {
        for (template, transcript) in transcripts {
            let entry = by_template
                .entry(template.as_str())
                .or_insert_with(|| TemplateSummary {
                    template: template.clone(),
                    ..TemplateSummary::default()
                });
            entry.students += 1;
            let mut lines = transcript.lines().skip(1);
            if lines.next() == Some(NO_ISSUES) {
                entry.loaded += 1;
            }
            for line in lines {
                if line.starts_with("SUCCESS: ") {
                    entry.passed += 1;
                } else if line.starts_with("FAILED: ") {
                    entry.failed += 1;
                } else if line == NOT_EXECUTED {
                    entry.not_executed += 1;
                }
            }
        }
    }
    by_template.into_values().collect()
}

/// Renders summaries as a table.
pub fn summary_table(rows: &[TemplateSummary], students: usize) -> String {
    Table::new(rows)
        .with(Panel::header("Grading Summary"))
        .with(Panel::footer(format!("{students} students")))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(
            Modify::new(Rows::last())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}
