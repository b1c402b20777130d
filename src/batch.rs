#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grades a whole roster.
//!
//! Each student is graded on its own task, at most `workers` at a time.
//! Results flow back to the driver, which alone owns the report: it
//! checkpoints every few students and always writes the report on the way
//! out, whether the run finished, failed, or was interrupted.

use std::{collections::BTreeMap, ffi::OsString, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bon::Builder;
use futures::StreamExt;

use crate::{
    config,
    grade::{self, Archetype, GradeSettings},
    report::{self, GradingReport},
    snapshot::{self, SnapshotRequest, SnapshotService},
    store::{self, ExamDocument, ExamStore, QuestionSource},
    types::Submission,
};

/// What to grade and how.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct BatchOptions {
    /// Exam id.
    #[builder(getter)]
    exam:             String,
    /// Students graded concurrently.
    #[builder(default = 1)]
    workers:          usize,
    /// Read submissions from the local cache instead of the store.
    #[builder(default)]
    cached:           bool,
    /// Skip students already present in an existing report.
    #[builder(default)]
    resume:           bool,
    /// Students graded between checkpoints.
    #[builder(default = config::DEFAULT_CHECKPOINT_EVERY)]
    checkpoint_every: usize,
    /// Deadline for loading each program and for each test.
    #[builder(default = Duration::from_secs(config::DEFAULT_TIMEOUT_SECS))]
    timeout:          Duration,
    /// Python interpreter for Python templates.
    #[builder(into)]
    python:           OsString,
    /// Where the report and submissions cache go.
    #[builder(into)]
    out_dir:          PathBuf,
}

/// How a batch went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Students graded in this run.
    pub graded:      usize,
    /// Students whose grading failed; they are absent from the report.
    pub failed:      usize,
    /// Students skipped because the report already had them.
    pub skipped:     usize,
    /// Whether the run was cut short by Ctrl-C.
    pub interrupted: bool,
    /// Where the report was written.
    pub report_path: PathBuf,
}

/// Everything a student task needs, shared across tasks.
struct Shared<Q, N> {
    /// Parsed templates.
    archetypes: Vec<Archetype>,
    /// The exam document, for the question source.
    exam:       ExamDocument,
    /// Question source.
    questions:  Arc<Q>,
    /// Snapshot service.
    snapshots:  Arc<N>,
    /// Grading settings.
    settings:   GradeSettings,
}

/// Grades one student against every template, returning transcripts by
/// template name.
async fn grade_student<Q, N>(
    shared: Arc<Shared<Q, N>>,
    email: String,
    submission: Submission,
) -> Result<BTreeMap<String, String>>
where
    Q: QuestionSource,
    N: SnapshotService,
{
    let questions = grade::questions_by_id(
        shared
            .questions
            .extract_questions(&email, &shared.exam)
            .with_context(|| format!("Could not get questions for {email}"))?,
    );

    let mut transcripts = BTreeMap::new();
    for archetype in &shared.archetypes {
        let outcome =
            grade::grade_template(archetype, &submission, &questions, &shared.settings).await?;
        let request = SnapshotRequest::staff(
            report::snapshot_name(archetype.language, &outcome),
            report::snapshot_contents(archetype.language, &outcome),
        );
        let reference = snapshot::create_or_placeholder(shared.snapshots.as_ref(), request).await;
        tracing::debug!(
            email = %email,
            template = %archetype.name,
            status = outcome.execution.status.as_deref().unwrap_or("ok"),
            "graded"
        );
        transcripts.insert(archetype.name.clone(), report::render_transcript(&reference, &outcome));
    }
    Ok(transcripts)
}

/// Fetches submissions from the store, or from the cache with `cached`.
async fn load_submissions<S: ExamStore>(
    store: &S,
    opts: &BatchOptions,
) -> Result<BTreeMap<String, Submission>> {
    let cache = store::submissions_cache_path(&opts.out_dir, &opts.exam);
    if opts.cached {
        tracing::info!("Reading cached submissions from {}", cache.display());
        return store::read_submissions_cache(&cache).await;
    }

    let submissions = store
        .get_submissions(&opts.exam)
        .await
        .with_context(|| format!("Could not fetch submissions for {}", opts.exam))?;
    store::write_submissions_cache(&cache, &submissions).await?;
    Ok(submissions)
}

/// Grades every student on the roster of `opts.exam`.
pub async fn run_batch<S, Q, N>(
    store: &S,
    questions: Arc<Q>,
    snapshots: Arc<N>,
    opts: &BatchOptions,
) -> Result<BatchSummary>
where
    S: ExamStore,
    Q: QuestionSource + 'static,
    N: SnapshotService + 'static,
{
    tokio::fs::create_dir_all(&opts.out_dir)
        .await
        .with_context(|| format!("Could not create {}", opts.out_dir.display()))?;
    let report_path = report::report_path(&opts.out_dir, &opts.exam);
    let mut report = if opts.resume {
        let existing = GradingReport::load(&report_path).await?;
        tracing::info!("Resuming with {} students already graded", existing.len());
        existing
    } else {
        GradingReport::new()
    };

    let mut summary = BatchSummary {
        report_path: report_path.clone(),
        ..BatchSummary::default()
    };
    let outcome = drive(store, questions, snapshots, opts, &mut report, &mut summary).await;

    report
        .save(&report_path)
        .await
        .with_context(|| format!("Could not write final report for {}", opts.exam))?;
    tracing::info!(
        "Wrote {} ({} graded, {} failed, {} skipped)",
        report_path.display(),
        summary.graded,
        summary.failed,
        summary.skipped
    );

    outcome.map(|()| summary)
}

/// The body of [`run_batch`], separated so the report is written however
/// this returns.
async fn drive<S, Q, N>(
    store: &S,
    questions: Arc<Q>,
    snapshots: Arc<N>,
    opts: &BatchOptions,
    report: &mut GradingReport,
    summary: &mut BatchSummary,
) -> Result<()>
where
    S: ExamStore,
    Q: QuestionSource + 'static,
    N: SnapshotService + 'static,
{
    let exam = store
        .get_exam(&opts.exam)
        .await
        .with_context(|| format!("Could not fetch exam {}", opts.exam))?;
    let archetypes = exam.archetypes()?;
    let mut submissions = load_submissions(store, opts).await?;
    let roster = store
        .get_roster(&opts.exam)
        .await
        .with_context(|| format!("Could not fetch roster for {}", opts.exam))?;

    let settings = GradeSettings::builder()
        .fixups(Arc::new(exam.fixups.clone()))
        .mode(exam.substitution_mode)
        .timeout(opts.timeout)
        .python(opts.python.clone())
        .build();

    let mut pending = Vec::new();
    for entry in roster {
        if report.contains(&entry.email) {
            summary.skipped += 1;
            continue;
        }
        let submission = submissions.remove(&entry.email).unwrap_or_else(|| {
            tracing::debug!(email = %entry.email, "no submission; grading blank answers");
            Submission::default()
        });
        pending.push((entry.email, submission));
    }

    let total = pending.len();
    tracing::info!(
        "Grading {total} students across {} templates with {} workers",
        archetypes.len(),
        opts.workers
    );

    let shared = Arc::new(Shared {
        archetypes,
        exam,
        questions,
        snapshots,
        settings,
    });

    let mut results = futures::stream::iter(pending.into_iter().map(|(email, submission)| {
        let shared = Arc::clone(&shared);
        async move {
            let task = tokio::spawn(grade_student(shared, email.clone(), submission));
            (email, task.await)
        }
    }))
    .buffer_unordered(opts.workers.max(1));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut done = 0usize;
    loop {
        tokio::select! {
            next = results.next() => {
                let Some((email, joined)) = next else { break };
                done += 1;
                match joined {
                    Ok(Ok(transcripts)) => {
                        report.insert_student(email, transcripts);
                        summary.graded += 1;
                    }
                    Ok(Err(err)) => {
                        tracing::error!(email = %email, "Grading failed: {err:#}");
                        summary.failed += 1;
                    }
                    Err(join_err) => {
                        tracing::error!(email = %email, "Grading task panicked: {join_err}");
                        summary.failed += 1;
                    }
                }

                if opts.checkpoint_every > 0 && done % opts.checkpoint_every == 0 {
                    tracing::info!("Graded {done}/{total} students");
                    if let Err(err) = report.save(&summary.report_path).await {
                        tracing::warn!("Checkpoint failed: {err:#}");
                    }
                }
            }
            _ = &mut ctrl_c => {
                tracing::warn!("Interrupted; no further students will be started");
                summary.interrupted = true;
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        snapshot::DisabledSnapshots,
        store::{LocalExamStore, LocalQuestionSource},
    };

    fn write_exam(root: &std::path::Path) {
        let exam_dir = root.join("quiz");
        std::fs::create_dir_all(&exam_dir).unwrap();
        std::fs::write(
            exam_dir.join("exam.json"),
            r#"{"templates": {"double": {"language": "scheme",
                "template": "(define (double x) {Q1})",
                "doctests": "scm> (double 2)\n4\nscm> (double 5)\n10"}}}"#,
        )
        .unwrap();
        std::fs::write(
            exam_dir.join("roster.json"),
            r#"["good@x.edu", "bad@x.edu", "absent@x.edu"]"#,
        )
        .unwrap();
        std::fs::write(
            exam_dir.join("submissions.json"),
            r#"{"good@x.edu": {"Q1": "(* 2 x)"}, "bad@x.edu": {"Q1": "(+ x"}}"#,
        )
        .unwrap();
    }

    fn questions() -> Arc<LocalQuestionSource> {
        let mut map = BTreeMap::new();
        map.insert(
            "*".to_string(),
            vec![crate::types::Question {
                id:            "Q1".into(),
                substitutions: BTreeMap::new(),
            }],
        );
        Arc::new(LocalQuestionSource::new(map))
    }

    #[tokio::test]
    async fn grades_roster_and_writes_report() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_exam(data.path());
        let store = LocalExamStore::new(data.path());

        let opts = BatchOptions::builder()
            .exam("quiz")
            .python("python3")
            .out_dir(out.path())
            .workers(2)
            .build();
        let summary = run_batch(&store, questions(), Arc::new(DisabledSnapshots), &opts)
            .await
            .unwrap();
        assert_eq!(summary.graded, 3);
        assert_eq!(summary.skipped, 0);
        assert!(!summary.interrupted);

        let report = GradingReport::load(&summary.report_path).await.unwrap();
        let good = &report.student("good@x.edu").unwrap()["double"];
        assert_eq!(
            good,
            "temp\nNo issues\n>>> (double 2)\nSUCCESS: Got 4\n>>> (double 5)\nSUCCESS: Got 10"
        );
        let bad = &report.student("bad@x.edu").unwrap()["double"];
        assert!(bad.contains("SyntaxError"));
        assert!(bad.ends_with("DID NOT EXECUTE"));
        assert!(out.path().join("quiz_submissions.json").exists());
    }

    #[tokio::test]
    async fn students_without_a_submission_are_graded_blank() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_exam(data.path());
        let store = LocalExamStore::new(data.path());

        let opts = BatchOptions::builder()
            .exam("quiz")
            .python("python3")
            .out_dir(out.path())
            .build();
        let summary = run_batch(&store, questions(), Arc::new(DisabledSnapshots), &opts)
            .await
            .unwrap();
        assert_eq!(summary.failed, 0);

        let report = GradingReport::load(&summary.report_path).await.unwrap();
        let absent = &report.student("absent@x.edu").unwrap()["double"];
        assert!(absent.starts_with("temp\n"), "{absent}");
        assert!(!absent.contains("No issues"), "{absent}");
        assert!(absent.ends_with(">>> (double 5)\nDID NOT EXECUTE"), "{absent}");
    }

    #[tokio::test]
    async fn resume_skips_graded_students_and_cache_avoids_store() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_exam(data.path());
        let store = LocalExamStore::new(data.path());

        let first = BatchOptions::builder()
            .exam("quiz")
            .python("python3")
            .out_dir(out.path())
            .build();
        run_batch(&store, questions(), Arc::new(DisabledSnapshots), &first)
            .await
            .unwrap();

        std::fs::remove_file(data.path().join("quiz").join("submissions.json")).unwrap();
        let again = BatchOptions::builder()
            .exam("quiz")
            .python("python3")
            .out_dir(out.path())
            .resume(true)
            .cached(true)
            .build();
        let summary = run_batch(&store, questions(), Arc::new(DisabledSnapshots), &again)
            .await
            .unwrap();
        assert_eq!(summary.graded, 0);
        assert_eq!(summary.skipped, 3);
    }

    #[tokio::test]
    async fn store_failures_still_write_report() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let store = LocalExamStore::new(data.path());

        let opts = BatchOptions::builder()
            .exam("quiz")
            .python("python3")
            .out_dir(out.path())
            .build();
        let err = run_batch(&store, questions(), Arc::new(DisabledSnapshots), &opts)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Could not fetch exam quiz"));
        assert!(out.path().join("quiz_doctests.json").exists());
    }
}
