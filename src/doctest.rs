#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Parsing of instructor-written doctest transcripts.
//!
//! A transcript looks like an interactive session:
//!
//! ```text
//! >>> f(2)
//! 3
//!
//! >>> def g():
//! ...     return 1
//! >>> g()
//! 1
//! ```
//!
//! Lenient mode accepts continuation lines and multi-line output. Strict mode
//! rejects both; the batch grader and the `doctests` command choose
//! independently which one they need.

use bon::Builder;
use itertools::Itertools;

use crate::{error::DoctestError, types::Test};

/// Marker that continues the previous statement onto another line.
pub const CONTINUATION: &str = "... ";

/// How a transcript should be read.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct ParseOptions {
    /// Prompt that opens a new test.
    #[builder(default = ">>> ".to_string())]
    prompt: String,
    /// Reject continuation lines and multi-line output.
    #[builder(default = false)]
    strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ParseOptions {
    /// Lenient options for the given prompt.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self::builder().prompt(prompt).build()
    }

    /// Returns the prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns whether strict mode is on.
    pub fn strict(&self) -> bool {
        self.strict
    }
}

/// Iterator over the tests in a transcript.
///
/// Every call to [`Doctests::new`] starts from the top, so the same
/// transcript can be walked any number of times with identical results.
pub struct Doctests<'a> {
    /// Remaining numbered lines.
    lines:    std::iter::Enumerate<std::str::Lines<'a>>,
    /// Parse options.
    opts:     &'a ParseOptions,
    /// Test currently being accumulated.
    current:  Option<Test>,
    /// Output lines seen for `current`.
    out_seen: usize,
    /// Set once an error has been yielded.
    failed:   bool,
}

impl<'a> Doctests<'a> {
    /// Starts reading `transcript`.
    pub fn new(transcript: &'a str, opts: &'a ParseOptions) -> Self {
        Self {
            lines: transcript.lines().enumerate(),
            opts,
            current: None,
            out_seen: 0,
            failed: false,
        }
    }

    /// Returns the continuation text if `line` is a continuation line.
    fn continuation(line: &str) -> Option<&str> {
        if line == CONTINUATION.trim_end() {
            Some("")
        } else {
            line.strip_prefix(CONTINUATION)
        }
    }
}

impl Iterator for Doctests<'_> {
    type Item = Result<Test, DoctestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        for (idx, raw) in self.lines.by_ref() {
            let line = raw.trim();
            let line_no = idx + 1;

            if line.is_empty() {
                if let Some(done) = self.current.take() {
                    return Some(Ok(done));
                }
                continue;
            }

            if let Some(stmt) = line.strip_prefix(self.opts.prompt()) {
                let done = self.current.replace(Test::new(stmt, ""));
                self.out_seen = 0;
                if let Some(done) = done {
                    return Some(Ok(done));
                }
                continue;
            }

            let Some(case) = self.current.as_mut() else {
                continue;
            };

            if let Some(rest) = Self::continuation(line) {
                if self.opts.strict() {
                    self.failed = true;
                    return Some(Err(DoctestError::Continuation { line: line_no }));
                }
                case.stmt.push('\n');
                case.stmt.push_str(rest);
                continue;
            }

            if self.opts.strict() && self.out_seen >= 1 {
                self.failed = true;
                return Some(Err(DoctestError::MultipleOutputLines {
                    line: line_no,
                    stmt: case.stmt.clone(),
                }));
            }
            if self.out_seen > 0 {
                case.out.push('\n');
            }
            case.out.push_str(line);
            self.out_seen += 1;
        }

        self.current.take().map(Ok)
    }
}

/// Parses every test in `transcript`.
pub fn parse(transcript: &str, opts: &ParseOptions) -> Result<Vec<Test>, DoctestError> {
    Doctests::new(transcript, opts).collect()
}

/// Writes `tests` back out as a transcript that [`parse`] reads back into
/// the same tests.
pub fn render_back(tests: &[Test], opts: &ParseOptions) -> String {
    tests
        .iter()
        .map(|test| {
            let stmt = test
                .stmt
                .split('\n')
                .join(&format!("\n{CONTINUATION}"));
            if test.out.is_empty() {
                format!("{}{stmt}", opts.prompt())
            } else {
                format!("{}{stmt}\n{}", opts.prompt(), test.out)
            }
        })
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lenient() -> ParseOptions {
        ParseOptions::default()
    }

    #[test]
    fn parses_single_case() {
        let tests = parse(">>> f(2)\n3", &lenient()).unwrap();
        assert_eq!(tests, vec![Test::new("f(2)", "3")]);
    }

    #[test]
    fn blank_line_terminates_case() {
        let src = ">>> a\n1\n\n>>> b\n2\n";
        let tests = parse(src, &lenient()).unwrap();
        assert_eq!(tests, vec![Test::new("a", "1"), Test::new("b", "2")]);
    }

    #[test]
    fn prompt_flushes_previous_case() {
        let src = ">>> x = 1\n>>> x\n1";
        let tests = parse(src, &lenient()).unwrap();
        assert_eq!(tests, vec![Test::new("x = 1", ""), Test::new("x", "1")]);
    }

    #[test]
    fn continuation_lines_join_statement() {
        let src = "  >>> for i in range(2):\n  ...     print(i)\n  0\n  1\n";
        let tests = parse(src, &lenient()).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].stmt, "for i in range(2):\n    print(i)");
        assert_eq!(tests[0].out, "0\n1");
    }

    #[test]
    fn bare_ellipsis_is_empty_continuation() {
        let tests = parse(">>> def f():\n...     pass\n...\n>>> f()", &lenient()).unwrap();
        assert_eq!(tests[0].stmt, "def f():\n    pass\n");
        assert_eq!(tests[1].stmt, "f()");
    }

    #[test]
    fn text_before_first_prompt_is_ignored() {
        let tests = parse("Some prose.\n>>> 1 + 1\n2", &lenient()).unwrap();
        assert_eq!(tests, vec![Test::new("1 + 1", "2")]);
    }

    #[test]
    fn strict_rejects_continuation() {
        let opts = ParseOptions::builder().strict(true).build();
        let err = parse(">>> if x:\n...     y\n", &opts).unwrap_err();
        assert_eq!(err, DoctestError::Continuation { line: 2 });
    }

    #[test]
    fn strict_rejects_second_output_line() {
        let opts = ParseOptions::builder().strict(true).build();
        let err = parse(">>> print(1, 2, sep='\\n')\n1\n2", &opts).unwrap_err();
        assert!(matches!(err, DoctestError::MultipleOutputLines { line: 3, .. }));
    }

    #[test]
    fn strict_accepts_simple_transcript() {
        let opts = ParseOptions::builder().strict(true).build();
        let tests = parse(">>> f(1)\n2\n>>> f(2)\n3", &opts).unwrap();
        assert_eq!(tests.len(), 2);
    }

    #[test]
    fn scheme_prompt() {
        let opts = ParseOptions::with_prompt("scm> ");
        let tests = parse("scm> (f 2)\n3\nscm> (g)\n", &opts).unwrap();
        assert_eq!(tests, vec![Test::new("(f 2)", "3"), Test::new("(g)", "")]);
    }

    #[test]
    fn iteration_is_restartable() {
        let src = ">>> a\n1\n\n>>> b\n...  c\n2\n3";
        let opts = lenient();
        let first: Vec<_> = Doctests::new(src, &opts).collect();
        let second: Vec<_> = Doctests::new(src, &opts).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn reparsing_rendered_transcript_is_stable() {
        let transcripts = [
            ">>> f(2)\n3",
            ">>> def g(x):\n...     if x:\n...         return 1\n...\n>>> g(1)\n1\n\n>>> g(0)",
            "intro\n>>> print('a\\nb')\na\nb\n>>> 5\n5\n\n\n",
        ];
        let opts = lenient();
        for src in transcripts {
            let once = parse(src, &opts).unwrap();
            let twice = parse(&render_back(&once, &opts), &opts).unwrap();
            assert_eq!(once, twice, "transcript: {src:?}");
        }
    }
}
