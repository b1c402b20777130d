#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Renders a student's answers into an instructor's code template.
//!
//! Placeholders are written `{KEY}`. Prefixing the key with `n` underscores
//! (`{____KEY}`) inserts the same answer re-indented by `n` spaces, for any
//! multiple of four up to [`MAX_INDENT`]. `{{` and `}}` produce literal
//! braces. Unknown placeholders render as the empty string.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    error::RenderError,
    types::{Question, Submission, Substitutions},
};

/// Deepest indentation level a placeholder can request.
pub const MAX_INDENT: usize = 44;

/// Width a tab expands to in answers.
const TAB_WIDTH: usize = 4;

/// One textual clean-up applied to an answer before it is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fixup {
    /// Remove this prefix if the answer starts with it.
    StripPrefix(String),
    /// Remove this suffix if the answer ends with it.
    StripSuffix(String),
}

impl Fixup {
    /// Applies the fixup to `value`.
    fn apply<'a>(&self, value: &'a str) -> &'a str {
        match self {
            Fixup::StripPrefix(prefix) => value.strip_prefix(prefix.as_str()).unwrap_or(value),
            Fixup::StripSuffix(suffix) => value.strip_suffix(suffix.as_str()).unwrap_or(value),
        }
    }
}

/// Per-question fixups, run in order.
///
/// Some prompts ask students to "complete the body", and the stored answer
/// then repeats a keyword the template already supplies (`return `, `if `,
/// ...). The table removes those, keyed by question id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixupTable(BTreeMap<String, Vec<Fixup>>);

impl FixupTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixup for `question`, after any already registered.
    pub fn push(&mut self, question: impl Into<String>, fixup: Fixup) -> &mut Self {
        self.0.entry(question.into()).or_default().push(fixup);
        self
    }

    /// Runs every fixup registered for `question` over `value`.
    pub fn apply(&self, question: &str, value: &str) -> String {
        let Some(fixups) = self.0.get(question) else {
            return value.to_string();
        };
        fixups
            .iter()
            .fold(value, |acc, fixup| fixup.apply(acc))
            .to_string()
    }
}

/// Where question substitutions are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstitutionMode {
    /// Rewrite the final program text, the tests and the template's display
    /// name.
    #[default]
    Everywhere,
    /// Rewrite only the answers before they are inserted.
    AnswersOnly,
}

/// A template filled in for one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedProgram {
    /// Executable source.
    source:        String,
    /// Substitutions collected from the questions that were answered.
    substitutions: Substitutions,
    /// Whether `substitutions` still need applying to tests and names.
    mode:          SubstitutionMode,
}

impl RenderedProgram {
    /// Returns the executable source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the substitutions that tests and names should go through:
    /// the collected table in `Everywhere` mode, an empty one otherwise.
    pub fn substitutions(&self) -> Substitutions {
        match self.mode {
            SubstitutionMode::Everywhere => self.substitutions.clone(),
            SubstitutionMode::AnswersOnly => Substitutions::new(),
        }
    }

    /// Applies this program's substitutions to an arbitrary string, such as
    /// a template name.
    pub fn substitute(&self, s: &str) -> String {
        match self.mode {
            SubstitutionMode::Everywhere => self.substitutions.apply(s),
            SubstitutionMode::AnswersOnly => s.to_string(),
        }
    }
}

/// Cleans up a raw answer: tabs, surrounding whitespace, wrapping backticks
/// and a trailing colon.
pub fn normalize_answer(value: &str) -> String {
    let value = value.replace('\t', &" ".repeat(TAB_WIDTH));
    let mut value = value.trim();

    if value.starts_with('`') && value.ends_with('`') {
        value = if value.len() >= 2 {
            &value[1..value.len() - 1]
        } else {
            ""
        };
    }

    value.strip_suffix(':').unwrap_or(value).to_string()
}

/// Prefixes every line of `value` with `width` spaces.
pub fn indent(value: &str, width: usize) -> String {
    if width == 0 {
        return value.to_string();
    }
    let pad = " ".repeat(width);
    value
        .split('\n')
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fills `{name}` placeholders in `template` from `data`. Missing names
/// render as the empty string.
pub fn fill(template: &str, data: &HashMap<String, String>) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, c)| c == '{').is_some() {
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for (inner_pos, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(RenderError::NestedPlaceholder { position: inner_pos }),
                        other => name.push(other),
                    }
                }
                if !closed {
                    return Err(RenderError::UnclosedPlaceholder { position: pos });
                }
                if let Some(value) = data.get(&name) {
                    out.push_str(value);
                }
            }
            '}' => {
                if chars.next_if(|&(_, c)| c == '}').is_some() {
                    out.push('}');
                } else {
                    return Err(RenderError::StrayClosingBrace { position: pos });
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Renders `template` for one student.
///
/// Only string answers to known questions whose id occurs in the template
/// take part. Rendering never fails because of a missing or odd answer; it
/// only fails on a malformed template.
pub fn render(
    template: &str,
    submission: &Submission,
    questions: &BTreeMap<String, Question>,
    fixups: &FixupTable,
    mode: SubstitutionMode,
) -> Result<RenderedProgram, RenderError> {
    let mut substitutions = Substitutions::new();
    let mut data = HashMap::new();

    for (key, value) in submission {
        let Some(question) = questions.get(key) else {
            continue;
        };
        let Some(value) = value.as_str() else {
            continue;
        };
        if !template.contains(key.as_str()) {
            continue;
        }

        substitutions.extend(&question.substitutions);

        let value = match mode {
            SubstitutionMode::Everywhere => value.to_string(),
            SubstitutionMode::AnswersOnly => question
                .substitutions
                .iter()
                .fold(value.to_string(), |acc, (from, to)| {
                    if from.is_empty() { acc } else { acc.replace(from.as_str(), to) }
                }),
        };

        let value = normalize_answer(&value);
        let value = fixups.apply(key, &value);
        let value = value.trim();

        for level in (0..=MAX_INDENT).step_by(4) {
            data.insert(format!("{}{key}", "_".repeat(level)), indent(value, level));
        }
    }

    let filled = fill(template, &data)?;
    let source = match mode {
        SubstitutionMode::Everywhere => substitutions.apply(&filled),
        SubstitutionMode::AnswersOnly => filled,
    };

    Ok(RenderedProgram {
        source,
        substitutions,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn questions(ids: &[&str]) -> BTreeMap<String, Question> {
        ids.iter()
            .map(|id| {
                (
                    id.to_string(),
                    Question {
                        id:            id.to_string(),
                        substitutions: BTreeMap::new(),
                    },
                )
            })
            .collect()
    }

    fn submission(pairs: &[(&str, serde_json::Value)]) -> Submission {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn fills_answer_at_requested_depth() {
        let template = "def f(x):\n{____BODY}\n";
        let sub = submission(&[("BODY", json!("y = x\nreturn y"))]);
        let out = render(
            template,
            &sub,
            &questions(&["BODY"]),
            &FixupTable::new(),
            SubstitutionMode::Everywhere,
        )
        .unwrap();
        assert_eq!(out.source(), "def f(x):\n    y = x\n    return y\n");
    }

    #[test]
    fn every_level_indents_every_line() {
        let value = "a\n  b\nc";
        for level in (0..=MAX_INDENT).step_by(4) {
            let rendered = indent(value, level);
            let lines: Vec<_> = rendered.split('\n').collect();
            assert_eq!(lines.len(), 3);
            for (orig, line) in value.split('\n').zip(lines) {
                assert_eq!(line, format!("{}{orig}", " ".repeat(level)));
            }
        }
    }

    #[test]
    fn missing_answer_renders_blank() {
        let out = render(
            "return {KEY}",
            &Submission::new(),
            &questions(&["KEY"]),
            &FixupTable::new(),
            SubstitutionMode::Everywhere,
        )
        .unwrap();
        assert_eq!(out.source(), "return ");
    }

    #[test]
    fn non_string_and_unknown_answers_are_ignored() {
        let sub = submission(&[("KEY", json!(3)), ("OTHER", json!("x"))]);
        let out = render(
            "{KEY}|{OTHER}",
            &sub,
            &questions(&["KEY"]),
            &FixupTable::new(),
            SubstitutionMode::Everywhere,
        )
        .unwrap();
        assert_eq!(out.source(), "|");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let data = HashMap::from([("K".to_string(), "1".to_string())]);
        assert_eq!(fill("d = {{'k': {K}}}", &data).unwrap(), "d = {'k': 1}");
    }

    #[test]
    fn malformed_templates_are_errors() {
        let data = HashMap::new();
        assert_eq!(fill("x = {", &data), Err(RenderError::UnclosedPlaceholder { position: 4 }));
        assert_eq!(fill("x = }", &data), Err(RenderError::StrayClosingBrace { position: 4 }));
        assert_eq!(fill("{a{b}", &data), Err(RenderError::NestedPlaceholder { position: 2 }));
    }

    #[test]
    fn normalizes_answers() {
        assert_eq!(normalize_answer("  `x + 1`  "), "x + 1");
        assert_eq!(normalize_answer("if x > 0:"), "if x > 0");
        assert_eq!(normalize_answer("a\tb"), "a    b");
        assert_eq!(normalize_answer("`"), "");
        assert_eq!(normalize_answer("x::"), "x:");
    }

    #[test]
    fn fixups_run_in_order_then_retrim() {
        let mut table = FixupTable::new();
        table
            .push("Q", Fixup::StripPrefix("for ".into()))
            .push("Q", Fixup::StripPrefix("k ".into()))
            .push("Q", Fixup::StripPrefix("in ".into()));
        assert_eq!(table.apply("Q", "for k in range(3)"), "range(3)");
        assert_eq!(table.apply("Q", "k in lst"), "lst");
        assert_eq!(table.apply("OTHER", "for k in lst"), "for k in lst");

        let sub = submission(&[("Q", json!("return   x"))]);
        let mut ret = FixupTable::new();
        ret.push("Q", Fixup::StripPrefix("return".into()));
        let out = render("{Q}", &sub, &questions(&["Q"]), &ret, SubstitutionMode::Everywhere)
            .unwrap();
        assert_eq!(out.source(), "x");
    }

    #[test]
    fn fixup_table_deserializes_from_data() {
        let table: FixupTable = serde_json::from_value(json!({
            "Q1": [{"strip_prefix": "if "}, {"strip_prefix": "(if "}],
            "Q2": [{"strip_suffix": ")"}]
        }))
        .unwrap();
        assert_eq!(table.apply("Q1", "if (if x"), "x");
        assert_eq!(table.apply("Q2", "f(x))"), "f(x)");
    }

    #[test]
    fn substitutions_rewrite_whole_program_and_names() {
        let mut qs = questions(&["KEY"]);
        qs.get_mut("KEY")
            .unwrap()
            .substitutions
            .insert("foo".into(), "bar".into());
        let sub = submission(&[("KEY", json!("foo(1)"))]);
        let out = render(
            "def foo(x): return x\nfoo_val = {KEY}",
            &sub,
            &qs,
            &FixupTable::new(),
            SubstitutionMode::Everywhere,
        )
        .unwrap();
        assert_eq!(out.source(), "def bar(x): return x\nbar_val = bar(1)");
        assert_eq!(out.substitute("foo_template"), "bar_template");

        let only = render(
            "def foo(x): return x\nfoo_val = {KEY}",
            &sub,
            &qs,
            &FixupTable::new(),
            SubstitutionMode::AnswersOnly,
        )
        .unwrap();
        assert_eq!(only.source(), "def foo(x): return x\nfoo_val = bar(1)");
        assert_eq!(only.substitute("foo_template"), "foo_template");
    }

    #[test]
    fn rendering_is_pure() {
        let sub = submission(&[("A", json!("x + 1")), ("B", json!("`y`:"))]);
        let qs = questions(&["A", "B"]);
        let template = "{A}\n{________B}";
        let first = render(template, &sub, &qs, &FixupTable::new(), SubstitutionMode::Everywhere);
        let second = render(template, &sub, &qs, &FixupTable::new(), SubstitutionMode::Everywhere);
        assert_eq!(first, second);
    }
}
