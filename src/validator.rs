//! Chat-log validation.
//!
//! A pure pass over the captured output lines and an expected specification.
//! The expected file holds one JSON object per line:
//!
//! ```text
//! {"count": 3, "mandatory": "1,2", "optional": "3"}
//! ```
//!
//! meaning: the next `count` captured lines must all report the same token
//! set, and that set must contain every mandatory token and nothing outside
//! mandatory ∪ optional. Entries are consumed strictly in order, each
//! consuming exactly `count` lines; the cursor advances even past a failing
//! group so later groups still line up for diagnostics.

use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

/// Why an expected-specification file was rejected.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("expected spec line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected spec line {line}: count must be a positive integer")]
    ZeroCount { line: usize },
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    count: u64,
    #[serde(default)]
    mandatory: String,
    #[serde(default)]
    optional: String,
}

/// One group specification from the expected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedEntry {
    /// How many consecutive output lines this entry consumes.
    pub count: usize,
    /// Tokens every line in the group must contain.
    pub mandatory: BTreeSet<String>,
    /// Tokens a line may additionally contain.
    pub optional: BTreeSet<String>,
}

impl ExpectedEntry {
    fn permitted(&self) -> BTreeSet<String> {
        self.mandatory.union(&self.optional).cloned().collect()
    }
}

/// Split a comma-separated token list into a set. Empty fragments are
/// dropped, so `""` is the empty set and `"a,"` is `{a}`.
pub fn parse_tokens(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an expected-specification file: one JSON record per non-blank line.
pub fn parse_expected(text: &str) -> Result<Vec<ExpectedEntry>, SpecError> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let number = idx + 1;
        let raw: RawEntry =
            serde_json::from_str(line).map_err(|source| SpecError::Parse { line: number, source })?;
        if raw.count == 0 {
            return Err(SpecError::ZeroCount { line: number });
        }
        entries.push(ExpectedEntry {
            count: raw.count as usize,
            mandatory: parse_tokens(&raw.mandatory),
            optional: parse_tokens(&raw.optional),
        });
    }
    Ok(entries)
}

/// The ways a group can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The output ran out before the group consumed `count` lines.
    InsufficientLines,
    /// A line in the group differs from the group's first line.
    InconsistentLines,
    /// A line contains a token outside mandatory ∪ optional.
    ExtraneousToken,
    /// A line is missing a mandatory token.
    MissingMandatoryToken,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::InsufficientLines => "insufficient-lines",
            FailureKind::InconsistentLines => "inconsistent-lines",
            FailureKind::ExtraneousToken => "extraneous-token",
            FailureKind::MissingMandatoryToken => "missing-mandatory-token",
        };
        f.write_str(name)
    }
}

/// One recorded failure, located by group and (where applicable) output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Zero-based index of the expected entry.
    pub group: usize,
    /// Zero-based index of the offending output line, if one exists.
    pub line: Option<usize>,
}

/// Validation outcome: `correct` iff no failure was recorded.
#[derive(Debug, Default)]
pub struct Report {
    pub failures: Vec<Failure>,
}

impl Report {
    pub fn is_correct(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn verdict(&self) -> &'static str {
        if self.is_correct() { "correct" } else { "wrong" }
    }

    pub fn kinds(&self) -> Vec<FailureKind> {
        self.failures.iter().map(|f| f.kind).collect()
    }
}

/// Check captured output lines against the expected entries.
pub fn validate(lines: &[String], expected: &[ExpectedEntry]) -> Report {
    let mut report = Report::default();
    let mut cursor = 0usize;

    for (group, entry) in expected.iter().enumerate() {
        let permitted = entry.permitted();
        let mut reference: Option<BTreeSet<String>> = None;

        for offset in 0..entry.count {
            let idx = cursor + offset;
            let Some(line) = lines.get(idx) else {
                report.failures.push(Failure {
                    kind: FailureKind::InsufficientLines,
                    group,
                    line: None,
                });
                break;
            };
            let tokens = parse_tokens(line);

            match &reference {
                None => reference = Some(tokens.clone()),
                Some(first) if *first != tokens => {
                    report.failures.push(Failure {
                        kind: FailureKind::InconsistentLines,
                        group,
                        line: Some(idx),
                    });
                }
                Some(_) => {}
            }

            if !tokens.is_subset(&permitted) {
                report.failures.push(Failure {
                    kind: FailureKind::ExtraneousToken,
                    group,
                    line: Some(idx),
                });
            }
            if !tokens.is_superset(&entry.mandatory) {
                report.failures.push(Failure {
                    kind: FailureKind::MissingMandatoryToken,
                    group,
                    line: Some(idx),
                });
            }
        }

        // Keep later groups aligned even when this one failed.
        cursor += entry.count;
    }

    report
}
