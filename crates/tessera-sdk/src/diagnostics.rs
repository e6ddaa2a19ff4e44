//! Problem reports returned to the orchestrator instead of, or alongside, a result.
//!
//! Diagnostics always accumulate: validation and planning report every problem found in
//! one pass. Only [`Severity::Error`] diagnostics make an operation unsuccessful.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::value::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,

    #[serde(default)]
    pub detail: String,

    /// The attribute the diagnostic refers to. An empty path refers to the whole object.
    #[serde(default, skip_serializing_if = "Path::is_empty")]
    pub path: Path,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            path: Path::root(),
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary, detail)
        }
    }

    pub fn with_path(mut self, path: Path) -> Self {
        self.path = path;
        self
    }

    /// Wraps an error returned by the remote system a provider manages.
    pub fn upstream_api_error(error: impl Display) -> Self {
        Self::error(
            "Remote operation failed",
            format!(
                "The remote API returned an error that the provider was unable to handle:\n\n{error}"
            ),
        )
    }

    /// Reports a defect in the provider itself, which the user cannot act on.
    pub fn implementation_bug(summary: impl Into<String>, detail: impl Display) -> Self {
        Self::error(
            summary,
            format!("{detail}\n\nThis is a bug in the provider, which should be reported in the provider's own issue tracker."),
        )
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// An ordered collection of [`Diagnostic`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|diagnostic| diagnostic.is_error())
    }

    /// Prefixes the path of every diagnostic with `base`, used when diagnostics produced for
    /// a nested value are reported in the context of its parent.
    pub fn under_path(self, base: &Path) -> Self {
        self.0
            .into_iter()
            .map(|diagnostic| Diagnostic {
                path: base.join(&diagnostic.path),
                ..diagnostic
            })
            .collect()
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type IntoIter = std::vec::IntoIter<Diagnostic>;
    type Item = Diagnostic;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type IntoIter = std::slice::Iter<'a, Diagnostic>;
    type Item = &'a Diagnostic;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}
