use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// A location inside a structured value, as a sequence of attribute, index and key steps.
///
/// Paths are rendered the way users write references in configuration, for example
/// `.equal["first"].got` or `.rule[0].port`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathStep>);

/// A single step of a [`Path`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStep {
    /// Selects an attribute (or nested block type) of an object by name.
    Attr(String),

    /// Selects an element of a list or tuple by position.
    Index(usize),

    /// Selects an element of a map by key.
    Key(String),
}

impl Path {
    /// The empty path, pointing at the value itself.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn attr(&self, name: impl Into<String>) -> Self {
        self.with_step(PathStep::Attr(name.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.with_step(PathStep::Index(index))
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.with_step(PathStep::Key(key.into()))
    }

    /// Returns a new path with all steps of `other` appended to the steps of `self`.
    pub fn join(&self, other: &Self) -> Self {
        let mut steps = self.0.clone();
        steps.extend(other.0.iter().cloned());
        Self(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn with_step(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }
}

impl FromIterator<PathStep> for Path {
    fn from_iter<T: IntoIterator<Item = PathStep>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            match step {
                PathStep::Attr(name) => write!(f, ".{name}")?,
                PathStep::Index(index) => write!(f, "[{index}]")?,
                PathStep::Key(key) => write!(f, "[{key:?}]")?,
            }
        }
        Ok(())
    }
}

/// An error located at a specific [`Path`] inside a value or type.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(display("{}{message}", path_prefix(path)))]
pub struct PathError {
    pub path: Path,
    pub message: String,
}

impl PathError {
    pub fn new(path: Path, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

fn path_prefix(path: &Path) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}: ")
    }
}
