//! Dotted field paths into a document body.

use crate::error::{MutationError, MutationResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A path to a field inside a document body, such as `author.name`.
///
/// Paths only address object members; every segment must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path.
    pub fn parse(path: &str) -> MutationResult<Self> {
        if path.is_empty() {
            return Err(MutationError::invalid_path(path, "path is empty"));
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(MutationError::invalid_path(path, "empty segment"));
        }

        Ok(Self { segments })
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Splits the path into its parent segments and the final key.
    fn split_last(&self) -> (&[String], &str) {
        // A parsed path always has at least one segment.
        match self.segments.split_last() {
            Some((last, parents)) => (parents, last.as_str()),
            None => (&[], ""),
        }
    }

    /// Looks up the value at this path.
    pub fn get<'a>(&self, body: &'a Map<String, Value>) -> Option<&'a Value> {
        let (parents, key) = self.split_last();
        let mut current = body;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(key)
    }

    /// Returns the object that owns the final segment, creating missing
    /// intermediate objects on the way.
    ///
    /// Returns `None` when an intermediate segment holds a non-object value.
    pub(crate) fn parent_mut_or_create<'a>(
        &self,
        body: &'a mut Map<String, Value>,
    ) -> Option<(&'a mut Map<String, Value>, &str)> {
        let (parents, key) = self.split_last();
        let mut current = body;
        for segment in parents {
            current = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()?;
        }
        Some((current, key))
    }

    /// Returns the object that owns the final segment without creating
    /// anything.
    pub(crate) fn parent_mut<'a>(
        &self,
        body: &'a mut Map<String, Value>,
    ) -> Option<(&'a mut Map<String, Value>, &str)> {
        let (parents, key) = self.split_last();
        let mut current = body;
        for segment in parents {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        Some((current, key))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = MutationError;

    fn try_from(value: String) -> MutationResult<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = MutationError;

    fn try_from(value: &str) -> MutationResult<Self> {
        Self::parse(value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}
