//! Per-run configuration sent alongside submitted input.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bag::Configurable;

/// Run configuration, generic over the bag's configurable type.
///
/// Serializes to the `config` object a run is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig<C = Configurable> {
    /// Caller-defined context made available to every node of the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configurable: Option<C>,

    /// Tags attached to the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Maximum number of supersteps before the run fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<u32>,

    /// Arbitrary metadata for app-specific needs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl<C> Default for RunConfig<C> {
    fn default() -> Self {
        Self {
            configurable: None,
            tags: Vec::new(),
            recursion_limit: None,
            metadata: HashMap::new(),
        }
    }
}

impl<C> RunConfig<C> {
    /// Create a config carrying `configurable`.
    #[must_use]
    pub fn new(configurable: C) -> Self {
        Self {
            configurable: Some(configurable),
            ..Self::default()
        }
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the recursion limit.
    #[must_use]
    pub const fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Set a metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}
