//! Content units: the strings the rule engine redacts, and who owns them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of text a content unit holds. Drives rule eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    /// The body of a user prompt.
    PromptBody,
    /// A named field of some other record.
    FieldAtPath,
    /// Content spanning prompt and response text.
    Global,
}

/// Identity of the unit of data a redaction belongs to: a source (file) and,
/// when the content sits under a prompt, that prompt's 1-based index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerScope {
    pub source_id: String,
    pub prompt_index: Option<u32>,
}

impl OwnerScope {
    pub fn new(source_id: impl Into<String>, prompt_index: Option<u32>) -> Self {
        Self {
            source_id: source_id.into(),
            prompt_index,
        }
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prompt_index {
            Some(index) => write!(f, "{}#prompt{}", self.source_id, index),
            None => write!(f, "{}#session", self.source_id),
        }
    }
}

/// One string value submitted to the rule engine.
#[derive(Debug, Clone, Copy)]
pub struct ContentUnit<'a> {
    pub value: &'a str,
    pub class: ContentClass,
    pub scope: &'a OwnerScope,
    pub field_path: &'a str,
}

impl<'a> ContentUnit<'a> {
    pub fn new(value: &'a str, class: ContentClass, scope: &'a OwnerScope, field_path: &'a str) -> Self {
        Self {
            value,
            class,
            scope,
            field_path,
        }
    }
}
