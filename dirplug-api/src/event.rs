//! Directory change notifications

use serde::{Deserialize, Serialize};

/// Kind of change observed in a plugin directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirChangeType {
    Add,
    Update,
    Remove,
}

/// A change observed in a plugin directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirChangeEvent {
    /// Free-form hint about what changed, usually a file name
    pub hint: String,

    /// Kind of change
    pub change: DirChangeType,
}

impl DirChangeEvent {
    pub fn new(hint: impl Into<String>, change: DirChangeType) -> Self {
        Self {
            hint: hint.into(),
            change,
        }
    }
}
