use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag key used for entries stored in a block without a leading tag line.
pub const UNTAGGED: &str = "untagged";

/// Tag key → entry bodies, in first-seen key order and append order within
/// each key.
pub type TagGroups = IndexMap<String, Vec<String>>;

/// Category name → flattened entry bodies for every category in one area.
pub type CategoryListing = IndexMap<String, Vec<String>>;

/// Storage scope selecting which root directory a category file lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    /// User-wide memories shared by every project.
    Global,
    /// Memories scoped to the current project.
    Local,
}

impl Area {
    /// Map the `is_global` flag carried by every tool call onto an area.
    pub fn from_is_global(is_global: bool) -> Self {
        if is_global { Area::Global } else { Area::Local }
    }
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Area::Global => write!(f, "global"),
            Area::Local => write!(f, "local"),
        }
    }
}

/// Failures surfaced to the tool-call client.
///
/// Each variant renders to the text placed in an error tool result, so the
/// messages are written for the assistant reading them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeepsakeError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
