//! The four memory tools exposed over MCP and their dispatch onto
//! [`MemoryStore`].
//!
//! | Tool | Store operation |
//! |---|---|
//! | `remember_memory` | [`MemoryStore::remember`] |
//! | `retrieve_memories` | [`MemoryStore::retrieve`], or [`MemoryStore::retrieve_all`] for `"*"` |
//! | `remove_memory_category` | [`MemoryStore::clear_memory`], or [`MemoryStore::clear_all`] for `"*"` |
//! | `remove_specific_memory` | [`MemoryStore::remove_specific_memory`] |
//!
//! Argument validation (required fields, non-empty strings) happens here; the
//! store itself only rejects category names that cannot be file names.

use keepsake_memory::MemoryStore;
use keepsake_types::{Area, KeepsakeError};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::protocol::McpTool;

pub const REMEMBER_MEMORY: &str = "remember_memory";
pub const RETRIEVE_MEMORIES: &str = "retrieve_memories";
pub const REMOVE_MEMORY_CATEGORY: &str = "remove_memory_category";
pub const REMOVE_SPECIFIC_MEMORY: &str = "remove_specific_memory";

/// Category placeholder addressing every category of an area.
pub const ALL_CATEGORIES: &str = "*";

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments of `remember_memory`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RememberArgs {
    /// Category to store the memory under, e.g. "preferences" or "project".
    #[schemars(length(min = 1))]
    pub category: String,
    /// The fact to remember.
    #[schemars(length(min = 1))]
    pub data: String,
    /// Optional tags attached to the memory.
    #[serde(default)]
    pub tags: Vec<String>,
    /// true for user-wide memory, false for memory scoped to this project.
    pub is_global: bool,
}

/// Arguments of `retrieve_memories`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RetrieveArgs {
    /// Category to read, or "*" for every category.
    #[schemars(length(min = 1))]
    pub category: String,
    /// true for user-wide memory, false for memory scoped to this project.
    pub is_global: bool,
}

/// Arguments of `remove_memory_category`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoveCategoryArgs {
    /// Category to delete, or "*" to delete every category.
    #[schemars(length(min = 1))]
    pub category: String,
    /// true for user-wide memory, false for memory scoped to this project.
    pub is_global: bool,
}

/// Arguments of `remove_specific_memory`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoveSpecificArgs {
    /// Category holding the memory.
    #[schemars(length(min = 1))]
    pub category: String,
    /// Text contained in the memory to delete; every memory containing it is
    /// removed.
    #[schemars(length(min = 1))]
    pub memory_content: String,
    /// true for user-wide memory, false for memory scoped to this project.
    pub is_global: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool list
// ─────────────────────────────────────────────────────────────────────────────

fn tool<T: JsonSchema>(name: &str, description: &str) -> McpTool {
    let input_schema =
        serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| Value::Object(Default::default()));
    McpTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Tool definitions returned by `tools/list`.
pub fn list_tools() -> Vec<McpTool> {
    vec![
        tool::<RememberArgs>(
            REMEMBER_MEMORY,
            "Store a fact in a memory category. Use is_global=true for facts about the user \
             that apply everywhere, false for facts about the current project.",
        ),
        tool::<RetrieveArgs>(
            RETRIEVE_MEMORIES,
            "Retrieve memories from a category, grouped by tags. Use category \"*\" to list \
             every category with its memories.",
        ),
        tool::<RemoveCategoryArgs>(
            REMOVE_MEMORY_CATEGORY,
            "Delete a whole memory category. Use category \"*\" to delete every category.",
        ),
        tool::<RemoveSpecificArgs>(
            REMOVE_SPECIFIC_MEMORY,
            "Delete every memory in a category whose text contains memory_content \
             (case-sensitive).",
        ),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Executes tool calls against a [`MemoryStore`].
///
/// Calls are blocking; the server runs them on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct MemoryTools {
    store: MemoryStore,
}

impl MemoryTools {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Run tool `name` and return the text placed in the tool result.
    pub fn call(&self, name: &str, arguments: Value) -> Result<String, KeepsakeError> {
        debug!(tool = name, "dispatching tool call");
        match name {
            REMEMBER_MEMORY => self.remember(parse_args(name, arguments)?),
            RETRIEVE_MEMORIES => self.retrieve(parse_args(name, arguments)?),
            REMOVE_MEMORY_CATEGORY => self.remove_category(parse_args(name, arguments)?),
            REMOVE_SPECIFIC_MEMORY => self.remove_specific(parse_args(name, arguments)?),
            other => Err(KeepsakeError::UnknownTool(other.to_string())),
        }
    }

    fn remember(&self, args: RememberArgs) -> Result<String, KeepsakeError> {
        require_non_empty("category", &args.category)?;
        require_non_empty("data", &args.data)?;
        let area = Area::from_is_global(args.is_global);

        self.store.remember(&args.category, &args.data, &args.tags, area)?;
        Ok(format!("Memory stored in {area} category '{}'.", args.category))
    }

    fn retrieve(&self, args: RetrieveArgs) -> Result<String, KeepsakeError> {
        require_non_empty("category", &args.category)?;
        let area = Area::from_is_global(args.is_global);

        let rendered = if args.category == ALL_CATEGORIES {
            serde_json::to_string_pretty(&self.store.retrieve_all(area)?)
        } else {
            serde_json::to_string_pretty(&self.store.retrieve(&args.category, area)?)
        };
        rendered.map_err(|e| KeepsakeError::Serialization(e.to_string()))
    }

    fn remove_category(&self, args: RemoveCategoryArgs) -> Result<String, KeepsakeError> {
        require_non_empty("category", &args.category)?;
        let area = Area::from_is_global(args.is_global);

        if args.category == ALL_CATEGORIES {
            self.store.clear_all(area)?;
            Ok(format!("Removed all {area} memories."))
        } else {
            self.store.clear_memory(&args.category, area)?;
            Ok(format!("Removed {area} category '{}'.", args.category))
        }
    }

    fn remove_specific(&self, args: RemoveSpecificArgs) -> Result<String, KeepsakeError> {
        require_non_empty("category", &args.category)?;
        require_non_empty("memory_content", &args.memory_content)?;
        let area = Area::from_is_global(args.is_global);

        self.store
            .remove_specific_memory(&args.category, &args.memory_content, area)?;
        Ok(format!(
            "Removed {area} memories in category '{}' containing '{}'.",
            args.category, args.memory_content
        ))
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, KeepsakeError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| KeepsakeError::InvalidArguments(format!("{tool}: {e}")))
}

fn require_non_empty(field: &str, value: &str) -> Result<(), KeepsakeError> {
    if value.is_empty() {
        return Err(KeepsakeError::InvalidArguments(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
