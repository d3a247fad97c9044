//! `keepsake-memory` – The Memory Record Store.
//!
//! Persists short categorized text facts as flat, human-editable text files,
//! one file per category, under a per-area root directory.
//!
//! # Modules
//!
//! - [`codec`] – decodes a category file into tag-key groups, encodes an
//!   append-safe block for a new entry, and filters blocks out by substring.
//! - [`category`] – validates caller-supplied category names before they
//!   are turned into file paths.
//! - [`store`] – [`MemoryStore`][store::MemoryStore]: resolves
//!   area/category to a file path and performs the add / retrieve / remove
//!   operations against the filesystem.

pub mod category;
pub mod codec;
pub mod store;

pub use store::{MemoryStore, StoreError};
