//! Memory Store.
//!
//! Maps `(category, area)` pairs onto category files and performs every
//! read and write against the filesystem.  No state is cached between calls:
//! each operation re-reads the file(s) it touches.
//!
//! # Storage layout
//!
//! ```text
//! <global root>/
//!     dev.txt
//!     personal.txt
//! <local root>/
//!     dev.txt
//! ```
//!
//! | operation                  | file effect                                         |
//! |----------------------------|-----------------------------------------------------|
//! | [`remember`]               | create-or-append one encoded block                  |
//! | [`retrieve`]               | read + decode; missing file ⇒ empty                 |
//! | [`retrieve_all`]           | read every `*.txt` directly under the root          |
//! | [`remove_specific_memory`] | read, drop matching blocks, overwrite               |
//! | [`clear_memory`]           | delete the file; missing file ⇒ no-op               |
//! | [`clear_all`]              | delete the root recursively and recreate it empty   |
//!
//! # Concurrency
//!
//! Calls take no locks.  Two concurrent [`remember`] calls on one file rely
//! on the platform's append atomicity for a single write.  Read-modify-write
//! operations ([`remove_specific_memory`]) can lose an update made by a
//! concurrent writer between the read and the overwrite.  The intended
//! workload is a single user issuing occasional tool calls.
//!
//! # Example
//!
//! ```rust,no_run
//! use keepsake_memory::MemoryStore;
//! use keepsake_types::Area;
//!
//! let store = MemoryStore::new("/home/me/.keepsake/memories", "/work/proj/.keepsake/memories");
//! store.remember("dev", "Uses eslint", &["tools".to_string()], Area::Global).unwrap();
//! let groups = store.retrieve("dev", Area::Global).unwrap();
//! assert_eq!(groups["tools"], vec!["Uses eslint"]);
//! ```
//!
//! [`remember`]: MemoryStore::remember
//! [`retrieve`]: MemoryStore::retrieve
//! [`retrieve_all`]: MemoryStore::retrieve_all
//! [`remove_specific_memory`]: MemoryStore::remove_specific_memory
//! [`clear_memory`]: MemoryStore::clear_memory
//! [`clear_all`]: MemoryStore::clear_all

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use keepsake_types::{Area, CategoryListing, KeepsakeError, TagGroups};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::category::{self, CATEGORY_EXTENSION, InvalidReason};
use crate::codec;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from memory store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An underlying filesystem call failed.
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The category name cannot be mapped to a file inside the area root.
    #[error("invalid category '{name}': {reason}")]
    InvalidCategory { name: String, reason: InvalidReason },
}

impl From<StoreError> for KeepsakeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCategory { .. } => KeepsakeError::InvalidArguments(err.to_string()),
            StoreError::Io { .. } => KeepsakeError::Storage(err.to_string()),
        }
    }
}

fn io_error<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> StoreError + 'a {
    move |source| StoreError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// File-backed store of categorized, tagged memory entries.
///
/// Construct with the two area roots, both already resolved by the caller.
/// The store never creates the roots itself except in [`clear_all`], which
/// recreates the root it wipes.
///
/// [`clear_all`]: MemoryStore::clear_all
#[derive(Debug, Clone)]
pub struct MemoryStore {
    global_root: PathBuf,
    local_root: PathBuf,
}

impl MemoryStore {
    pub fn new(global_root: impl Into<PathBuf>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            global_root: global_root.into(),
            local_root: local_root.into(),
        }
    }

    /// Root directory holding every category file of `area`.
    pub fn root(&self, area: Area) -> &Path {
        match area {
            Area::Global => &self.global_root,
            Area::Local => &self.local_root,
        }
    }

    /// Resolve the file backing `category` in `area`.
    ///
    /// Returns [`StoreError::InvalidCategory`] for names that could escape the
    /// area root (see [`category::validate`]).
    pub fn category_path(&self, category: &str, area: Area) -> Result<PathBuf, StoreError> {
        category::validate(category).map_err(|reason| StoreError::InvalidCategory {
            name: category.to_string(),
            reason,
        })?;
        Ok(self.root(area).join(category::file_name(category)))
    }

    /// Append one entry to `category`, creating the file on first use.
    ///
    /// The encoded block is written with a single append call.
    #[instrument(level = "debug", skip(self, body, tags), fields(area = %area))]
    pub fn remember(
        &self,
        category: &str,
        body: &str,
        tags: &[String],
        area: Area,
    ) -> Result<(), StoreError> {
        let path = self.category_path(category, area)?;
        let fragment = codec::encode_append(tags, body);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error("open", &path))?;
        file.write_all(fragment.as_bytes())
            .map_err(io_error("append to", &path))?;

        info!(category, area = %area, tags = tags.len(), "memory stored");
        Ok(())
    }

    /// Read and decode `category`.  A missing file yields an empty mapping.
    #[instrument(level = "debug", skip(self), fields(area = %area))]
    pub fn retrieve(&self, category: &str, area: Area) -> Result<TagGroups, StoreError> {
        let path = self.category_path(category, area)?;
        read_groups(&path)
    }

    /// Read every category of `area`, flattening each one's tag groups into a
    /// single list of entry bodies.
    ///
    /// Only regular `*.txt` files directly under the root are considered.
    /// Categories are returned sorted by name; entries keep the order produced
    /// by [`codec::decode`].  A missing root yields an empty mapping; the first
    /// unreadable file aborts the whole call.
    #[instrument(level = "debug", skip(self), fields(area = %area))]
    pub fn retrieve_all(&self, area: Area) -> Result<CategoryListing, StoreError> {
        let root = self.root(area);
        let dir = match fs::read_dir(root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(root = %root.display(), "area root missing; nothing to list");
                return Ok(CategoryListing::new());
            }
            Err(e) => return Err(io_error("list", root)(e)),
        };

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for dir_entry in dir {
            let dir_entry = dir_entry.map_err(io_error("list", root))?;
            let path = dir_entry.path();
            let is_file = dir_entry
                .file_type()
                .map_err(io_error("inspect", &path))?
                .is_file();
            if !is_file || path.extension().and_then(|e| e.to_str()) != Some(CATEGORY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                warn!(path = %path.display(), "skipping category file with non UTF-8 name");
                continue;
            };
            files.push((stem, path));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut listing = CategoryListing::with_capacity(files.len());
        for (name, path) in files {
            let entries: Vec<String> = read_groups(&path)?.into_values().flatten().collect();
            listing.insert(name, entries);
        }
        Ok(listing)
    }

    /// Remove every block of `category` whose raw text contains `needle`.
    ///
    /// The file is overwritten with the surviving blocks and is kept even when
    /// nothing survives.  A missing file is a no-op.
    #[instrument(level = "debug", skip(self, needle), fields(area = %area))]
    pub fn remove_specific_memory(
        &self,
        category: &str,
        needle: &str,
        area: Area,
    ) -> Result<(), StoreError> {
        let path = self.category_path(category, area)?;
        let Some(content) = read_if_exists(&path)? else {
            debug!(category, "category file missing; nothing to remove");
            return Ok(());
        };

        let filtered = codec::filter_out(&content, needle);
        let changed = filtered.len() != content.len();
        fs::write(&path, filtered).map_err(io_error("write", &path))?;

        info!(category, area = %area, changed, "specific memory removal applied");
        Ok(())
    }

    /// Delete the file backing `category`.  A missing file is a no-op.
    #[instrument(level = "debug", skip(self), fields(area = %area))]
    pub fn clear_memory(&self, category: &str, area: Area) -> Result<(), StoreError> {
        let path = self.category_path(category, area)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(category, area = %area, "category removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &path)(e)),
        }
    }

    /// Delete every category of `area` by removing its root recursively, then
    /// recreate the root empty.
    #[instrument(level = "debug", skip(self), fields(area = %area))]
    pub fn clear_all(&self, area: Area) -> Result<(), StoreError> {
        let root = self.root(area);
        match fs::remove_dir_all(root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("remove", root)(e)),
        }
        fs::create_dir_all(root).map_err(io_error("create", root))?;

        warn!(area = %area, root = %root.display(), "all memories cleared");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_if_exists(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error("read", path)(e)),
    }
}

fn read_groups(path: &Path) -> Result<TagGroups, StoreError> {
    Ok(read_if_exists(path)?
        .map(|content| codec::decode(&content))
        .unwrap_or_default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
