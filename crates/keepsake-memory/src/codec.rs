//! Category File Codec.
//!
//! Converts between the raw text of a single category file and the grouped
//! entries it encodes.
//!
//! # File format
//!
//! A category file is a sequence of **blocks** separated by a blank line
//! ([`RECORD_SEPARATOR`]).  A block may open with a **tag line** starting
//! with `#`; every other non-blank line in the block is an independent entry
//! body carrying that block's tags.
//!
//! ```text
//! # style formatting
//! Uses 2-space indentation
//!
//! # tools
//! Uses eslint
//!
//! Prefers small commits
//! ```
//!
//! decodes to
//!
//! | tag key              | entries                        |
//! |----------------------|--------------------------------|
//! | `"style formatting"` | `["Uses 2-space indentation"]` |
//! | `"tools"`            | `["Uses eslint"]`              |
//! | `"untagged"`         | `["Prefers small commits"]`    |
//!
//! Decoding groups strictly by tag-key text: two blocks appended with the same
//! tags merge into one group, and block boundaries are not recoverable.
//!
//! Bodies are written verbatim.  A body ending in `\n` leaves three newlines
//! before the next block, which then no longer starts at a separator: its tag
//! line decodes as an untagged entry.
//!
//! # Example
//!
//! ```rust
//! use keepsake_memory::codec::{decode, encode_append};
//!
//! let mut file = String::new();
//! file.push_str(&encode_append(&["tag2".to_string(), "tag3".to_string()], "first"));
//! file.push_str(&encode_append(&[], "second"));
//!
//! let groups = decode(&file);
//! assert_eq!(groups["tag2 tag3"], vec!["first"]);
//! assert_eq!(groups["untagged"], vec!["second"]);
//! ```

use keepsake_types::{TagGroups, UNTAGGED};

/// Separator between two blocks of a category file.
pub const RECORD_SEPARATOR: &str = "\n\n";

/// Marker opening a tag line.
pub const TAG_MARKER: char = '#';

// ─────────────────────────────────────────────────────────────────────────────
// Decode
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a category file into tag-key groups.
///
/// Whitespace-only blocks are skipped.  Keys keep the order in which they were
/// first seen; entries under a key keep file order.  Empty or all-blank
/// content yields an empty mapping.
pub fn decode(content: &str) -> TagGroups {
    let mut groups = TagGroups::new();

    for block in content.split(RECORD_SEPARATOR) {
        if block.trim().is_empty() {
            continue;
        }

        let mut lines = block.lines();
        let first = lines.next().unwrap_or_default();

        match first.strip_prefix(TAG_MARKER) {
            Some(tag_line) => {
                let key = tag_key(tag_line.split_whitespace());
                let entries = groups.entry(key).or_default();
                entries.extend(lines.filter(|l| !l.trim().is_empty()).map(str::to_string));
            }
            None => {
                let entries = groups.entry(UNTAGGED.to_string()).or_default();
                entries.extend(
                    std::iter::once(first)
                        .chain(lines)
                        .filter(|l| !l.trim().is_empty())
                        .map(str::to_string),
                );
            }
        }
    }

    groups
}

fn tag_key<'a>(tags: impl Iterator<Item = &'a str>) -> String {
    tags.collect::<Vec<_>>().join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Encode
// ─────────────────────────────────────────────────────────────────────────────

/// Render one entry as a self-contained block ready to be appended to a
/// category file.
///
/// The fragment always ends with [`RECORD_SEPARATOR`], so it can be appended
/// without looking at the current end of the file.  Appending twice with the
/// same tags writes two blocks; [`decode`] merges them on read.
pub fn encode_append(tags: &[String], body: &str) -> String {
    let mut fragment = String::with_capacity(body.len() + RECORD_SEPARATOR.len() + 16);
    if !tags.is_empty() {
        fragment.push(TAG_MARKER);
        fragment.push(' ');
        fragment.push_str(&tags.join(" "));
        fragment.push('\n');
    }
    fragment.push_str(body);
    fragment.push_str(RECORD_SEPARATOR);
    fragment
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter-out
// ─────────────────────────────────────────────────────────────────────────────

/// Drop every block whose raw text contains `needle` and return the rest,
/// rejoined with [`RECORD_SEPARATOR`].
///
/// Matching is plain, case-sensitive substring containment over the whole
/// block, tag line included: a match anywhere removes the block and every
/// entry in it.  Blank fragments produced by the split are kept verbatim, so
/// the number of separators in the output is not normalised.
pub fn filter_out(content: &str, needle: &str) -> String {
    content
        .split(RECORD_SEPARATOR)
        .filter(|block| !block.contains(needle))
        .collect::<Vec<_>>()
        .join(RECORD_SEPARATOR)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
