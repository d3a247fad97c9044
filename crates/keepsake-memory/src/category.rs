//! Category name validation.
//!
//! Category names come straight from tool-call arguments and become file
//! names (`<category>.txt`) under an area root.  A name is rejected when it
//! could resolve outside that root or cannot name a file:
//!
//! * empty or whitespace-only,
//! * contains `/`, `\` or a NUL byte,
//! * is exactly `.` or `..`.

/// Extension given to every category file.
pub const CATEGORY_EXTENSION: &str = "txt";

/// Reason a category name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Empty,
    PathSeparator,
    NulByte,
    RelativeSegment,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReason::Empty => write!(f, "name is empty"),
            InvalidReason::PathSeparator => write!(f, "name contains a path separator"),
            InvalidReason::NulByte => write!(f, "name contains a NUL byte"),
            InvalidReason::RelativeSegment => write!(f, "name is a relative path segment"),
        }
    }
}

/// Check that `name` can be used as a category file stem.
pub fn validate(name: &str) -> Result<(), InvalidReason> {
    if name.trim().is_empty() {
        return Err(InvalidReason::Empty);
    }
    if name.contains(['/', '\\']) {
        return Err(InvalidReason::PathSeparator);
    }
    if name.contains('\0') {
        return Err(InvalidReason::NulByte);
    }
    if name == "." || name == ".." {
        return Err(InvalidReason::RelativeSegment);
    }
    Ok(())
}

/// File name for a category: `<name>.txt`.
pub fn file_name(name: &str) -> String {
    format!("{name}.{CATEGORY_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        assert!(validate("dev").is_ok());
        assert!(validate("code style").is_ok());
        assert!(validate("v1.2").is_ok());
        assert!(validate("...hidden").is_ok());
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert_eq!(validate(""), Err(InvalidReason::Empty));
        assert_eq!(validate("  \t"), Err(InvalidReason::Empty));
    }

    #[test]
    fn rejects_path_separators() {
        assert_eq!(validate("../etc/passwd"), Err(InvalidReason::PathSeparator));
        assert_eq!(validate("a/b"), Err(InvalidReason::PathSeparator));
        assert_eq!(validate("a\\b"), Err(InvalidReason::PathSeparator));
    }

    #[test]
    fn rejects_nul_and_relative_segments() {
        assert_eq!(validate("a\0b"), Err(InvalidReason::NulByte));
        assert_eq!(validate("."), Err(InvalidReason::RelativeSegment));
        assert_eq!(validate(".."), Err(InvalidReason::RelativeSegment));
    }

    #[test]
    fn file_name_appends_extension() {
        assert_eq!(file_name("dev"), "dev.txt");
    }
}
