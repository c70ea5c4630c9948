//! Stored image naming and filename safety

use chrono::Local;
use uuid::Uuid;

const PREFIX: &str = "nexus_edit";
const EXTENSION: &str = "png";

/// Generate a fresh stored-image filename.
///
/// Format: `nexus_edit_<YYYYMMDD_HHMMSS>_<8 hex>.png`, local time. The
/// random tail is the first 32 bits of a v4 UUID.
pub fn generate_filename() -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}.{}", PREFIX, timestamp, &id[..8], EXTENSION)
}

/// Reject names that could escape the storage directory.
///
/// A safe name is a single non-empty path component: no separators, no
/// `..`, no leading dot, no NUL.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_filename_format() {
        let name = generate_filename();
        let rest = name.strip_prefix("nexus_edit_").unwrap();
        let stem = rest.strip_suffix(".png").unwrap();
        let parts: Vec<&str> = stem.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 6);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_filenames_are_distinct() {
        let names: HashSet<String> = (0..2000).map(|_| generate_filename()).collect();
        assert_eq!(names.len(), 2000);
    }

    #[test]
    fn test_generated_filename_is_safe() {
        for _ in 0..100 {
            assert!(is_safe_filename(&generate_filename()));
        }
    }

    #[test]
    fn test_unsafe_filenames_rejected() {
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("/etc/passwd"));
        assert!(!is_safe_filename("a/b.png"));
        assert!(!is_safe_filename("a\\b.png"));
        assert!(!is_safe_filename("..png"));
        assert!(!is_safe_filename(".hidden.png"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename("a\0.png"));
    }

    #[test]
    fn test_plain_filenames_accepted() {
        assert!(is_safe_filename("photo.png"));
        assert!(is_safe_filename("nexus_edit_20240101_120000_0a1b2c3d.png"));
    }
}
