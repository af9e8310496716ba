//! Path utility functions for normalization and containment checks.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Check if `path` lies inside `dir` after lexical normalization of both.
///
/// Components are compared whole, so `/repo/lib2` is not under `/repo/lib`.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    let path = normalize_path(path);
    let dir = normalize_path(dir);
    path.starts_with(&dir)
}

/// Check whether an archive-relative path may be joined onto a target directory.
///
/// Rejects paths that begin with a separator (or drive prefix) and paths
/// carrying a `..` segment under either separator convention.
pub fn is_safe_relative(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    if Path::new(path).is_absolute() || path.get(1..2) == Some(":") {
        return false;
    }
    !path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Lowercase a path and unify separators so prefix checks ignore both.
pub fn normalize_for_compare(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_with_parent_dir() {
        assert_eq!(
            normalize_path(Path::new("/repo/lib/../other/./x")),
            PathBuf::from("/repo/other/x")
        );
    }

    #[test]
    fn test_normalize_path_relative_keeps_leading_parent() {
        assert_eq!(
            normalize_path(Path::new("../a/b/..")),
            PathBuf::from("../a")
        );
    }

    #[test]
    fn test_is_path_under() {
        assert!(is_path_under(
            Path::new("/repo/foo/1,0,0/src/A.hx"),
            Path::new("/repo/foo/1,0,0")
        ));
        assert!(!is_path_under(
            Path::new("/repo/foo/1,0,0/../../etc"),
            Path::new("/repo/foo/1,0,0")
        ));
        assert!(!is_path_under(
            Path::new("/repo/foo2"),
            Path::new("/repo/foo")
        ));
    }

    #[test]
    fn test_is_safe_relative() {
        assert!(is_safe_relative("src/Main.hx"));
        assert!(is_safe_relative("haxelib.json"));
        assert!(is_safe_relative("a/..b/c"));
        assert!(!is_safe_relative("../evil"));
        assert!(!is_safe_relative("src/../../evil"));
        assert!(!is_safe_relative("src\\..\\evil"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative("\\windows\\system32"));
        assert!(!is_safe_relative("C:/evil"));
    }

    #[test]
    fn test_normalize_for_compare() {
        assert_eq!(normalize_for_compare("C:\\Dev\\Libs"), "c:/dev/libs");
        assert_eq!(normalize_for_compare("/home/User/x"), "/home/user/x");
    }
}
