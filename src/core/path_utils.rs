/*
 * Path helpers shared by the core: the per-user configuration directory, the home
 * directory, lexical normalization, and conversion between absolute paths and the
 * root-relative form stored in the preferences file.
 *
 * Relative paths always use '/' as separator regardless of platform, and the root
 * itself is spelled ".".
 */
use directories::{BaseDirs, ProjectDirs};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const ROOT_RELATIVE_PATH: &str = ".";

/*
 * Retrieves the application's local configuration directory, creating it when it
 * does not exist yet. Returns `None` when the platform has no such location or when
 * the directory cannot be created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Attempting to get base app config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!(
                    "PathUtils: Failed to create base app config directory {config_path:?}: {e}"
                );
                return None;
            }
            log::debug!("PathUtils: Created base app config directory: {config_path:?}");
        }
        Some(config_path.to_path_buf())
    })
}

pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/*
 * Makes a path absolute (against the current working directory) and removes `.` and
 * `..` components lexically. Symlinks are not resolved, so the result names the same
 * entry the user picked.
 */
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(e) => {
                log::warn!("PathUtils: Cannot read current directory to absolutize {path:?}: {e}");
                path.to_path_buf()
            }
        }
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/*
 * Expresses `path` relative to `root` with '/' separators. The root itself becomes
 * ".". Paths outside the root yield `None`.
 */
pub fn to_relative(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        Some(ROOT_RELATIVE_PATH.to_string())
    } else {
        Some(parts.join("/"))
    }
}

/*
 * Resolves a stored relative path against `root`. Accepts both '/' and '\' as
 * separators. Returns `None` for empty input, absolute input, or a path that climbs
 * out of the root.
 */
pub fn from_relative(rel: &str, root: &Path) -> Option<PathBuf> {
    let trimmed = rel.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == ROOT_RELATIVE_PATH {
        return Some(root.to_path_buf());
    }

    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for part in trimmed.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            _ => {
                if Path::new(part).has_root() {
                    return None;
                }
                resolved.push(part);
                depth += 1;
            }
        }
    }
    if Path::new(trimmed).is_absolute() {
        return None;
    }
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_get_base_app_config_local_dir_creates_if_not_exists() {
        let unique_app_name = format!("TestApp_PathUtils_Create_{}", rand::random::<u128>());

        let path = get_base_app_config_local_dir(&unique_app_name);

        let Some(path) = path else {
            // No config location on this platform/user; nothing to verify.
            return;
        };
        assert!(path.exists(), "Directory should have been created");
        assert!(path.is_dir());
        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn test_normalize_path_removes_dot_components() {
        let base = tempdir().expect("tempdir");
        let messy = base.path().join("a").join(".").join("b").join("..").join("c");
        assert_eq!(normalize_path(&messy), base.path().join("a").join("c"));
    }

    #[test]
    fn test_normalize_relative_path_is_absolute() {
        assert!(normalize_path(Path::new("some/relative")).is_absolute());
    }

    #[test]
    fn test_relative_round_trip_including_root() {
        let root = PathBuf::from("/proj");
        let cases = [
            PathBuf::from("/proj"),
            PathBuf::from("/proj/a.txt"),
            PathBuf::from("/proj/src/deep/mod.rs"),
        ];
        for abs in cases {
            let rel = to_relative(&abs, &root).expect("inside root");
            assert_eq!(from_relative(&rel, &root), Some(abs.clone()), "rel = {rel}");
        }
        assert_eq!(to_relative(&root, &root).as_deref(), Some("."));
        assert_eq!(
            to_relative(Path::new("/proj/src/deep/mod.rs"), &root).as_deref(),
            Some("src/deep/mod.rs")
        );
    }

    #[test]
    fn test_to_relative_outside_root_is_none() {
        assert_eq!(to_relative(Path::new("/other/x.txt"), Path::new("/proj")), None);
        // A sibling sharing a string prefix is still outside.
        assert_eq!(to_relative(Path::new("/project2/x"), Path::new("/proj")), None);
    }

    #[test]
    fn test_from_relative_accepts_backslashes_and_rejects_escape() {
        let root = PathBuf::from("/proj");
        assert_eq!(
            from_relative("src\\main.rs", &root),
            Some(PathBuf::from("/proj/src/main.rs"))
        );
        assert_eq!(from_relative("../etc/passwd", &root), None);
        assert_eq!(from_relative("", &root), None);
        assert_eq!(from_relative("src/../b.txt", &root), Some(PathBuf::from("/proj/b.txt")));
    }
}
