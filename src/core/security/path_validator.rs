use std::io;
use std::path::{Component, Path, PathBuf};

use crate::core::config::SecurityConfig;

/// Errors that can occur during path validation
#[derive(Debug, thiserror::Error)]
pub enum PathSecurityError {
    #[error("Path '{path}' is outside allowed root directory '{root}'")]
    OutsideRootDirectory { path: PathBuf, root: PathBuf },

    #[error("Symlink '{path}' points outside allowed root directory")]
    SymlinkOutsideRoot { path: PathBuf },

    #[error("Symlink '{path}' is not allowed")]
    SymlinkNotAllowed { path: PathBuf },

    #[error("Cannot canonicalize path '{path}': {error}")]
    CannotCanonicalize { path: PathBuf, error: io::Error },

    #[error("Path does not exist: '{path}'")]
    PathNotFound { path: PathBuf },

    #[error("Path '{path}' has no parent directory")]
    NoParent { path: PathBuf },

    #[error("IO error for path '{path}': {error}")]
    IoError { path: PathBuf, error: io::Error },
}

/// Validates that an existing path is within the configured security boundaries.
///
/// 1. Canonicalizes the input path to resolve `.`, `..`, and symlinks
/// 2. If a root path is configured, ensures the canonical path is within that root
/// 3. Handles symlinks according to the configured policy
///
/// Returns the canonical path on success.
pub fn validate_path(input_path: &str, security: &SecurityConfig) -> Result<PathBuf, PathSecurityError> {
    let path = Path::new(input_path);

    // No root configured: only canonicalize
    let Some(ref root) = security.root_path else {
        return canonicalize_path(path);
    };

    let canonical_root = canonical_root(root)?;

    if !path.exists() {
        return Err(PathSecurityError::PathNotFound {
            path: path.to_path_buf(),
        });
    }

    if path.is_symlink() {
        if !security.allow_symlinks {
            return Err(PathSecurityError::SymlinkNotAllowed {
                path: path.to_path_buf(),
            });
        }

        let target = path.read_link().map_err(|e| PathSecurityError::IoError {
            path: path.to_path_buf(),
            error: e,
        })?;
        // Relative targets are relative to the link's directory
        let target = match path.parent() {
            Some(parent) if target.is_relative() => parent.join(target),
            _ => target,
        };

        let canonical_target =
            canonicalize_path(&target).map_err(|_| PathSecurityError::SymlinkOutsideRoot {
                path: path.to_path_buf(),
            })?;

        if !is_within_root(&canonical_target, &canonical_root) {
            return Err(PathSecurityError::SymlinkOutsideRoot {
                path: path.to_path_buf(),
            });
        }
    }

    let canonical_path = path.canonicalize().map_err(|e| PathSecurityError::CannotCanonicalize {
        path: path.to_path_buf(),
        error: e,
    })?;

    if !is_within_root(&canonical_path, &canonical_root) {
        return Err(PathSecurityError::OutsideRootDirectory {
            path: canonical_path,
            root: canonical_root,
        });
    }

    Ok(canonical_path)
}

/// Symlink hops followed while resolving a write target.
const MAX_LINK_HOPS: usize = 8;

/// Validates a path that may not exist yet (a write target).
///
/// The deepest existing ancestor is canonicalized and checked against the
/// root; the remaining components must be plain names. A dangling symlink on
/// the way is subject to the symlink policy and is resolved to its target,
/// which must itself pass these checks. Returns the path the caller should
/// create.
pub fn validate_new_path(input_path: &str, security: &SecurityConfig) -> Result<PathBuf, PathSecurityError> {
    resolve_new_path(Path::new(input_path), security, 0)
}

fn resolve_new_path(path: &Path, security: &SecurityConfig, hops: usize) -> Result<PathBuf, PathSecurityError> {
    if path.exists() {
        return validate_path(&path.to_string_lossy(), security);
    }
    if is_present(path) {
        return resolve_dangling_link(path, security, hops);
    }

    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        let Some(name) = existing.file_name() else {
            return Err(PathSecurityError::NoParent {
                path: path.to_path_buf(),
            });
        };
        missing.push(name.to_os_string());
        existing = match existing.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => {
                return Err(PathSecurityError::NoParent {
                    path: path.to_path_buf(),
                });
            }
        };
        if is_present(existing) {
            break;
        }
    }

    // `..` or `.` in the not-yet-existing tail would escape canonicalization
    if path
        .components()
        .rev()
        .take(missing.len())
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(PathSecurityError::CannotCanonicalize {
            path: path.to_path_buf(),
            error: io::Error::new(io::ErrorKind::InvalidInput, "relative components in new path"),
        });
    }

    let base = if existing.exists() {
        validate_path(&existing.to_string_lossy(), security)?
    } else {
        resolve_dangling_link(existing, security, hops)?
    };
    Ok(missing.into_iter().rev().fold(base, |acc, name| acc.join(name)))
}

/// Present on disk, even as a link whose target is missing.
fn is_present(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Resolve a symlink whose target does not exist yet.
fn resolve_dangling_link(link: &Path, security: &SecurityConfig, hops: usize) -> Result<PathBuf, PathSecurityError> {
    if security.root_path.is_some() && !security.allow_symlinks {
        return Err(PathSecurityError::SymlinkNotAllowed {
            path: link.to_path_buf(),
        });
    }
    if hops >= MAX_LINK_HOPS {
        return Err(PathSecurityError::CannotCanonicalize {
            path: link.to_path_buf(),
            error: io::Error::other("too many levels of symbolic links"),
        });
    }

    let target = link.read_link().map_err(|e| PathSecurityError::IoError {
        path: link.to_path_buf(),
        error: e,
    })?;
    let target = match link.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target,
    };

    resolve_new_path(&target, security, hops + 1).map_err(|e| match e {
        PathSecurityError::OutsideRootDirectory { .. } => PathSecurityError::SymlinkOutsideRoot {
            path: link.to_path_buf(),
        },
        other => other,
    })
}

fn canonical_root(root: &Path) -> Result<PathBuf, PathSecurityError> {
    root.canonicalize().map_err(|e| PathSecurityError::IoError {
        path: root.to_path_buf(),
        error: e,
    })
}

/// Checks if a path is within (or equal to) a root directory
fn is_within_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

fn canonicalize_path(path: &Path) -> Result<PathBuf, PathSecurityError> {
    path.canonicalize().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            PathSecurityError::PathNotFound {
                path: path.to_path_buf(),
            }
        } else {
            PathSecurityError::CannotCanonicalize {
                path: path.to_path_buf(),
                error: e,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn security(root: Option<PathBuf>, allow_symlinks: bool) -> SecurityConfig {
        SecurityConfig {
            root_path: root,
            allow_symlinks,
        }
    }

    #[test]
    fn test_no_root_allows_existing_paths() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test.txt");
        fs::write(&test_file, "test").unwrap();

        let result = validate_path(test_file.to_str().unwrap(), &security(None, true));
        assert!(result.is_ok());
    }

    #[test]
    fn test_path_outside_root() {
        let root_dir = TempDir::new().unwrap();
        let outside_dir = TempDir::new().unwrap();
        let outside_file = outside_dir.path().join("outside.txt");
        fs::write(&outside_file, "test").unwrap();

        let config = security(Some(root_dir.path().to_path_buf()), true);
        let result = validate_path(outside_file.to_str().unwrap(), &config);

        assert!(matches!(
            result,
            Err(PathSecurityError::OutsideRootDirectory { .. })
        ));
    }

    #[test]
    fn test_path_traversal_blocked() {
        let temp_dir = TempDir::new().unwrap();
        let subdir = temp_dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();
        fs::write(temp_dir.path().join("test.txt"), "test").unwrap();

        let config = security(Some(subdir.clone()), true);
        let traversal_path = subdir.join("../test.txt");

        let result = validate_path(traversal_path.to_str().unwrap(), &config);
        assert!(matches!(
            result,
            Err(PathSecurityError::OutsideRootDirectory { .. })
        ));
    }

    #[test]
    fn test_nonexistent_path() {
        let temp_dir = TempDir::new().unwrap();
        let nonexistent = temp_dir.path().join("does_not_exist.txt");

        let config = security(Some(temp_dir.path().to_path_buf()), true);
        let result = validate_path(nonexistent.to_str().unwrap(), &config);

        assert!(matches!(result, Err(PathSecurityError::PathNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_root_blocked() {
        use std::os::unix::fs::symlink;

        let root_dir = TempDir::new().unwrap();
        let outside_dir = TempDir::new().unwrap();
        let target_file = outside_dir.path().join("target.txt");
        let link_file = root_dir.path().join("link.txt");
        fs::write(&target_file, "test").unwrap();
        symlink(&target_file, &link_file).unwrap();

        let config = security(Some(root_dir.path().to_path_buf()), true);
        let result = validate_path(link_file.to_str().unwrap(), &config);

        assert!(matches!(
            result,
            Err(PathSecurityError::SymlinkOutsideRoot { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_disallowed_by_config() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let target_file = temp_dir.path().join("target.txt");
        let link_file = temp_dir.path().join("link.txt");
        fs::write(&target_file, "test").unwrap();
        symlink(&target_file, &link_file).unwrap();

        let config = security(Some(temp_dir.path().to_path_buf()), false);
        let result = validate_path(link_file.to_str().unwrap(), &config);
        assert!(matches!(result, Err(PathSecurityError::SymlinkNotAllowed { .. })));
    }

    #[test]
    fn test_new_path_inside_root() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("a/b/new.txt");

        let config = security(Some(temp_dir.path().to_path_buf()), true);
        let resolved = validate_new_path(target.to_str().unwrap(), &config).unwrap();

        let root = temp_dir.path().canonicalize().unwrap();
        assert_eq!(resolved, root.join("a/b/new.txt"));
    }

    #[test]
    fn test_new_path_outside_root() {
        let root_dir = TempDir::new().unwrap();
        let outside_dir = TempDir::new().unwrap();
        let target = outside_dir.path().join("new.txt");

        let config = security(Some(root_dir.path().to_path_buf()), true);
        let result = validate_new_path(target.to_str().unwrap(), &config);
        assert!(matches!(
            result,
            Err(PathSecurityError::OutsideRootDirectory { .. })
        ));
    }

    #[test]
    fn test_new_path_rejects_dotdot_tail() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("missing/../../escape.txt");

        let config = security(Some(temp_dir.path().to_path_buf()), true);
        assert!(validate_new_path(target.to_str().unwrap(), &config).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_path_dangling_symlink_disallowed() {
        use std::os::unix::fs::symlink;

        let root_dir = TempDir::new().unwrap();
        let outside_dir = TempDir::new().unwrap();
        let link = root_dir.path().join("link");
        symlink(outside_dir.path().join("escaped.txt"), &link).unwrap();

        let config = security(Some(root_dir.path().to_path_buf()), false);
        let result = validate_new_path(link.to_str().unwrap(), &config);
        assert!(matches!(result, Err(PathSecurityError::SymlinkNotAllowed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_new_path_dangling_symlink_outside_root() {
        use std::os::unix::fs::symlink;

        let root_dir = TempDir::new().unwrap();
        let outside_dir = TempDir::new().unwrap();
        let link = root_dir.path().join("link");
        symlink(outside_dir.path().join("escaped.txt"), &link).unwrap();

        let config = security(Some(root_dir.path().to_path_buf()), true);
        let result = validate_new_path(link.to_str().unwrap(), &config);
        assert!(matches!(result, Err(PathSecurityError::SymlinkOutsideRoot { .. })));

        // Through a dangling directory link as well
        let dir_link = root_dir.path().join("dir");
        symlink(outside_dir.path().join("missing"), &dir_link).unwrap();
        let nested = dir_link.join("new.txt");
        assert!(validate_new_path(nested.to_str().unwrap(), &config).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_path_dangling_symlink_inside_root() {
        use std::os::unix::fs::symlink;

        let root_dir = TempDir::new().unwrap();
        let link = root_dir.path().join("link");
        symlink("target.txt", &link).unwrap();

        let config = security(Some(root_dir.path().to_path_buf()), true);
        let resolved = validate_new_path(link.to_str().unwrap(), &config).unwrap();
        assert_eq!(resolved, root_dir.path().canonicalize().unwrap().join("target.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_new_path_symlink_loop() {
        use std::os::unix::fs::symlink;

        let root_dir = TempDir::new().unwrap();
        let link = root_dir.path().join("loop");
        symlink("loop", &link).unwrap();

        let config = security(Some(root_dir.path().to_path_buf()), true);
        assert!(validate_new_path(link.to_str().unwrap(), &config).is_err());
    }
}
