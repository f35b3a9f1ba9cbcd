//! Path resolution and workspace management.
//!
//! Every path handed to the execution engine must resolve inside the project
//! root. This module owns project-root detection, the post-normalization
//! boundary check, agent-name sanitization, and workspace creation with
//! owner-only permissions on POSIX platforms. Boundary violations are treated
//! as security events and are never retried.

use crate::env;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Path resolution failures. All variants are non-retryable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PathError {
    #[error("path escapes the project boundary: {path}")]
    Traversal { path: String },
    #[error("invalid path for this platform: {path}")]
    InvalidPath { path: String },
    #[error("path not found: {path}")]
    NotFound { path: String },
    #[error("failed to create workspace {path}: {reason}")]
    CreationFailed { path: String, reason: String },
}

impl PathError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            PathError::Traversal { .. } => 3001,
            PathError::InvalidPath { .. } => 3002,
            PathError::NotFound { .. } => 3003,
            PathError::CreationFailed { .. } => 3004,
        }
    }
}

/// Project markers checked at each directory while walking upward, in
/// priority order
const ROOT_MARKERS: &[&str] = &[
    ".git",
    "package.json",
    "pyproject.toml",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    env::AUTOMATOSX_DIR_NAME,
];

/// Resolves project-relative paths and manages workspace directories
#[derive(Debug, Clone)]
pub struct PathResolver {
    project_root: PathBuf,
}

impl PathResolver {
    /// Create a resolver rooted at the project containing `start`.
    ///
    /// Walks upward from `start` and stops at the first directory carrying a
    /// project marker; falls back to `start` itself when no marker is found.
    pub fn discover(start: &Path) -> Result<Self, PathError> {
        let start = start
            .canonicalize()
            .map_err(|_| PathError::NotFound {
                path: start.display().to_string(),
            })?;
        let project_root = find_project_root(&start);
        debug!("Resolved project root: {}", project_root.display());
        Ok(Self { project_root })
    }

    /// Create a resolver with an explicit, existing project root
    pub fn with_root(project_root: PathBuf) -> Result<Self, PathError> {
        let project_root = project_root.canonicalize().map_err(|_| PathError::NotFound {
            path: project_root.display().to_string(),
        })?;
        Ok(Self { project_root })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve a user-supplied path to an absolute path guaranteed to lie
    /// within the project root
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf, PathError> {
        reject_foreign_platform_path(user_path)?;

        let candidate = Path::new(user_path);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.project_root.join(candidate)
        };
        let normalized = normalize_lexically(&absolute);

        if !is_inside(&normalized, &self.project_root) {
            warn!(
                "Path traversal attempt: {} resolves outside {}",
                user_path,
                self.project_root.display()
            );
            return Err(PathError::Traversal {
                path: user_path.to_string(),
            });
        }
        Ok(normalized)
    }

    /// Produce the workspace directory for an agent, creating it with
    /// owner-only permissions on POSIX
    pub fn ensure_agent_workspace(&self, agent_name: &str) -> Result<PathBuf, PathError> {
        let sanitized = sanitize_agent_name(agent_name);
        let workspace = env::agent_workspace_path(&self.project_root, &sanitized);

        // Sanitization cannot introduce separators, but the boundary is
        // re-verified before any directory is created.
        if !is_inside(&normalize_lexically(&workspace), &self.project_root) {
            return Err(PathError::Traversal {
                path: workspace.display().to_string(),
            });
        }

        create_private_dir(&workspace)?;
        Ok(workspace)
    }

    /// Produce the session-scoped shared workspace for a session id
    pub fn ensure_session_workspace(&self, session_id: &str) -> Result<PathBuf, PathError> {
        let workspace = env::session_workspace_path(&self.project_root, session_id);
        if !is_inside(&normalize_lexically(&workspace), &self.project_root) {
            return Err(PathError::Traversal {
                path: workspace.display().to_string(),
            });
        }
        create_private_dir(&workspace)?;
        Ok(workspace)
    }

    /// Produce the persistent shared workspace.
    ///
    /// Concurrent agents using this directory see each other's files; only
    /// session-scoped shared workspaces isolate per session.
    pub fn ensure_persistent_workspace(&self) -> Result<PathBuf, PathError> {
        let workspace = env::persistent_workspace_path(&self.project_root);
        create_private_dir(&workspace)?;
        Ok(workspace)
    }
}

/// Walk upward from `start`, returning the first directory containing a
/// project marker, or `start` when none is found
pub fn find_project_root(start: &Path) -> PathBuf {
    let mut current = Some(start);
    while let Some(dir) = current {
        for marker in ROOT_MARKERS {
            if dir.join(marker).exists() {
                return dir.to_path_buf();
            }
        }
        current = dir.parent();
    }
    start.to_path_buf()
}

/// Boundary check: `path == base` or `path` has `base` + separator as a
/// prefix. Comparison normalizes to forward slashes so the result is stable
/// across platforms.
pub fn is_inside(path: &Path, base: &Path) -> bool {
    let path = slashed(path);
    let base = slashed(base);
    path == base || path.starts_with(&format!("{}/", base.trim_end_matches('/')))
}

/// Replace every character outside `[A-Za-z0-9-]` with `-` and lowercase
pub fn sanitize_agent_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Resolve `.` and `..` components without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
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

fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn reject_foreign_platform_path(user_path: &str) -> Result<(), PathError> {
    #[cfg(not(windows))]
    {
        let looks_windows = user_path.contains('\\')
            || (user_path.len() >= 2
                && user_path.as_bytes()[1] == b':'
                && user_path.as_bytes()[0].is_ascii_alphabetic());
        if looks_windows {
            return Err(PathError::InvalidPath {
                path: user_path.to_string(),
            });
        }
    }
    let _ = user_path;
    Ok(())
}

fn create_private_dir(path: &Path) -> Result<(), PathError> {
    std::fs::create_dir_all(path).map_err(|e| PathError::CreationFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(path, permissions).map_err(|e| PathError::CreationFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
