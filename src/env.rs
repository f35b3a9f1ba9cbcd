//! Environment constants and path utilities for AutomatosX.
//!
//! This module centralizes all hardcoded paths and directory names used
//! throughout the application, making them easier to maintain and modify.

/// Main application directory name (hidden directory like .git, .vscode)
pub const AUTOMATOSX_DIR_NAME: &str = ".automatosx";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Agent profile directory and file names
pub mod agents {
    /// Agent profiles directory name within .automatosx
    pub const AGENTS_DIR_NAME: &str = "agents";

    /// Ability documents directory name
    pub const ABILITIES_DIR_NAME: &str = "abilities";

    /// Team configuration directory name
    pub const TEAMS_DIR_NAME: &str = "teams";
}

/// Workspace-related directory names
pub mod workspace {
    /// Workspaces directory name within .automatosx
    pub const WORKSPACES_DIR_NAME: &str = "workspaces";

    /// Shared workspace directory name
    pub const SHARED_DIR_NAME: &str = "shared";

    /// Session-scoped shared workspaces directory name
    pub const SESSIONS_DIR_NAME: &str = "sessions";

    /// Persistent shared workspace directory name
    pub const PERSISTENT_DIR_NAME: &str = "persistent";

    /// Subprocess audit log directory name inside a workspace
    pub const LOGS_DIR_NAME: &str = "logs";
}

/// Cache-related directory and file names
pub mod cache {
    /// Cache directory name within .automatosx
    pub const CACHE_DIR_NAME: &str = "cache";

    /// Persistent response cache file name
    pub const RESPONSES_FILE_NAME: &str = "responses.json";
}

/// Environment flag enabling CPU/memory profiling in the host.
///
/// The engine does not sample anything itself; it accepts the flag and
/// surfaces it to the injected telemetry sink so the host can attach its
/// profiler.
pub const PROFILER_ENV_VAR: &str = "AUTOMATOSX_PROFILER";

/// Whether the profiler flag is set. An explicit `0`/`false` counts as off.
pub fn profiler_enabled_from_env() -> bool {
    match std::env::var(PROFILER_ENV_VAR) {
        Ok(value) if value == "0" || value.eq_ignore_ascii_case("false") => false,
        Ok(_) => true,
        Err(_) => false,
    }
}

use std::path::{Path, PathBuf};

/// Build the main .automatosx directory path from a project root
pub fn automatosx_dir_path(project_root: &Path) -> PathBuf {
    project_root.join(AUTOMATOSX_DIR_NAME)
}

/// Build the agent profiles directory path from a project root
pub fn agents_dir_path(project_root: &Path) -> PathBuf {
    automatosx_dir_path(project_root).join(agents::AGENTS_DIR_NAME)
}

/// Build the abilities directory path from a project root
pub fn abilities_dir_path(project_root: &Path) -> PathBuf {
    automatosx_dir_path(project_root).join(agents::ABILITIES_DIR_NAME)
}

/// Build the teams directory path from a project root
pub fn teams_dir_path(project_root: &Path) -> PathBuf {
    automatosx_dir_path(project_root).join(agents::TEAMS_DIR_NAME)
}

/// Build the workspaces directory path from a project root
pub fn workspaces_dir_path(project_root: &Path) -> PathBuf {
    automatosx_dir_path(project_root).join(workspace::WORKSPACES_DIR_NAME)
}

/// Build a specific agent workspace path (agent name must already be sanitized)
pub fn agent_workspace_path(project_root: &Path, sanitized_agent: &str) -> PathBuf {
    workspaces_dir_path(project_root).join(sanitized_agent)
}

/// Build the shared workspace root path
pub fn shared_workspace_path(project_root: &Path) -> PathBuf {
    workspaces_dir_path(project_root).join(workspace::SHARED_DIR_NAME)
}

/// Build a session-scoped shared workspace path
pub fn session_workspace_path(project_root: &Path, session_id: &str) -> PathBuf {
    shared_workspace_path(project_root)
        .join(workspace::SESSIONS_DIR_NAME)
        .join(session_id)
}

/// Build the persistent shared workspace path
pub fn persistent_workspace_path(project_root: &Path) -> PathBuf {
    shared_workspace_path(project_root).join(workspace::PERSISTENT_DIR_NAME)
}

/// Build the cache directory path from a project root
pub fn cache_dir_path(project_root: &Path) -> PathBuf {
    automatosx_dir_path(project_root).join(cache::CACHE_DIR_NAME)
}

/// Build the persistent response cache file path
pub fn response_cache_file_path(project_root: &Path) -> PathBuf {
    cache_dir_path(project_root).join(cache::RESPONSES_FILE_NAME)
}

/// Build the config file path for a project root
pub fn config_file_path(project_root: &Path) -> PathBuf {
    automatosx_dir_path(project_root).join(CONFIG_FILE_NAME)
}
