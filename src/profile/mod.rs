//! # Agent Profile System
//!
//! Loads, validates, and caches agent profiles, and resolves display-name
//! aliases to profile names.
//!
//! ## Core Components
//!
//! - **[`ProfileStore`]**: Primary/fallback directory loading with TTL caching
//! - **[`AgentProfile`]**: The validated profile record
//! - **[`SelectionPolicy`]**: Normalized ability-selection policy
//!
//! Profiles are YAML files named `<name>.yaml` (or `.yml`). The primary
//! project-local directory wins over the built-in fallback directory; the
//! first readable file for a name is used. Files larger than 100 KB are
//! rejected, parses never execute code, and validation enforces required
//! fields and numeric ranges.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use automatosx::profile::ProfileStore;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = ProfileStore::new(
//!         PathBuf::from(".automatosx/agents"),
//!         None,
//!     );
//!
//!     let profile = store.resolve("backend").await?;
//!     println!("{}: {}", profile.name, profile.role);
//!     Ok(())
//! }
//! ```

/// Profile loading, caching, and alias resolution.
pub mod store;

/// Profile record, sub-records, and validation.
pub mod types;

#[cfg(test)]
mod tests;

pub use store::{PROFILE_CACHE_TTL, ProfileStore};
pub use types::{
    AbilitySelection, AgentProfile, MAX_PROFILE_FILE_SIZE, OrchestrationConfig, PersonalityConfig,
    ProfileError, SelectionPolicy, Stage,
};
