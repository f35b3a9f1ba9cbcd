//! Store-level integration: profiles, abilities, teams, and the response
//! cache exercised against real temp directories.

use automatosx::ability::{AbilityStore, MAX_ABILITY_FILE_SIZE};
use automatosx::profile::{MAX_PROFILE_FILE_SIZE, ProfileError, ProfileStore};
use automatosx::provider::{CacheConfig, ModelParams, ResponseCache};
use automatosx::team::TeamStore;
use automatosx::workspace::{PathResolver, is_inside};
use std::time::Duration;
use tempfile::TempDir;

fn automatosx_project() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    std::fs::create_dir(dir.path().join(".automatosx")).unwrap();
    dir
}

#[tokio::test]
async fn profile_size_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    let header = "role: r\ndescription: d\nsystemPrompt: s\n# ";
    let padding = MAX_PROFILE_FILE_SIZE as usize - header.len();

    // Exactly at the limit loads.
    std::fs::write(
        dir.path().join("edge.yaml"),
        format!("{}{}", header, "x".repeat(padding)),
    )
    .unwrap();
    assert!(store.get("edge").await.is_ok());

    // One byte over fails with the size error.
    std::fs::write(
        dir.path().join("over.yaml"),
        format!("{}{}", header, "x".repeat(padding + 1)),
    )
    .unwrap();
    assert!(matches!(
        store.get("over").await.unwrap_err(),
        ProfileError::TooLarge { .. }
    ));
}

#[tokio::test]
async fn ability_size_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let store = AbilityStore::new(dir.path().to_path_buf());

    std::fs::write(
        dir.path().join("edge.md"),
        "x".repeat(MAX_ABILITY_FILE_SIZE as usize),
    )
    .unwrap();
    assert!(store.get("edge").await.is_ok());

    std::fs::write(
        dir.path().join("over.md"),
        "x".repeat(MAX_ABILITY_FILE_SIZE as usize + 1),
    )
    .unwrap();
    assert!(store.get("over").await.is_err());
}

#[tokio::test]
async fn team_shared_abilities_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("engineering.yaml"),
        "name: engineering\ndisplayName: Engineering\ndescription: builds things\nprovider:\n  primary: claude-code\n  fallbackChain: [gemini, codex]\nsharedAbilities: [code-review]\n",
    )
    .unwrap();

    let store = TeamStore::new(dir.path().to_path_buf());
    let team = store.get("engineering").await.unwrap();
    assert_eq!(team.provider.primary, "claude-code");
    assert_eq!(
        team.shared_abilities.as_deref(),
        Some(&["code-review".to_string()][..])
    );
}

#[tokio::test]
async fn response_cache_survives_reopen_within_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("responses.json");
    let params = ModelParams {
        model: Some("sonnet".to_string()),
        temperature: Some(0.2),
        ..Default::default()
    };
    let config = CacheConfig {
        enabled: true,
        max_memory_entries: 8,
        max_entries: 64,
        ttl: Duration::from_secs(3600),
        path: Some(path),
    };

    let cache = ResponseCache::open(config.clone());
    cache
        .put("claude", "what is 2+2", &params, "4, byte for byte")
        .await;
    drop(cache);

    let reopened = ResponseCache::open(config);
    assert_eq!(
        reopened.get("claude", "what is 2+2", &params).await,
        Some("4, byte for byte".to_string())
    );

    // Equivalent parameter objects hash to the same key.
    let equivalent = ModelParams {
        temperature: Some(0.2),
        model: Some("sonnet".to_string()),
        ..Default::default()
    };
    assert!(
        reopened
            .get("claude", "what is 2+2", &equivalent)
            .await
            .is_some()
    );
}

#[test]
fn workspace_paths_stay_inside_project() {
    let dir = automatosx_project();
    let resolver = PathResolver::discover(dir.path()).unwrap();

    let workspace = resolver.ensure_agent_workspace("Front End!").unwrap();
    assert!(is_inside(&workspace, resolver.project_root()));
    assert!(workspace.ends_with(".automatosx/workspaces/front-end-"));

    assert!(resolver.resolve("../../etc/passwd").is_err());
    assert!(resolver.resolve("docs/notes.md").is_ok());
}
