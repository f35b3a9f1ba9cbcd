use crate::profile::store::ProfileStore;
use crate::profile::types::{MAX_PROFILE_FILE_SIZE, ProfileError};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn create_profile_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

fn write_profile(dir: &Path, name: &str, display_name: Option<&str>) {
    let display_line = display_name
        .map(|d| format!("displayName: {}\n", d))
        .unwrap_or_default();
    let content = format!(
        "{}role: assistant\ndescription: test agent\nsystemPrompt: You are {}.\nabilities: [greet]\n",
        display_line, name
    );
    std::fs::write(dir.join(format!("{}.yaml", name)), content).unwrap();
}

#[tokio::test]
async fn test_load_from_primary_directory() {
    let dir = create_profile_dir();
    write_profile(dir.path(), "echo", None);

    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    let profile = store.get("echo").await.unwrap();
    assert_eq!(profile.name, "echo");
    assert_eq!(profile.abilities, vec!["greet".to_string()]);
}

#[tokio::test]
async fn test_primary_wins_over_fallback() {
    let primary = create_profile_dir();
    let fallback = create_profile_dir();
    std::fs::write(
        primary.path().join("echo.yaml"),
        "role: primary\ndescription: from primary\nsystemPrompt: P\n",
    )
    .unwrap();
    std::fs::write(
        fallback.path().join("echo.yaml"),
        "role: fallback\ndescription: from fallback\nsystemPrompt: F\n",
    )
    .unwrap();

    let store = ProfileStore::new(
        primary.path().to_path_buf(),
        Some(fallback.path().to_path_buf()),
    );
    assert_eq!(store.get("echo").await.unwrap().role, "primary");
}

#[tokio::test]
async fn test_fallback_used_when_primary_missing() {
    let primary = create_profile_dir();
    let fallback = create_profile_dir();
    write_profile(fallback.path(), "planner", None);

    let store = ProfileStore::new(
        primary.path().to_path_buf(),
        Some(fallback.path().to_path_buf()),
    );
    assert_eq!(store.get("planner").await.unwrap().name, "planner");
}

#[tokio::test]
async fn test_not_found() {
    let dir = create_profile_dir();
    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    let err = store.get("missing").await.unwrap_err();
    assert!(matches!(err, ProfileError::NotFound { .. }));
    assert_eq!(err.code(), 2001);
}

#[tokio::test]
async fn test_invalid_name_rejected_before_disk_access() {
    let dir = create_profile_dir();
    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    let err = store.get("../evil").await.unwrap_err();
    assert!(matches!(err, ProfileError::InvalidName { .. }));
}

#[tokio::test]
async fn test_size_boundary() {
    let dir = create_profile_dir();
    let header = "role: r\ndescription: d\nsystemPrompt: s\n# ";
    let path = dir.path().join("big.yaml");

    // Pad the file to exactly the limit with a trailing comment.
    let padding = MAX_PROFILE_FILE_SIZE as usize - header.len();
    std::fs::write(&path, format!("{}{}", header, "x".repeat(padding))).unwrap();
    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    assert!(store.get("big").await.is_ok());

    // One byte over fails.
    std::fs::write(&path, format!("{}{}", header, "x".repeat(padding + 1))).unwrap();
    store.clear_cache().await;
    let err = store.get("big").await.unwrap_err();
    assert!(matches!(err, ProfileError::TooLarge { .. }));
}

#[tokio::test]
async fn test_validation_failure_reports_problems() {
    let dir = create_profile_dir();
    std::fs::write(
        dir.path().join("bad.yaml"),
        "role: r\ndescription: d\nsystemPrompt: s\ntemperature: 2.0\n",
    )
    .unwrap();
    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    match store.get("bad").await.unwrap_err() {
        ProfileError::ValidationFailed { problems, .. } => {
            assert!(problems.iter().any(|p| p.contains("temperature")));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_cache_hit_returns_equal_profile() {
    let dir = create_profile_dir();
    write_profile(dir.path(), "echo", None);
    let store = ProfileStore::new(dir.path().to_path_buf(), None);

    let first = store.get("echo").await.unwrap();
    // Remove the file; a cache hit must still serve the parsed value.
    std::fs::remove_file(dir.path().join("echo.yaml")).unwrap();
    let second = store.get("echo").await.unwrap();
    assert_eq!(*first, *second);
}

#[tokio::test]
async fn test_cache_expiry_reloads_from_disk() {
    let dir = create_profile_dir();
    write_profile(dir.path(), "echo", None);
    let store =
        ProfileStore::new(dir.path().to_path_buf(), None).with_ttl(Duration::from_millis(10));

    store.get("echo").await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    std::fs::remove_file(dir.path().join("echo.yaml")).unwrap();
    assert!(store.get("echo").await.is_err());
}

#[tokio::test]
async fn test_display_name_alias_resolution() {
    let dir = create_profile_dir();
    write_profile(dir.path(), "backend", Some("Backend Engineer"));

    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    let profile = store.resolve("backend engineer").await.unwrap();
    assert_eq!(profile.name, "backend");
}

#[tokio::test]
async fn test_exact_name_wins_over_alias() {
    let dir = create_profile_dir();
    // "writer" is both a real profile and another profile's display name.
    write_profile(dir.path(), "writer", None);
    write_profile(dir.path(), "scribe", Some("writer"));

    let store = ProfileStore::new(dir.path().to_path_buf(), None);
    let profile = store.resolve("writer").await.unwrap();
    assert_eq!(profile.name, "writer");
}

#[tokio::test]
async fn test_alias_map_not_rebuilt_until_clear() {
    let dir = create_profile_dir();
    write_profile(dir.path(), "backend", Some("Backend Engineer"));
    let store = ProfileStore::new(dir.path().to_path_buf(), None);

    // First miss builds the map.
    assert!(store.resolve("nobody").await.is_err());

    // A profile added after the build is invisible to aliases until clear.
    write_profile(dir.path(), "frontend", Some("Frontend Engineer"));
    assert!(store.resolve("frontend engineer").await.is_err());

    store.clear_cache().await;
    assert!(store.resolve("frontend engineer").await.is_ok());
}

#[tokio::test]
async fn test_list_is_sorted_union() {
    let primary = create_profile_dir();
    let fallback = create_profile_dir();
    write_profile(primary.path(), "zeta", None);
    write_profile(fallback.path(), "alpha", None);
    // Invalid file must not abort enumeration.
    std::fs::write(primary.path().join("broken.yaml"), ": not yaml :::").unwrap();

    let store = ProfileStore::new(
        primary.path().to_path_buf(),
        Some(fallback.path().to_path_buf()),
    );
    let names = store.list().await;
    assert_eq!(names, vec!["alpha", "broken", "zeta"]);
}
