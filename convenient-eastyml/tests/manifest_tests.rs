//! Integration tests for loading east.yml from disk

use convenient_eastyml::{Manifest, ManifestError, MANIFEST_FILE};
use tempfile::TempDir;
use tokio::fs;

const EAST_YML: &str = r#"
apps:
  - name: nrf52_app
    west-boards: [nrf52840dk_nrf52840]
    build-types:
      - type: debug
        conf-files: [debug.conf]
pack:
  artifacts:
    - $APP_DIR/zephyr/zephyr.map
  extra:
    - README.md
"#;

#[tokio::test]
async fn test_load_optional_without_manifest() {
    let temp = TempDir::new().unwrap();

    let manifest = Manifest::load_optional(temp.path()).await.unwrap();
    assert!(manifest.is_none());
}

#[tokio::test]
async fn test_load_optional_with_empty_manifest() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(MANIFEST_FILE), "\n").await.unwrap();

    let manifest = Manifest::load_optional(temp.path()).await.unwrap();
    assert!(manifest.is_none());
}

#[tokio::test]
async fn test_load_reports_not_found() {
    let temp = TempDir::new().unwrap();

    let result = Manifest::load(temp.path().join(MANIFEST_FILE)).await;
    match result.unwrap_err() {
        ManifestError::NotFound(path) => assert!(path.ends_with(MANIFEST_FILE)),
        other => panic!("Expected NotFound error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_manifest_with_pack() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILE);
    fs::write(&path, EAST_YML).await.unwrap();

    let manifest = Manifest::load_optional(temp.path()).await.unwrap().unwrap();

    assert_eq!(manifest.path, path);
    assert_eq!(manifest.app("nrf52_app").unwrap().build_types.len(), 1);
    let pack = manifest.pack.as_ref().unwrap();
    assert_eq!(pack.extra, vec!["README.md"]);
    assert_eq!(
        pack.artifacts_for("nrf52_app", Some("debug")),
        vec!["$APP_DIR/zephyr/zephyr.map"]
    );
}

#[tokio::test]
async fn test_checksum_tracks_content() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILE);

    fs::write(&path, EAST_YML).await.unwrap();
    let first = Manifest::load(&path).await.unwrap().checksum;
    let again = Manifest::load(&path).await.unwrap().checksum;
    fs::write(&path, EAST_YML.replace("debug.conf", "rtt.conf")).await.unwrap();
    let changed = Manifest::load(&path).await.unwrap().checksum;

    assert_eq!(first, again);
    assert_ne!(first, changed);
}

#[tokio::test]
async fn test_schema_error_aborts_load() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(MANIFEST_FILE),
        EAST_YML.replace("  artifacts:\n", "  artifacts:\n    - README.md\n    - README.md\n"),
    )
    .await
    .unwrap();

    let err = Manifest::load_optional(temp.path()).await.unwrap_err();
    match err {
        ManifestError::SchemaError { key, .. } => assert_eq!(key, "pack.artifacts"),
        other => panic!("Expected SchemaError, got {:?}", other),
    }
}
