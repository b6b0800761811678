use memoix_sync::cloud::{FolderConfig, FolderProvider, StorageProvider};
use memoix_sync::{BUNDLE_FILE_NAME, META_FILE_NAME, SyncError};
use memoix_types::{Bundle, ProviderKind, Recipe, StorageMeta};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn provider_in(dir: &TempDir) -> FolderProvider {
    FolderProvider::new(FolderConfig {
        default_folder: Some(dir.path().to_path_buf()),
        create_missing: false,
    })
}

fn sample_bundle() -> Bundle {
    let mut bundle = Bundle::empty("Laptop");
    bundle.push_record(Recipe::new("Shakshuka", "breakfast"));
    bundle
}

// ── Capabilities ─────────────────────────────────────────────────

#[test]
fn folder_provider_capabilities() {
    let provider = FolderProvider::new(FolderConfig::default());
    assert_eq!(provider.kind(), ProviderKind::LocalFolder);
    assert_eq!(provider.name(), "Local folder");
    assert!(provider.supports_automatic_sync());
    assert!(provider.supports_fast_meta_check());
    assert!(!provider.is_connected());
    assert_eq!(provider.connected_path(), None);
}

#[tokio::test]
async fn initialize_has_nothing_to_restore() {
    let provider = FolderProvider::new(FolderConfig::default());
    assert!(provider.initialize().await.unwrap());
    assert!(!provider.is_connected());
}

// ── Connect / select / verify ────────────────────────────────────

#[tokio::test]
async fn connect_uses_default_folder() {
    let dir = TempDir::new().unwrap();
    let provider = provider_in(&dir);

    provider.connect().await.unwrap();

    assert!(provider.is_connected());
    assert_eq!(
        provider.connected_path(),
        Some(dir.path().to_string_lossy().into_owned())
    );
}

#[tokio::test]
async fn connect_without_any_folder_fails() {
    let provider = FolderProvider::new(FolderConfig::default());
    assert!(provider.connect().await.is_err());
    assert!(!provider.is_connected());
}

#[tokio::test]
async fn connect_creates_missing_folder_when_allowed() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("Memoix").join("sync");
    let provider = FolderProvider::new(FolderConfig {
        default_folder: Some(target.clone()),
        create_missing: true,
    });

    provider.connect().await.unwrap();

    assert!(target.is_dir());
}

#[tokio::test]
async fn connect_refuses_missing_folder_by_default() {
    let dir = TempDir::new().unwrap();
    let provider = FolderProvider::new(FolderConfig {
        default_folder: Some(dir.path().join("absent")),
        create_missing: false,
    });

    let err = provider.connect().await.unwrap_err();
    assert!(matches!(err, SyncError::AccessDenied(_)));
}

#[tokio::test]
async fn verify_access_accepts_existing_directory() {
    let dir = TempDir::new().unwrap();
    let provider = FolderProvider::new(FolderConfig::default());

    provider
        .select_folder(&dir.path().to_string_lossy())
        .await
        .unwrap();

    provider.verify_access().await.unwrap();
}

#[tokio::test]
async fn verify_access_rejects_missing_folder() {
    let dir = TempDir::new().unwrap();
    let provider = FolderProvider::new(FolderConfig::default());
    provider
        .select_folder(&dir.path().join("gone").to_string_lossy())
        .await
        .unwrap();

    let err = provider.verify_access().await.unwrap_err();
    assert!(matches!(err, SyncError::AccessDenied(_)));
}

#[tokio::test]
async fn verify_access_rejects_a_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "not a folder").unwrap();
    let provider = FolderProvider::new(FolderConfig::default());
    provider
        .select_folder(&file.to_string_lossy())
        .await
        .unwrap();

    let err = provider.verify_access().await.unwrap_err();
    assert!(matches!(err, SyncError::AccessDenied(_)));
}

#[tokio::test]
async fn verify_without_selection_is_not_connected() {
    let provider = FolderProvider::new(FolderConfig::default());
    let err = provider.verify_access().await.unwrap_err();
    assert!(matches!(err, SyncError::NotConnected));
}

#[tokio::test]
async fn disconnect_forgets_folder() {
    let dir = TempDir::new().unwrap();
    let provider = provider_in(&dir);
    provider.connect().await.unwrap();

    provider.disconnect().await.unwrap();

    assert!(!provider.is_connected());
    assert!(matches!(
        provider.pull().await.unwrap_err(),
        SyncError::NotConnected
    ));
}

// ── Transfer ─────────────────────────────────────────────────────

#[tokio::test]
async fn empty_folder_has_no_bundle_or_meta() {
    let dir = TempDir::new().unwrap();
    let provider = provider_in(&dir);
    provider.connect().await.unwrap();

    assert_eq!(provider.pull().await.unwrap(), None);
    assert_eq!(provider.get_meta().await.unwrap(), None);
}

#[tokio::test]
async fn push_then_pull_returns_the_bundle() {
    let dir = TempDir::new().unwrap();
    let provider = provider_in(&dir);
    provider.connect().await.unwrap();
    let bundle = sample_bundle();

    provider.push(&bundle).await.unwrap();

    assert_eq!(provider.pull().await.unwrap(), Some(bundle));
    assert!(dir.path().join(BUNDLE_FILE_NAME).is_file());
}

#[tokio::test]
async fn push_replaces_previous_bundle_without_leftovers() {
    let dir = TempDir::new().unwrap();
    let provider = provider_in(&dir);
    provider.connect().await.unwrap();

    provider.push(&sample_bundle()).await.unwrap();
    let second = Bundle::empty("Phone");
    provider.push(&second).await.unwrap();

    assert_eq!(provider.pull().await.unwrap(), Some(second));
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![BUNDLE_FILE_NAME.to_string()]);
}

#[tokio::test]
async fn meta_round_trips_through_folder() {
    let dir = TempDir::new().unwrap();
    let provider = provider_in(&dir);
    provider.connect().await.unwrap();
    let meta = StorageMeta::for_bundle(&sample_bundle());

    provider.update_meta(&meta).await.unwrap();

    assert_eq!(provider.get_meta().await.unwrap(), Some(meta));
    assert!(dir.path().join(META_FILE_NAME).is_file());
}

#[tokio::test]
async fn corrupt_bundle_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(BUNDLE_FILE_NAME), "{ truncated").unwrap();
    let provider = provider_in(&dir);
    provider.connect().await.unwrap();

    let err = provider.pull().await.unwrap_err();
    assert!(matches!(err, SyncError::Serialization(_)));
}
