mod common;

use common::{Failure, MockProvider};
use memoix_store::MemoryStore;
use memoix_sync::cloud::ProviderRegistry;
use memoix_sync::{
    ConnectionSnapshot, RepositorySwitcher, StorageProvider, SyncError, SyncSettings,
};
use memoix_types::{ProviderKind, Repository, RepositoryId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    folder: Arc<MockProvider>,
    drive: Arc<MockProvider>,
    registry: Arc<ProviderRegistry>,
    settings: SyncSettings,
    switcher: Arc<RepositorySwitcher>,
}

fn fixture_with(folder: MockProvider, drive: MockProvider) -> Fixture {
    let folder = Arc::new(folder);
    let drive = Arc::new(drive);
    let registry = Arc::new(
        ProviderRegistry::new()
            .with_provider(folder.clone())
            .with_provider(drive.clone()),
    );
    let settings = SyncSettings::new(Arc::new(MemoryStore::new()));
    let switcher = Arc::new(RepositorySwitcher::new(registry.clone(), settings.clone()));
    Fixture {
        folder,
        drive,
        registry,
        settings,
        switcher,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        MockProvider::new(ProviderKind::LocalFolder),
        MockProvider::new(ProviderKind::GoogleDrive),
    )
}

fn active_count(repositories: &[Repository]) -> usize {
    repositories.iter().filter(|r| r.is_active).count()
}

// ── Adding & removing ────────────────────────────────────────────

#[tokio::test]
async fn added_repository_is_pending_and_inactive() {
    let f = fixture();

    let repo = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", false)
        .await
        .unwrap();

    assert!(repo.is_pending_verification);
    assert!(!repo.is_active);
    assert!(!repo.access_denied);
    assert_eq!(f.switcher.repositories().await.unwrap(), vec![repo]);
    assert_eq!(f.switcher.active_repository().await.unwrap(), None);
    assert_eq!(f.registry.active_kind(), None);
}

#[tokio::test]
async fn add_with_make_active_keeps_one_active() {
    let f = fixture();
    f.switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();

    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", true)
        .await
        .unwrap();

    let repositories = f.switcher.repositories().await.unwrap();
    assert_eq!(active_count(&repositories), 1);
    assert_eq!(
        f.switcher.active_repository().await.unwrap().map(|r| r.id),
        Some(shared.id)
    );
    assert_eq!(f.registry.active_kind(), Some(ProviderKind::GoogleDrive));
    assert_eq!(
        f.settings.connection().await.unwrap(),
        ConnectionSnapshot {
            provider_id: Some("google_drive".to_string()),
            path: Some("drive-folder".to_string()),
        }
    );
}

#[tokio::test]
async fn unreachable_repository_added_as_active_is_not_added() {
    let f = fixture();
    let kitchen = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();
    let connection_before = f.settings.connection().await.unwrap();
    f.drive.fail_verify(Some(Failure::AccessDenied));

    let err = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", true)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::AccessDenied(_)));
    assert!(!kitchen.is_pending_verification);
    assert_eq!(f.switcher.repositories().await.unwrap(), vec![kitchen]);
    assert_eq!(f.registry.active_kind(), Some(ProviderKind::LocalFolder));
    assert_eq!(f.settings.connection().await.unwrap(), connection_before);
    assert_eq!(f.drive.folder(), None);
    assert!(!f.drive.is_connected());
}

#[test]
fn adding_unregistered_provider_fails() {
    let folder = Arc::new(MockProvider::new(ProviderKind::LocalFolder));
    let registry = Arc::new(ProviderRegistry::new().with_provider(folder));
    let settings = SyncSettings::new(Arc::new(MemoryStore::new()));
    let switcher = RepositorySwitcher::new(registry, settings);

    let err = tokio_test::block_on(switcher.add_repository(
        "Shared",
        ProviderKind::GoogleDrive,
        "drive-folder",
        false,
    ))
    .unwrap_err();

    assert!(matches!(err, SyncError::UnknownProvider(_)));
    assert!(tokio_test::block_on(switcher.repositories()).unwrap().is_empty());
}

#[tokio::test]
async fn removing_active_repository_disconnects() {
    let f = fixture();
    let repo = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();

    let removed = f.switcher.remove_repository(repo.id).await.unwrap();

    assert_eq!(removed.id, repo.id);
    assert!(f.switcher.repositories().await.unwrap().is_empty());
    assert_eq!(f.registry.active_kind(), None);
    assert_eq!(
        f.settings.connection().await.unwrap(),
        ConnectionSnapshot::default()
    );
}

#[tokio::test]
async fn removing_inactive_repository_keeps_connection() {
    let f = fixture();
    f.switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();
    let spare = f
        .switcher
        .add_repository("Spare", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();

    f.switcher.remove_repository(spare.id).await.unwrap();

    assert_eq!(f.registry.active_kind(), Some(ProviderKind::LocalFolder));
    assert_eq!(
        f.settings.connection().await.unwrap().path.as_deref(),
        Some("/srv/kitchen")
    );
}

#[tokio::test]
async fn removing_unknown_repository_is_not_found() {
    let f = fixture();
    let err = f
        .switcher
        .remove_repository(RepositoryId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RepositoryNotFound(_)));
}

// ── Flags ────────────────────────────────────────────────────────

#[tokio::test]
async fn verification_flags_round_trip() {
    let f = fixture();
    let repo = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", false)
        .await
        .unwrap();

    let denied = f.switcher.mark_as_access_denied(repo.id).await.unwrap();
    assert!(denied.access_denied);

    let verified = f.switcher.mark_as_verified(repo.id).await.unwrap();
    assert!(!verified.is_pending_verification);
    assert!(!verified.access_denied);

    let stored = f.switcher.repositories().await.unwrap();
    assert_eq!(stored, vec![verified]);
}

#[tokio::test]
async fn update_last_synced_persists() {
    let f = fixture();
    let repo = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", false)
        .await
        .unwrap();
    let at = chrono::Utc::now();

    f.switcher.update_last_synced(repo.id, at).await.unwrap();

    let stored = f.switcher.repositories().await.unwrap();
    assert_eq!(stored[0].last_synced, Some(at));
}

#[tokio::test]
async fn flag_update_on_unknown_repository_fails() {
    let f = fixture();
    let err = f
        .switcher
        .mark_as_verified(RepositoryId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RepositoryNotFound(_)));
}

#[tokio::test]
async fn persisted_list_with_two_actives_is_repaired() {
    let f = fixture();
    let mut first = Repository::new("First", ProviderKind::LocalFolder, "/a");
    first.is_active = true;
    let mut second = Repository::new("Second", ProviderKind::GoogleDrive, "b");
    second.is_active = true;
    f.settings
        .save_repositories(&[first.clone(), second.clone()])
        .await
        .unwrap();

    let repositories = f.switcher.repositories().await.unwrap();

    assert_eq!(active_count(&repositories), 1);
    assert_eq!(
        f.switcher.active_repository().await.unwrap().map(|r| r.id),
        Some(first.id)
    );
    let persisted = f.settings.repositories().await.unwrap();
    assert_eq!(active_count(&persisted), 1);
}

#[tokio::test]
async fn verify_marks_reachable_repository() {
    let f = fixture_with(
        MockProvider::new(ProviderKind::LocalFolder).connected_to("/srv/kitchen"),
        MockProvider::new(ProviderKind::GoogleDrive),
    );
    let spare = f
        .switcher
        .add_repository("Spare", ProviderKind::LocalFolder, "/srv/spare", false)
        .await
        .unwrap();

    let verified = f.switcher.verify_repository(spare.id).await.unwrap();

    assert!(!verified.is_pending_verification);
    assert!(!verified.is_active);
    assert_eq!(f.folder.folder().as_deref(), Some("/srv/kitchen"));
    assert_eq!(f.registry.active_kind(), None);
}

#[tokio::test]
async fn verify_records_access_denied() {
    let f = fixture();
    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();
    f.drive.fail_verify(Some(Failure::AccessDenied));

    let err = f.switcher.verify_repository(shared.id).await.unwrap_err();

    assert!(matches!(err, SyncError::AccessDenied(_)));
    let stored = f.switcher.repositories().await.unwrap();
    assert!(stored[0].access_denied);
    assert!(stored[0].is_pending_verification);
}

// ── Switching ────────────────────────────────────────────────────

#[tokio::test]
async fn switch_activates_target_after_readiness_checks() {
    let f = fixture();
    let kitchen = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();
    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();

    let active = f.switcher.set_active_repository(shared.id).await.unwrap();

    assert_eq!(active.id, shared.id);
    assert!(active.is_active);
    assert!(!active.is_pending_verification);
    assert!(!f.switcher.is_switching());
    assert_eq!(f.drive.folder().as_deref(), Some("drive-folder"));
    assert_eq!(f.registry.active_kind(), Some(ProviderKind::GoogleDrive));
    assert_eq!(
        f.settings.connection().await.unwrap(),
        ConnectionSnapshot {
            provider_id: Some("google_drive".to_string()),
            path: Some("drive-folder".to_string()),
        }
    );

    let repositories = f.switcher.repositories().await.unwrap();
    assert_eq!(active_count(&repositories), 1);
    let old = repositories.iter().find(|r| r.id == kitchen.id).unwrap();
    assert!(!old.is_active);
}

#[tokio::test]
async fn switch_connects_disconnected_provider() {
    let f = fixture();
    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();

    f.switcher.set_active_repository(shared.id).await.unwrap();

    assert_eq!(
        f.drive
            .connect_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert_eq!(f.drive.folder().as_deref(), Some("drive-folder"));
}

#[tokio::test]
async fn failed_switch_rolls_back_and_marks_denied() {
    let f = fixture_with(
        MockProvider::new(ProviderKind::LocalFolder).connected_to("/srv/kitchen"),
        MockProvider::new(ProviderKind::GoogleDrive).connected_to("previous-drive-folder"),
    );
    let kitchen = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();
    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();
    let connection_before = f.settings.connection().await.unwrap();
    f.drive.fail_verify(Some(Failure::AccessDenied));

    let err = f.switcher.set_active_repository(shared.id).await.unwrap_err();

    assert!(matches!(err, SyncError::AccessDenied(_)));
    assert!(!f.switcher.is_switching());
    assert_eq!(
        f.switcher.active_repository().await.unwrap().map(|r| r.id),
        Some(kitchen.id)
    );
    let repositories = f.switcher.repositories().await.unwrap();
    let target = repositories.iter().find(|r| r.id == shared.id).unwrap();
    assert!(target.access_denied);
    assert!(!target.is_active);
    assert_eq!(f.settings.connection().await.unwrap(), connection_before);
    assert_eq!(f.registry.active_kind(), Some(ProviderKind::LocalFolder));
    assert_eq!(f.drive.folder().as_deref(), Some("previous-drive-folder"));
    assert_eq!(f.folder.folder().as_deref(), Some("/srv/kitchen"));
}

#[tokio::test]
async fn network_failure_rolls_back_without_marking_denied() {
    let f = fixture();
    let kitchen = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();
    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();
    f.drive.fail_verify(Some(Failure::Network));

    let err = f.switcher.set_active_repository(shared.id).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));

    let repositories = f.switcher.repositories().await.unwrap();
    let target = repositories.iter().find(|r| r.id == shared.id).unwrap();
    assert!(!target.access_denied);
    assert!(target.is_pending_verification);
    assert_eq!(
        f.switcher.active_repository().await.unwrap().map(|r| r.id),
        Some(kitchen.id)
    );

    // The flag was released, so a retry can go through.
    f.drive.fail_verify(None);
    f.switcher.set_active_repository(shared.id).await.unwrap();
    assert_eq!(
        f.switcher.active_repository().await.unwrap().map(|r| r.id),
        Some(shared.id)
    );
}

#[tokio::test]
async fn failed_switch_clears_folder_the_provider_did_not_have() {
    let f = fixture();
    f.switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", true)
        .await
        .unwrap();
    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();
    assert_eq!(f.drive.folder(), None);
    f.drive.fail_verify(Some(Failure::AccessDenied));

    let err = f.switcher.set_active_repository(shared.id).await.unwrap_err();

    assert!(matches!(err, SyncError::AccessDenied(_)));
    assert_eq!(f.drive.folder(), None);
    assert!(!f.drive.is_connected());
    assert_eq!(f.registry.active_kind(), Some(ProviderKind::LocalFolder));
    assert_eq!(f.folder.folder().as_deref(), Some("/srv/kitchen"));
}

#[tokio::test]
async fn switch_to_unknown_repository_is_not_found() {
    let f = fixture();
    let err = f
        .switcher
        .set_active_repository(RepositoryId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RepositoryNotFound(_)));
    assert!(!f.switcher.is_switching());
}

#[tokio::test(start_paused = true)]
async fn concurrent_switch_is_rejected() {
    let f = fixture_with(
        MockProvider::new(ProviderKind::LocalFolder),
        MockProvider::new(ProviderKind::GoogleDrive).with_verify_delay(Duration::from_secs(2)),
    );
    let kitchen = f
        .switcher
        .add_repository("Kitchen", ProviderKind::LocalFolder, "/srv/kitchen", false)
        .await
        .unwrap();
    let shared = f
        .switcher
        .add_repository("Shared", ProviderKind::GoogleDrive, "drive-folder", false)
        .await
        .unwrap();

    let switcher = f.switcher.clone();
    let first = tokio::spawn(async move { switcher.set_active_repository(shared.id).await });
    while !f.switcher.is_switching() {
        tokio::task::yield_now().await;
    }

    let err = f
        .switcher
        .set_active_repository(kitchen.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SwitchInProgress));

    let switched = first.await.unwrap().unwrap();
    assert_eq!(switched.id, shared.id);
    assert!(!f.switcher.is_switching());
}

// ── Invariants ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Add { drive: bool, make_active: bool },
    Switch(usize),
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<bool>(), any::<bool>())
            .prop_map(|(drive, make_active)| Op::Add { drive, make_active }),
        (0usize..8).prop_map(Op::Switch),
        (0usize..8).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn at_most_one_repository_is_active(ops in prop::collection::vec(op_strategy(), 1..16)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let counts = runtime.block_on(async {
            let f = fixture();
            let mut counts = Vec::new();
            for op in ops {
                let repositories = f.switcher.repositories().await.unwrap();
                match op {
                    Op::Add { drive, make_active } => {
                        let kind = if drive {
                            ProviderKind::GoogleDrive
                        } else {
                            ProviderKind::LocalFolder
                        };
                        f.switcher
                            .add_repository("Repo", kind, "folder", make_active)
                            .await
                            .unwrap();
                    }
                    Op::Switch(index) => {
                        if let Some(repo) = repositories.get(index) {
                            f.switcher.set_active_repository(repo.id).await.unwrap();
                        }
                    }
                    Op::Remove(index) => {
                        if let Some(repo) = repositories.get(index) {
                            f.switcher.remove_repository(repo.id).await.unwrap();
                        }
                    }
                }
                counts.push(active_count(&f.switcher.repositories().await.unwrap()));
            }
            counts
        });
        for count in counts {
            prop_assert!(count <= 1);
        }
    }
}
