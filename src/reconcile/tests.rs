// Reconciler tests

use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::constants::UNORDERED;
use crate::db::schema::ProfileKind;
use crate::ordering::{plan, Axis, OrderingEngine};
use crate::projection::Query;

struct FailingEnumerator;

impl Enumerator for FailingEnumerator {
    fn list_installed_apps(&self, _filter: ProfileFilter) -> std::result::Result<Vec<InstalledApp>, EnumeratorError> {
        Err(EnumeratorError::PermissionDenied("package list".to_string()))
    }
}

/// Flips the cancel flag while the host is being queried
struct CancellingEnumerator {
    inner: StaticEnumerator,
    cancel: Arc<AtomicBool>,
}

impl Enumerator for CancellingEnumerator {
    fn list_installed_apps(&self, filter: ProfileFilter) -> std::result::Result<Vec<InstalledApp>, EnumeratorError> {
        self.cancel.store(true, Ordering::SeqCst);
        self.inner.list_installed_apps(filter)
    }
}

fn setup(apps: Vec<InstalledApp>) -> (Arc<AppStore>, Arc<StaticEnumerator>, Reconciler) {
    let store = Arc::new(AppStore::open_in_memory().unwrap());
    let enumerator = Arc::new(StaticEnumerator::new(apps));
    let reconciler = Reconciler::new(Arc::clone(&store), enumerator.clone());
    (store, enumerator, reconciler)
}

fn packages(store: &AppStore) -> Vec<String> {
    let mut names: Vec<String> = store.snapshot(Query::All).iter().map(|a| a.package_name.clone()).collect();
    names.sort();
    names
}

#[test]
fn test_install_and_uninstall() {
    let (store, enumerator, reconciler) = setup(vec![
        InstalledApp::new("com.a", 0, "A"),
        InstalledApp::new("com.b", 0, "B"),
    ]);
    let report = reconciler.reconcile().unwrap();
    assert_eq!((report.inserted, report.deleted), (2, 0));

    enumerator.replace(vec![
        InstalledApp::new("com.a", 0, "A"),
        InstalledApp::new("com.c", 0, "C"),
    ]);
    let report = reconciler.reconcile().unwrap();
    assert_eq!((report.inserted, report.deleted, report.unchanged), (1, 1, 1));
    assert_eq!(packages(&store), vec!["com.a", "com.c"]);

    let c = store.get_by_package("com.c", ProfileKind::Primary).unwrap().unwrap();
    assert_eq!(c.app_name, "C");
    assert!(!c.favorite && !c.hidden && !c.lock);
    assert_eq!((c.app_order, c.global_app_order, c.lock_order), (UNORDERED, UNORDERED, UNORDERED));
}

#[test]
fn test_second_pass_is_idempotent_and_silent() {
    let (store, _enumerator, reconciler) = setup(vec![
        InstalledApp::new("com.a", 0, "A"),
        InstalledApp::new("com.b", 0, "B"),
    ]);
    reconciler.reconcile().unwrap();
    let stamp = store.get_setting(SETTING_LAST_RECONCILED_AT).unwrap();
    assert!(stamp.is_some());

    let mut all = store.subscribe(Query::All);
    let report = reconciler.reconcile().unwrap();
    assert_eq!((report.inserted, report.deleted, report.unchanged), (0, 0, 2));
    assert!(!report.changed());
    assert!(!all.refresh());
    assert_eq!(store.get_setting(SETTING_LAST_RECONCILED_AT).unwrap(), stamp);
}

#[test]
fn test_customizations_survive_reconciliation() {
    let (store, enumerator, reconciler) = setup(vec![
        InstalledApp::new("com.a", 0, "A"),
        InstalledApp::new("com.b", 0, "B"),
        InstalledApp::new("com.c", 0, "C"),
    ]);
    reconciler.reconcile().unwrap();

    let engine = OrderingEngine::new(Arc::clone(&store));
    let b = store.get_by_package("com.b", ProfileKind::Primary).unwrap().unwrap();
    let c = store.get_by_package("com.c", ProfileKind::Primary).unwrap().unwrap();
    engine.set_display_name(b.id, "Bee").unwrap();
    engine.set_favorite(b.id, true).unwrap();
    engine.set_locked(c.id, true).unwrap();
    engine.promote(Axis::Drawer, c.id).unwrap();
    engine.promote(Axis::Drawer, b.id).unwrap();

    // Relabelled upstream and one app gone: neither touches the survivors
    enumerator.replace(vec![
        InstalledApp::new("com.b", 0, "B v2"),
        InstalledApp::new("com.c", 0, "C"),
    ]);
    let report = reconciler.reconcile().unwrap();
    assert_eq!(report.deleted, 1);

    let b_after = store.get(b.id).unwrap().unwrap();
    assert_eq!(b_after.app_name, "Bee");
    assert!(b_after.favorite);
    assert_eq!(b_after.app_order, 0);
    assert_eq!(b_after.global_app_order, 1);
    let c_after = store.get(c.id).unwrap().unwrap();
    assert!(c_after.lock);
    assert_eq!(c_after.global_app_order, 0);
}

#[test]
fn test_deleting_ranked_app_closes_gap() {
    let (store, enumerator, reconciler) = setup(vec![
        InstalledApp::new("com.a", 0, "A"),
        InstalledApp::new("com.b", 0, "B"),
    ]);
    reconciler.reconcile().unwrap();
    let engine = OrderingEngine::new(Arc::clone(&store));
    engine.promote(Axis::Drawer, 1).unwrap();
    engine.promote(Axis::Drawer, 2).unwrap();

    enumerator.replace(vec![InstalledApp::new("com.b", 0, "B")]);
    reconciler.reconcile().unwrap();
    assert_eq!(store.get(2).unwrap().unwrap().global_app_order, 0);
}

#[test]
fn test_enumerator_failure_skips_cycle() {
    let store = Arc::new(AppStore::open_in_memory().unwrap());
    let seed = Reconciler::new(
        Arc::clone(&store),
        Arc::new(StaticEnumerator::new(vec![InstalledApp::new("com.a", 0, "A")])),
    );
    seed.reconcile().unwrap();

    let reconciler = Reconciler::new(Arc::clone(&store), Arc::new(FailingEnumerator));
    let report = reconciler.reconcile().unwrap();
    assert!(report.skipped.is_some());
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_cancelled_pass_commits_nothing() {
    let store = Arc::new(AppStore::open_in_memory().unwrap());
    let cancel = Arc::new(AtomicBool::new(false));
    let enumerator = CancellingEnumerator {
        inner: StaticEnumerator::new(vec![InstalledApp::new("com.a", 0, "A")]),
        cancel: Arc::clone(&cancel),
    };
    let reconciler = Reconciler::new(Arc::clone(&store), Arc::new(enumerator));

    let result = reconciler.reconcile_cancellable(&cancel);
    assert!(matches!(result, Err(LauncherError::Cancelled)));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_profile_filter_leaves_other_profiles_alone() {
    let (store, enumerator, reconciler) = setup(vec![
        InstalledApp::new("com.mail", 0, "Mail"),
        InstalledApp::new("com.mail", 10, "Mail"),
    ]);
    reconciler.reconcile().unwrap();
    assert_eq!(store.count().unwrap(), 2);

    // Work profile only lists a new app; the primary copy must survive
    enumerator.replace(vec![
        InstalledApp::new("com.mail", 10, "Mail"),
        InstalledApp::new("com.docs", 10, "Docs"),
    ]);
    let work = Reconciler::new(Arc::clone(&store), enumerator.clone()).with_filter(ProfileFilter::Only(10));
    let report = work.reconcile().unwrap();
    assert_eq!((report.inserted, report.deleted), (1, 0));
    assert!(store.get_by_package("com.mail", ProfileKind::Primary).unwrap().is_some());

    // A locked profile reports unavailable: skipped, nothing deleted
    let locked = Reconciler::new(Arc::clone(&store), enumerator.clone()).with_filter(ProfileFilter::Only(11));
    assert!(locked.reconcile().unwrap().skipped.is_some());
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn test_plan_collapses_duplicate_tuples() {
    let installed = vec![
        InstalledApp::new("com.a", 0, "First"),
        InstalledApp::new("com.a", 0, "Second"),
    ];
    let plan = plan_reconcile(&[], &installed, ProfileFilter::All);
    assert_eq!(plan.inserts.len(), 1);
    assert_eq!(plan.inserts[0].app_name, "First");
}

#[test]
fn test_vanished_profile_directory_keeps_its_records() {
    let root = tempfile::tempdir().unwrap();
    let primary = root.path().join("primary");
    let work = root.path().join("work");
    fs::create_dir_all(&primary).unwrap();
    fs::create_dir_all(&work).unwrap();
    let entry = "[Desktop Entry]\nType=Application\nName=Mail\nExec=mail\n";
    fs::write(primary.join("mail.desktop"), entry).unwrap();
    fs::write(work.join("mail.desktop"), entry).unwrap();

    let store = Arc::new(AppStore::open_in_memory().unwrap());
    let enumerator = DesktopEntryEnumerator::new(vec![
        ApplicationDir::primary(primary.clone()),
        ApplicationDir { path: work.clone(), user_handle: 10 },
    ]);
    let reconciler = Reconciler::new(Arc::clone(&store), Arc::new(enumerator));
    assert_eq!(reconciler.reconcile().unwrap().inserted, 2);

    let work_mail = store.get_by_package("mail", ProfileKind::Work).unwrap().unwrap();
    OrderingEngine::new(Arc::clone(&store)).set_favorite(work_mail.id, true).unwrap();

    // Work profile locked or removed: its directory is gone
    fs::remove_dir_all(&work).unwrap();
    let report = reconciler.reconcile().unwrap();
    assert!(report.skipped.is_some());
    assert_eq!(report.deleted, 0);

    let after = store.get(work_mail.id).unwrap().unwrap();
    assert!(after.favorite);
    assert_eq!(after.app_order, 0);
    assert_eq!(store.count().unwrap(), 2);
}

/// Relative order of the given ids on an axis
fn axis_order(store: &AppStore, axis: Axis, ids: &[i64]) -> Vec<i64> {
    let apps = store.read(|conn| schema::list_all_apps(conn)).unwrap();
    let mut ranked: Vec<(i64, i64)> = apps
        .iter()
        .filter(|a| ids.contains(&a.id) && axis.rank(a) != UNORDERED)
        .map(|a| (axis.rank(a), a.id))
        .collect();
    ranked.sort();
    ranked.into_iter().map(|(_, id)| id).collect()
}

fn assert_all_dense(store: &AppStore) {
    let apps = store.read(|conn| schema::list_all_apps(conn)).unwrap();
    for axis in Axis::ALL {
        if let Err(rejection) = plan::verify_dense(axis, &apps) {
            panic!("{} axis broken: {}", axis, rejection);
        }
    }
}

#[test]
fn test_reconcile_concurrent_with_reorders() {
    let stable: Vec<InstalledApp> = (0..6)
        .map(|i| InstalledApp::new(&format!("com.stable{}", i), 0, &format!("Stable {}", i)))
        .collect();
    let with_churn = |tag: &str| -> Vec<InstalledApp> {
        let mut apps = stable.clone();
        for i in 0..4 {
            apps.push(InstalledApp::new(&format!("com.{}{}", tag, i), 0, &format!("{} {}", tag, i)));
        }
        apps
    };
    let (store, enumerator, reconciler) = setup(with_churn("left"));
    reconciler.reconcile().unwrap();

    let engine = OrderingEngine::new(Arc::clone(&store));
    let stable_ids: Vec<i64> = stable
        .iter()
        .map(|app| {
            store
                .get_by_package(&app.package_name, ProfileKind::Primary)
                .unwrap()
                .unwrap()
                .id
        })
        .collect();
    for (i, id) in stable_ids.iter().enumerate() {
        engine.set_display_name(*id, &format!("Custom {}", i)).unwrap();
        engine.set_favorite(*id, true).unwrap();
        engine.promote(Axis::Drawer, *id).unwrap();
    }

    thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..30 {
                let tag = if round % 2 == 0 { "right" } else { "left" };
                enumerator.replace(with_churn(tag));
                let report = reconciler.reconcile().unwrap();
                assert!(report.skipped.is_none());
                assert_all_dense(&store);
            }
        });
        for seed in 0..3u64 {
            let engine = &engine;
            let stable_ids = &stable_ids;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..60 {
                    let axis = if rng.gen_bool(0.5) { Axis::Drawer } else { Axis::Favorites };
                    if rng.gen_bool(0.5) {
                        let id = stable_ids[rng.gen_range(0..stable_ids.len())];
                        engine.promote(axis, id).unwrap();
                    } else {
                        let from = rng.gen_range(0..stable_ids.len());
                        let to = rng.gen_range(0..stable_ids.len());
                        engine.move_item(axis, from, to).unwrap();
                    }
                }
            });
        }
    });

    assert_all_dense(&store);
    for (i, id) in stable_ids.iter().enumerate() {
        let app = store.get(*id).unwrap().unwrap();
        assert_eq!(app.app_name, format!("Custom {}", i));
        assert!(app.favorite);
        assert_ne!(app.app_order, UNORDERED);
    }

    // Churn alone never reshuffles the survivors
    let drawer = axis_order(&store, Axis::Drawer, &stable_ids);
    let favorites = axis_order(&store, Axis::Favorites, &stable_ids);
    enumerator.replace(with_churn("other"));
    let report = reconciler.reconcile().unwrap();
    assert_eq!(report.inserted, 4);
    assert_all_dense(&store);
    assert_eq!(axis_order(&store, Axis::Drawer, &stable_ids), drawer);
    assert_eq!(axis_order(&store, Axis::Favorites, &stable_ids), favorites);
    assert_eq!(favorites.len(), stable_ids.len());
}
