// tests/workflow.rs

//! End-to-end scenarios driving a full state tree the way the backend's
//! operations do: nested delegation, resource locks, activities and
//! cancellation, observed from the root.

use std::cell::RefCell;
use std::rc::Rc;

use tempfile::tempdir;
use zest::{Action, Error, ErrorAction, LockKind, LockManager, LockMode, LogMonitor, State};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zest=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Simulates downloading and decompressing one metadata file through a
/// dedicated sub-node.
fn fetch_metadata(state: &State, name: &str) -> zest::Result<()> {
    state.set_number_of_steps(2)?;

    state.action_start(Action::Downloading, Some(name));
    let download = state.get_child();
    download.set_number_of_steps(4)?;
    for _ in 0..4 {
        download.check()?;
        download.set_speed(256 * 1024);
        download.done()?;
    }
    state.done()?;

    state.action_start(Action::Decompressing, Some(name));
    state.done()?;
    Ok(())
}

/// Refreshes one repository: lock it, fetch two metadata files.
fn refresh_repo(state: &State, locks: &Rc<LockManager>) -> zest::Result<()> {
    state.set_weighted_steps(&[60, 40])?;
    state.take_lock(LockKind::Repository, LockMode::Process)?;

    let child = state.get_child();
    fetch_metadata(&child, "primary.xml.gz")?;
    state.done()?;

    assert!(locks.is_locked(LockKind::Repository));

    let child = state.get_child();
    fetch_metadata(&child, "filelists.xml.gz")?;
    state.done()?;
    Ok(())
}

#[test]
fn test_repo_refresh_reports_monotonic_progress_and_releases_locks() {
    init_logging();
    let dir = tempdir().unwrap();
    let locks = LockManager::new(dir.path());

    let root = State::new();
    root.set_lock_handler(locks.clone());
    let _monitor = LogMonitor::attach(&root);

    let percentages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&percentages);
    root.connect_percentage_changed(move |pct| sink.borrow_mut().push(pct));

    refresh_repo(&root, &locks).unwrap();

    assert_eq!(root.percentage(), 100);
    let seen = percentages.borrow();
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(*seen.last().unwrap(), 100);

    // completion released the repository claim and removed its pid file
    assert!(!locks.is_locked(LockKind::Repository));
    assert!(!locks.lock_path(LockKind::Repository).exists());
}

#[test]
fn test_cancellation_unwinds_and_releases_locks() {
    init_logging();
    let dir = tempdir().unwrap();
    let locks = LockManager::new(dir.path());

    let root = State::new();
    root.set_lock_handler(locks.clone());
    root.set_number_of_steps(2).unwrap();

    let token = root.cancellation_token();
    let child = root.get_child();
    child.set_number_of_steps(4).unwrap();
    child.take_lock(LockKind::Download, LockMode::Process).unwrap();
    child.done().unwrap();

    // a UI thread pulls the plug mid-operation
    token.cancel();
    assert!(matches!(child.done(), Err(Error::Cancelled)));
    assert!(matches!(root.done(), Err(Error::Cancelled)));

    // the fatal error unwinds the tree; teardown releases the claim
    drop(child);
    drop(root);
    assert!(!locks.is_locked(LockKind::Download));
    assert!(!locks.lock_path(LockKind::Download).exists());
}

#[test]
fn test_soft_errors_keep_the_operation_going() {
    init_logging();
    let root = State::new();
    root.set_error_handler(|error| match error {
        Error::Cancelled => ErrorAction::Ignore,
        _ => ErrorAction::Fatal,
    });
    root.set_number_of_steps(3).unwrap();

    // children created after the policy inherit it
    let child = root.get_child();
    child.set_number_of_steps(2).unwrap();

    root.cancellation_token().cancel();
    child.done().unwrap();
    child.done().unwrap();
    root.done().unwrap();
    assert_eq!(root.percentage(), 33);
}

#[test]
fn test_activity_and_package_progress_surface_at_the_root() {
    init_logging();
    let root = State::new();
    root.set_number_of_steps(1).unwrap();
    let transaction = root.get_child();
    transaction.set_number_of_steps(2).unwrap();
    let install = transaction.get_child();

    let activity = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&activity);
    root.connect_action_changed(move |change| sink.borrow_mut().push(change.clone()));

    let packages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&packages);
    root.connect_package_progress_changed(move |progress| {
        sink.borrow_mut().push(progress.clone())
    });

    install.action_start(Action::Installing, Some("hal"));
    install.set_package_progress("hal;0.5.8;i386;fedora", Action::Installing, 50);

    assert_eq!(root.action(), Some(Action::Installing));
    assert_eq!(activity.borrow().len(), 1);

    let packages = packages.borrow();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].package_id, "hal;0.5.8;i386;fedora");
    assert_eq!(packages[0].action, Action::Installing);
    assert_eq!(packages[0].percentage, 50);
}
