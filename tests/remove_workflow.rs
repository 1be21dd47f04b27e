// tests/remove_workflow.rs

//! End-to-end removal scenarios over a temp root: reverse-dependency
//! blocking, forced removal, batch exemptions, and orphan sweeping.

mod common;

use common::{materialize, record, setup_root};
use starpack::{remove, Error};

#[test]
fn blocked_removal_changes_nothing() {
    let (root, db) = setup_root();
    db.append(&record("bar", "1.0", &["/usr/lib/libbar.so"], &[]))
        .unwrap();
    db.append(&record("foo", "1.0", &["/usr/bin/foo"], &["bar"]))
        .unwrap();
    materialize(root.path(), &["/usr/lib/libbar.so", "/usr/bin/foo"]);
    let db_before = std::fs::read(db.path()).unwrap();

    let err = remove::remove(&["bar".to_string()], root.path(), false).unwrap_err();
    assert!(matches!(err, Error::Policy(_)));

    // Database and filesystem are unchanged.
    assert_eq!(std::fs::read(db.path()).unwrap(), db_before);
    assert!(root.path().join("usr/lib/libbar.so").exists());
    assert!(root.path().join("usr/bin/foo").exists());
}

#[test]
fn forced_removal_succeeds_despite_blockers() {
    let (root, db) = setup_root();
    db.append(&record("bar", "1.0", &["/usr/lib/libbar.so"], &[]))
        .unwrap();
    db.append(&record("foo", "1.0", &["/usr/bin/foo"], &["bar"]))
        .unwrap();
    materialize(root.path(), &["/usr/lib/libbar.so", "/usr/bin/foo"]);

    remove::remove(&["bar".to_string()], root.path(), true).unwrap();
    assert!(!db.is_installed("bar").unwrap());
    assert!(!root.path().join("usr/lib/libbar.so").exists());
    // With its dependency gone, nothing requires foo: the orphan sweep
    // queues and removes it too.
    assert!(!db.is_installed("foo").unwrap());
}

#[test]
fn batch_containing_the_blocker_is_allowed() {
    let (root, db) = setup_root();
    db.append(&record("bar", "1.0", &["/usr/lib/libbar.so"], &[]))
        .unwrap();
    db.append(&record("foo", "1.0", &["/usr/bin/foo"], &["bar"]))
        .unwrap();
    materialize(root.path(), &["/usr/lib/libbar.so", "/usr/bin/foo"]);

    remove::remove(
        &["bar".to_string(), "foo".to_string()],
        root.path(),
        false,
    )
    .unwrap();
    assert!(!db.is_installed("bar").unwrap());
    assert!(!db.is_installed("foo").unwrap());
}

#[test]
fn directories_are_never_deleted_while_non_empty() {
    let (root, db) = setup_root();
    db.append(&record(
        "docs",
        "1.0",
        &["/usr/share/docs", "/usr/share/docs/guide.txt"],
        &[],
    ))
    .unwrap();
    materialize(root.path(), &["/usr/share/docs/guide.txt"]);
    // A file the package does not own.
    materialize(root.path(), &["/usr/share/docs/personal-notes.txt"]);

    remove::remove(&["docs".to_string()], root.path(), false).unwrap();

    assert!(!root.path().join("usr/share/docs/guide.txt").exists());
    assert!(root.path().join("usr/share/docs").is_dir());
    assert!(root.path().join("usr/share/docs/personal-notes.txt").exists());
}

#[test]
fn empty_parent_directories_are_cleaned_in_second_pass() {
    let (root, db) = setup_root();
    db.append(&record(
        "deep",
        "1.0",
        &[
            "/opt/deep",
            "/opt/deep/nested",
            "/opt/deep/nested/file.bin",
        ],
        &[],
    ))
    .unwrap();
    materialize(root.path(), &["/opt/deep/nested/file.bin"]);

    remove::remove(&["deep".to_string()], root.path(), false).unwrap();

    assert!(!root.path().join("opt/deep/nested/file.bin").exists());
    assert!(!root.path().join("opt/deep/nested").exists());
    assert!(!root.path().join("opt/deep").exists());
}

#[test]
fn orphaned_dependency_is_swept_with_its_dependent() {
    let (root, db) = setup_root();
    db.append(&record("leaf", "1.0", &["/usr/bin/leaf"], &["trunk"]))
        .unwrap();
    db.append(&record("trunk", "1.0", &["/usr/lib/libtrunk.so"], &[]))
        .unwrap();
    materialize(root.path(), &["/usr/bin/leaf", "/usr/lib/libtrunk.so"]);

    remove::remove(&["leaf".to_string()], root.path(), false).unwrap();

    assert!(!db.is_installed("leaf").unwrap());
    assert!(!db.is_installed("trunk").unwrap());
    assert!(!root.path().join("usr/lib/libtrunk.so").exists());
}

#[test]
fn missing_explicit_package_reports_but_continues_batch() {
    let (root, db) = setup_root();
    db.append(&record("real", "1.0", &["/usr/bin/real"], &[]))
        .unwrap();
    materialize(root.path(), &["/usr/bin/real"]);

    remove::remove(
        &["ghost".to_string(), "real".to_string()],
        root.path(),
        false,
    )
    .unwrap();
    assert!(!db.is_installed("real").unwrap());
}

#[test]
fn critical_packages_survive_removal_attempts() {
    let (root, db) = setup_root();
    db.append(&record("systemd", "255", &["/usr/bin/systemctl"], &[]))
        .unwrap();
    db.append(&record("starpack", "1.0", &["/usr/bin/starpack"], &[]))
        .unwrap();
    materialize(root.path(), &["/usr/bin/systemctl", "/usr/bin/starpack"]);

    remove::remove(
        &["systemd".to_string(), "starpack".to_string()],
        root.path(),
        false,
    )
    .unwrap();

    assert!(db.is_installed("systemd").unwrap());
    assert!(db.is_installed("starpack").unwrap());
    assert!(root.path().join("usr/bin/systemctl").exists());
}
