// tests/db_store.rs

//! Database store properties: append/remove round-trips, atomic rewrite,
//! and the dependency queries the remover relies on.

mod common;

use common::{record, setup_root};
use std::fs;

#[test]
fn append_then_remove_restores_file_byte_for_byte() {
    let (_root, db) = setup_root();
    db.append(&record("base", "1.0", &["/usr/lib/libbase.so"], &[]))
        .unwrap();
    let before = fs::read(db.path()).unwrap();

    db.append(&record("extra", "2.1", &["/usr/bin/extra"], &["base"]))
        .unwrap();
    db.remove("extra").unwrap();

    let after = fs::read(db.path()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn every_name_appears_at_most_once_after_remove() {
    let (_root, db) = setup_root();
    db.append(&record("a", "1.0", &["/usr/bin/a"], &[])).unwrap();
    db.append(&record("b", "1.0", &["/usr/bin/b"], &["a"])).unwrap();
    db.append(&record("c", "1.0", &["/usr/bin/c"], &["a", "b"]))
        .unwrap();

    db.remove("b").unwrap();

    let names = db.installed_names().unwrap();
    assert_eq!(names, vec!["a", "c"]);
    let mut sorted = names.clone();
    sorted.dedup();
    assert_eq!(names.len(), sorted.len());
}

#[test]
fn remove_leaves_no_temp_sibling() {
    let (_root, db) = setup_root();
    db.append(&record("pkg", "1.0", &["/usr/bin/pkg"], &[])).unwrap();
    db.remove("pkg").unwrap();

    let dir = db.path().parent().unwrap();
    let leftovers: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn update_fields_rewrites_only_the_target_record() {
    let (_root, db) = setup_root();
    db.append(&record("stays", "1.0", &["/usr/bin/stays"], &[]))
        .unwrap();
    db.append(&record("moves", "1.0", &["/usr/bin/moves"], &[]))
        .unwrap();

    db.update_fields("moves", "1.1", "2024-06-15T08:30:00Z").unwrap();

    let moves = db.record("moves").unwrap().unwrap();
    assert_eq!(moves.version, "1.1");
    assert_eq!(moves.update_time.as_deref(), Some("2024-06-15T08:30:00Z"));
    // Files and dependencies are untouched by a field update.
    assert_eq!(moves.files, vec!["/usr/bin/moves"]);

    let stays = db.record("stays").unwrap().unwrap();
    assert_eq!(stays.version, "1.0");
    assert_eq!(stays.update_time.as_deref(), Some("2024-05-01T10:00:00Z"));
}

#[test]
fn reverse_dependencies_and_orphans() {
    let (_root, db) = setup_root();
    db.append(&record("libssl", "3.0", &["/usr/lib/libssl.so"], &[]))
        .unwrap();
    db.append(&record(
        "nginx",
        "1.24",
        &["/usr/sbin/nginx"],
        &["libssl >= 3.0"],
    ))
    .unwrap();

    // Constraint strings still match by name.
    assert_eq!(db.reverse_dependencies("libssl").unwrap(), vec!["nginx"]);

    // Once nginx is gone, libssl is an orphan.
    let orphans = db.orphans("nginx").unwrap();
    assert!(orphans.contains(&"libssl".to_string()));
    for orphan in &orphans {
        assert_ne!(orphan, "nginx");
        assert!(db.is_installed(orphan).unwrap());
        for other in db.all_records().unwrap() {
            if other.name == "nginx" {
                continue;
            }
            assert!(!other
                .dependencies
                .iter()
                .any(|d| starpack::version::Dependency::parse(d).name == *orphan));
        }
    }
}

#[test]
fn header_lookup_does_not_match_prefixes() {
    let (_root, db) = setup_root();
    db.append(&record("foobar", "1.0", &["/usr/bin/foobar"], &[]))
        .unwrap();
    assert!(db.is_installed("foobar").unwrap());
    assert!(!db.is_installed("foo").unwrap());
}
