// tests/resolution.rs

//! Resolution scenarios: closure completeness, topological ordering,
//! installed-package filtering, and first-seen-wins catalog merging.

mod common;

use common::{record, setup_root};
use starpack::catalog::{Catalog, CatalogFile, PackageMetadata};
use starpack::resolver;
use starpack::Error;

fn repo_record(name: &str, version: &str, deps: &[&str]) -> PackageMetadata {
    PackageMetadata {
        name: name.to_string(),
        version: version.to_string(),
        description: String::new(),
        file_name: format!("{}-{}.starpack", name, version),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        files: vec![format!("usr/bin/{}", name)],
        strip_components: 0,
        update_dirs: None,
        update_time: None,
        size: None,
        arch: None,
        build_date: None,
    }
}

fn single_repo(records: Vec<PackageMetadata>) -> Catalog {
    let mut catalog = Catalog::default();
    catalog.merge("https://core.example/", CatalogFile { packages: records });
    catalog
}

#[test]
fn closure_contains_all_transitive_dependencies() {
    let catalog = single_repo(vec![
        repo_record("app", "1.0", &["web", "db"]),
        repo_record("web", "1.0", &["ssl"]),
        repo_record("db", "1.0", &["ssl"]),
        repo_record("ssl", "1.0", &[]),
    ]);
    let (_root, db) = setup_root();

    let plan = resolver::resolve(&["app".to_string()], &catalog, &db).unwrap();
    for name in ["app", "web", "db", "ssl"] {
        assert!(plan.to_install.contains(&name.to_string()), "missing {}", name);
    }
}

#[test]
fn every_edge_is_ordered_dependency_first() {
    let catalog = single_repo(vec![
        repo_record("app", "1.0", &["web", "db"]),
        repo_record("web", "1.0", &["ssl"]),
        repo_record("db", "1.0", &["ssl"]),
        repo_record("ssl", "1.0", &[]),
    ]);
    let (_root, db) = setup_root();

    let plan = resolver::resolve(&["app".to_string()], &catalog, &db).unwrap();
    let pos = |n: &str| plan.to_install.iter().position(|p| p == n).unwrap();

    // For every dependency edge D -> P, D is applied before P.
    assert!(pos("ssl") < pos("web"));
    assert!(pos("ssl") < pos("db"));
    assert!(pos("web") < pos("app"));
    assert!(pos("db") < pos("app"));
}

#[test]
fn installed_packages_are_filtered_but_satisfy_deps() {
    let catalog = single_repo(vec![
        repo_record("foo", "1.0", &["bar"]),
        repo_record("bar", "1.0", &[]),
    ]);
    let (root, db) = setup_root();
    db.append(&record("bar", "1.0", &["/usr/bin/bar"], &[])).unwrap();
    common::materialize(root.path(), &["/usr/bin/bar"]);

    let plan = resolver::resolve(&["foo".to_string()], &catalog, &db).unwrap();
    // bar satisfies the dependency but is not re-installed.
    assert_eq!(plan.to_install, vec!["foo"]);
    assert!(plan.ordered_closure.contains(&"bar".to_string()));
}

#[test]
fn dependency_missing_everywhere_fails_resolution() {
    let catalog = single_repo(vec![repo_record("app", "1.0", &["phantom"])]);
    let (_root, db) = setup_root();

    match resolver::resolve(&["app".to_string()], &catalog, &db) {
        Err(Error::Resolution(name)) => assert_eq!(name, "phantom"),
        other => panic!("expected resolution failure, got {:?}", other),
    }
}

#[test]
fn first_repository_wins_on_name_conflict() {
    let mut catalog = Catalog::default();
    catalog.merge(
        "https://primary.example/",
        CatalogFile {
            packages: vec![repo_record("tool", "2.0", &[])],
        },
    );
    catalog.merge(
        "https://mirror.example/",
        CatalogFile {
            packages: vec![repo_record("tool", "9.9", &[])],
        },
    );

    assert_eq!(catalog.get("tool").unwrap().version, "2.0");
    assert_eq!(
        catalog.archive_url("tool").unwrap(),
        "https://primary.example/tool-2.0.starpack"
    );
}

#[test]
fn cycles_are_appended_alphabetically_after_a_warning() {
    let catalog = single_repo(vec![
        repo_record("zeta", "1.0", &["alpha"]),
        repo_record("alpha", "1.0", &["zeta"]),
        repo_record("solo", "1.0", &[]),
    ]);
    let (_root, db) = setup_root();

    let plan = resolver::resolve(
        &["zeta".to_string(), "solo".to_string()],
        &catalog,
        &db,
    )
    .unwrap();
    assert_eq!(plan.to_install, vec!["solo", "alpha", "zeta"]);
}
