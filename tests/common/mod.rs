// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use starpack::{Database, InstalledRecord};
use std::path::Path;
use tempfile::TempDir;

/// Create an empty install root with an initialized database.
///
/// Returns (TempDir, Database) - keep the TempDir alive to prevent cleanup.
pub fn setup_root() -> (TempDir, Database) {
    let root = tempfile::tempdir().unwrap();
    let db = Database::open(root.path());
    db.init().unwrap();
    (root, db)
}

/// Build an installed record with the given files and dependency strings.
pub fn record(name: &str, version: &str, files: &[&str], deps: &[&str]) -> InstalledRecord {
    InstalledRecord {
        name: name.to_string(),
        version: version.to_string(),
        description: format!("{} test package", name),
        size: Some("1024".to_string()),
        architecture: Some("x86_64".to_string()),
        update_time: Some("2024-05-01T10:00:00Z".to_string()),
        build_date: None,
        files: files.iter().map(|f| f.to_string()).collect(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
    }
}

/// Create the file tree a record claims to own under the root.
pub fn materialize(root: &Path, files: &[&str]) {
    for file in files {
        let rel = file.trim_start_matches('/');
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, format!("contents of {}", file)).unwrap();
    }
}

/// Build a gzipped `.starpack` archive with a metadata.yaml and a files/
/// section holding the given (relative path, contents) pairs.
pub fn build_starpack(
    dest: &Path,
    name: &str,
    version: &str,
    deps: &[&str],
    files: &[(&str, &str)],
) {
    let file = std::fs::File::create(dest).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut metadata = format!(
        "name: {}\nversion: \"{}\"\ndescription: {} test package\n",
        name, version, name
    );
    if !deps.is_empty() {
        metadata.push_str("dependencies:\n");
        for dep in deps {
            metadata.push_str(&format!("  - {}\n", dep));
        }
    }
    append_file(&mut builder, "metadata.yaml", metadata.as_bytes());

    for (path, contents) in files {
        append_file(
            &mut builder,
            &format!("files/{}", path),
            contents.as_bytes(),
        );
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn append_file<W: std::io::Write>(builder: &mut tar::Builder<W>, path: &str, contents: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder.append_data(&mut header, path, contents).unwrap();
}
