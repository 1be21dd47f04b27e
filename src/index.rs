// src/index.rs

//! Repository index building.
//!
//! `repo index` scans a directory of `*.starpack` archives and emits a
//! `repo.db.yaml` catalog for consumers to fetch during resolution.
//! Archives are processed in parallel on a thread pool; results are
//! collected in input order so the emitted catalog is deterministic.
//! `repo add-missing` keeps existing entries (matched by `file_name`) and
//! only processes archives not already listed.

use crate::archive;
use crate::catalog::{CatalogFile, PackageMetadata, CATALOG_FILE_NAME};
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// The subset of `metadata.yaml` the indexer reads.
#[derive(Debug, Deserialize)]
struct ArchiveMetadata {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    update_dirs: Option<Vec<String>>,
}

/// Truncate at the first `/` or `\`; package names and dependency names
/// never carry path components.
fn strip_slash_and_after(input: &str) -> String {
    let end = input
        .find(['/', '\\'])
        .unwrap_or(input.len());
    input[..end].to_string()
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Number of leading path components shared by every path.
fn common_prefix_components(paths: &[String]) -> usize {
    let Some(first) = paths.first() else {
        return 0;
    };
    let mut common: Vec<&str> = split_path(first);

    for path in &paths[1..] {
        let parts = split_path(path);
        let mut matched = 0;
        for (a, b) in common.iter().zip(parts.iter()) {
            if a != b {
                break;
            }
            matched += 1;
        }
        common.truncate(matched);
        if common.is_empty() {
            break;
        }
    }
    common.len()
}

/// Strip-components value for an archive: the shared leading component
/// count, with a special case mapping exactly one shared component to 2.
fn compute_strip_components(archive_path: &Path) -> u32 {
    let paths = match archive::list_entry_paths(archive_path) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Could not list {}: {}", archive_path.display(), e);
            return 0;
        }
    };
    let count = common_prefix_components(&paths);
    if count == 1 {
        2
    } else {
        count as u32
    }
}

/// Archive mtime formatted as `HH:MM:SS`.
fn archive_update_time(archive_path: &Path) -> Option<String> {
    let modified = fs::metadata(archive_path).ok()?.modified().ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.format("%H:%M:%S").to_string())
}

/// Build one catalog record from an archive.
fn index_archive(archive_path: &Path, record_update_time: bool) -> Option<PackageMetadata> {
    info!("Processing package: {}", archive_path.display());

    let scratch = match tempfile::Builder::new()
        .prefix("starpack_repo_idx_")
        .tempdir()
    {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Could not create scratch directory: {}", e);
            return None;
        }
    };

    if !matches!(
        archive::extract_file(archive_path, "metadata.yaml", scratch.path()),
        Ok(true)
    ) {
        warn!(
            "Failed to extract metadata.yaml from {}",
            archive_path.display()
        );
        return None;
    }

    let files_dir = scratch.path().join("files");
    if archive::extract_section(archive_path, "files/", &files_dir, 0).is_err() {
        warn!(
            "Failed to extract files directory from {} (file list will be empty)",
            archive_path.display()
        );
    }

    let metadata: ArchiveMetadata = match fs::read_to_string(scratch.path().join("metadata.yaml"))
        .map_err(|e| e.to_string())
        .and_then(|content| serde_yaml::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(
                "Failed to parse metadata.yaml for {}: {}",
                archive_path.display(),
                e
            );
            return None;
        }
    };

    // Enumerate extracted files (and symlinks) relative to files/.
    let mut files: Vec<String> = Vec::new();
    if files_dir.is_dir() {
        for entry in WalkDir::new(&files_dir).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            let file_type = entry.file_type();
            if file_type.is_file() || file_type.is_symlink() {
                if let Ok(rel) = entry.path().strip_prefix(&files_dir) {
                    files.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        files.sort();
    } else {
        info!("No 'files' directory found in {}", archive_path.display());
    }

    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Some(PackageMetadata {
        name: strip_slash_and_after(&metadata.name),
        version: metadata.version,
        description: metadata.description,
        file_name,
        dependencies: metadata
            .dependencies
            .iter()
            .map(|d| strip_slash_and_after(d))
            .collect(),
        files,
        strip_components: compute_strip_components(archive_path),
        update_dirs: metadata.update_dirs,
        update_time: if record_update_time {
            archive_update_time(archive_path)
        } else {
            None
        },
        size: None,
        arch: None,
        build_date: None,
    })
}

fn starpack_archives(location: &Path) -> Result<Vec<PathBuf>> {
    if !location.is_dir() {
        return Err(Error::Filesystem(format!(
            "directory does not exist or is invalid: {}",
            location.display()
        )));
    }
    let mut archives: Vec<PathBuf> = fs::read_dir(location)
        .map_err(|e| Error::Filesystem(format!("cannot read {}: {}", location.display(), e)))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("starpack"))
        .collect();
    archives.sort();
    Ok(archives)
}

/// Build `repo.db.yaml` from every archive in `location`, replacing any
/// existing catalog.
pub fn create_index(location: &Path) -> Result<()> {
    let archives = starpack_archives(location)?;

    let records: Vec<PackageMetadata> = archives
        .par_iter()
        .map(|path| index_archive(path, false))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    let db_path = location.join(CATALOG_FILE_NAME);
    CatalogFile { packages: records }.save(&db_path)?;
    info!("Repository database created at: {}", db_path.display());
    Ok(())
}

/// Add archives missing from the existing catalog, keeping current
/// entries untouched.
pub fn add_missing(location: &Path) -> Result<()> {
    let archives = starpack_archives(location)?;
    let db_path = location.join(CATALOG_FILE_NAME);

    let mut index = if db_path.exists() {
        match CatalogFile::load(&db_path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Error loading existing index: {}", e);
                CatalogFile::default()
            }
        }
    } else {
        CatalogFile::default()
    };

    let known: HashSet<String> = index
        .packages
        .iter()
        .map(|p| p.file_name.clone())
        .collect();

    let missing: Vec<&PathBuf> = archives
        .iter()
        .filter(|path| {
            path.file_name()
                .map(|n| !known.contains(&n.to_string_lossy().into_owned()))
                .unwrap_or(false)
        })
        .collect();

    for path in &missing {
        info!("Adding missing package: {}", path.display());
    }

    let new_records: Vec<PackageMetadata> = missing
        .par_iter()
        .map(|path| index_archive(path, true))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    index.packages.extend(new_records);
    index.save(&db_path)?;
    info!("Repository database updated at: {}", db_path.display());
    Ok(())
}
