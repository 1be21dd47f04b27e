// src/update.rs

//! The updater pipeline.
//!
//! For each requested package the repositories are queried individually
//! and the best candidate selected: highest version, with a strictly later
//! update time breaking ties. Up-to-date packages are skipped. Each
//! selected package is downloaded and verified into its own temp
//! directory, extracted into a staging directory, and then renamed into
//! place entry by entry, so a partial archive read can never corrupt the
//! live filesystem beyond individual renames. Afterwards the database
//! version and update-time are rewritten and files dropped by the new
//! version are cleaned up.

use crate::archive;
use crate::catalog::{CatalogFile, PackageMetadata, CATALOG_FILE_NAME};
use crate::config::RepoConfig;
use crate::db::Database;
use crate::download;
use crate::error::{Error, Result};
use crate::hooks::{self, HookPhase, Operation};
use crate::paths;
use crate::verify::Verifier;
use crate::version;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Packages whose update deserves an explicit warning and reboot notice.
const CRITICAL_PACKAGES: &[&str] = &["glibc", "linux", "coreutils", "bash", "systemd"];

/// One selected update.
#[derive(Debug)]
struct UpdateCandidate {
    package: String,
    version: String,
    update_time: Option<String>,
    archive_url: String,
    metadata: PackageMetadata,
}

fn is_critical(name: &str) -> bool {
    CRITICAL_PACKAGES.contains(&name)
}

/// Parse a timestamp in the accepted precedence: ISO-8601, space-separated,
/// RFC 2822, and finally `DD/MM/YYYY`.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| DateTime::parse_from_rfc2822(s).ok().map(|d| d.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%d/%m/%Y")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Compare two update-time strings; unparseable inputs compare equal with
/// a warning so a bad date never flips an update decision on its own.
fn compare_update_times(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(ta), Some(tb)) => ta.cmp(&tb),
        _ => {
            warn!("Could not parse update time '{}' or '{}'", a, b);
            Ordering::Equal
        }
    }
}

/// Query every repository for `package` and keep the best candidate.
fn find_best_candidate(
    package: &str,
    repo_urls: &[String],
    scratch: &Path,
) -> Result<Option<UpdateCandidate>> {
    let mut best: Option<UpdateCandidate> = None;

    for repo in repo_urls {
        let index_url = format!("{}{}", repo, CATALOG_FILE_NAME);
        let local = scratch.join(CATALOG_FILE_NAME);
        let _ = fs::remove_file(&local);

        if let Err(e) = download::fetch_one(&index_url, &local) {
            warn!("Could not download {}: {}", index_url, e);
            continue;
        }
        let parsed = match CatalogFile::load(&local) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse {}: {}", index_url, e);
                let _ = fs::remove_file(&local);
                continue;
            }
        };
        let _ = fs::remove_file(&local);

        for record in parsed.packages {
            if record.name != package || record.file_name.is_empty() {
                continue;
            }

            let better = match &best {
                None => true,
                Some(current) => match version::compare(&record.version, &current.version) {
                    Ordering::Greater => true,
                    Ordering::Equal => match (&record.update_time, &current.update_time) {
                        (Some(new_time), Some(cur_time)) => {
                            compare_update_times(new_time, cur_time) == Ordering::Greater
                        }
                        (Some(_), None) => true,
                        _ => false,
                    },
                    Ordering::Less => false,
                },
            };

            if better {
                best = Some(UpdateCandidate {
                    package: package.to_string(),
                    version: record.version.clone(),
                    update_time: record.update_time.clone(),
                    archive_url: format!("{}{}", repo, record.file_name),
                    metadata: record,
                });
            }
        }
    }
    Ok(best)
}

/// Is the installed package already at least as new as the candidate?
fn is_up_to_date(db: &Database, candidate: &UpdateCandidate) -> Result<bool> {
    let Some(installed_version) = db.version_of(&candidate.package)? else {
        return Ok(false);
    };

    match version::compare(&installed_version, &candidate.version) {
        Ordering::Greater => Ok(true),
        Ordering::Less => Ok(false),
        Ordering::Equal => match &candidate.update_time {
            None => Ok(true),
            Some(candidate_time) => match db.update_time_of(&candidate.package)? {
                Some(installed_time) => {
                    Ok(compare_update_times(&installed_time, candidate_time) != Ordering::Less)
                }
                None => Ok(false),
            },
        },
    }
}

fn confirm_updates(candidates: &[UpdateCandidate]) -> Result<bool> {
    println!("The following packages will be updated:");
    for candidate in candidates {
        println!("  - {} ({})", candidate.package, candidate.version);
    }
    print!("Do you want to continue? [Y/n]: ");
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().lock().read_line(&mut response)?;
    let response = response.trim().to_lowercase();
    Ok(response.is_empty() || response == "y" || response == "yes")
}

/// Move every staged entry to its final location under the root,
/// removing pre-existing conflicting entries first. Renames happen one
/// entry at a time; there is no transaction across entries.
fn apply_staged(staging: &Path, root: &Path) -> Result<()> {
    for entry in WalkDir::new(staging).min_depth(1) {
        let entry = entry.map_err(|e| Error::Filesystem(format!("staging walk failed: {}", e)))?;
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map_err(|e| Error::Filesystem(format!("staging path error: {}", e)))?;
        let dest = root.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .map_err(|e| Error::Filesystem(format!("cannot create {}: {}", dest.display(), e)))?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Filesystem(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        match fs::symlink_metadata(&dest) {
            Ok(existing) => {
                let removed = if existing.file_type().is_dir() {
                    fs::remove_dir_all(&dest)
                } else {
                    fs::remove_file(&dest)
                };
                removed.map_err(|e| {
                    Error::Filesystem(format!("cannot replace {}: {}", dest.display(), e))
                })?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Filesystem(format!("cannot stat {}: {}", dest.display(), e)));
            }
        }
        fs::rename(entry.path(), &dest).map_err(|e| {
            Error::Filesystem(format!(
                "failed to move {} to {}: {}",
                entry.path().display(),
                dest.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Remove files present in the previous record but absent from the new
/// file list. Directories are removed only when empty.
fn remove_obsolete_files(package: &str, root: &Path, db: &Database, new_files: &[String]) {
    let installed = match db.files_of(package) {
        Ok(files) => files,
        Err(e) => {
            warn!("Could not read recorded files for {}: {}", package, e);
            return;
        }
    };

    let normalize = |f: &str| f.trim_start_matches('/').trim_end_matches('/').to_string();
    let new_set: BTreeSet<String> = new_files
        .iter()
        .map(|f| normalize(f))
        .filter(|f| !f.is_empty())
        .collect();

    for file in installed {
        let rel = normalize(&file);
        if rel.is_empty() || new_set.contains(&rel) {
            continue;
        }
        let full = root.join(&rel);
        let Ok(meta) = fs::symlink_metadata(&full) else {
            continue;
        };

        let file_type = meta.file_type();
        if file_type.is_dir() {
            if let Ok(mut entries) = fs::read_dir(&full) {
                if entries.next().is_none() && fs::remove_dir(&full).is_ok() {
                    info!("Removed obsolete empty directory: {}", full.display());
                }
            }
        } else if fs::remove_file(&full).is_ok() {
            info!("Removed obsolete file: {}", full.display());
        }
    }
}

/// Apply one selected update. Runs inside its own temp directory.
fn apply_update(
    candidate: &UpdateCandidate,
    root: &Path,
    db: &Database,
    repo_urls: &[String],
) -> Result<()> {
    let temp = tempfile::Builder::new()
        .prefix(&format!("starpack_update_{}_", candidate.package))
        .tempdir()
        .map_err(|e| Error::Filesystem(format!("cannot create temp directory: {}", e)))?;

    let package_path = temp.path().join(format!("{}.starpack", candidate.package));
    let signature_path = temp.path().join(format!("{}.starpack.sig", candidate.package));

    info!("Downloading package...");
    download::fetch_one(&candidate.archive_url, &package_path)?;
    info!("Downloading signature...");
    download::fetch_one(&format!("{}.sig", candidate.archive_url), &signature_path)?;

    info!("Verifying signature...");
    Verifier::new(root, repo_urls).verify(&package_path, &signature_path)?;

    // Prefer the metadata inside the archive; fall back to the catalog's.
    let meta_dir = temp.path().join("meta_extract");
    let metadata = match archive::extract_file(&package_path, "metadata.yaml", &meta_dir) {
        Ok(true) => {
            match fs::read_to_string(meta_dir.join("metadata.yaml"))
                .map_err(Error::from)
                .and_then(|content| {
                    serde_yaml::from_str::<PackageMetadata>(&content)
                        .map_err(|e| Error::Catalog(format!("malformed metadata.yaml: {}", e)))
                }) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Could not parse metadata.yaml: {} (using repository metadata)", e);
                    candidate.metadata.clone()
                }
            }
        }
        _ => {
            warn!("Could not extract metadata.yaml; using repository metadata");
            candidate.metadata.clone()
        }
    };

    if metadata.files.is_empty() {
        return Err(Error::Catalog(format!(
            "no file list available for {}",
            candidate.package
        )));
    }

    let changed_paths: Vec<String> = metadata
        .files
        .iter()
        .map(|f| f.trim_start_matches('/').to_string())
        .filter(|f| !f.is_empty())
        .collect();

    info!("Running PreUpdate hooks...");
    hooks::run_hooks(
        HookPhase::PreUpdate,
        Operation::Update,
        &changed_paths,
        root,
        Some(candidate.package.as_str()),
    )?;

    info!("Extracting updated files...");
    let staging = temp.path().join("staging");
    archive::extract_section(&package_path, "files/", &staging, metadata.strip_components)?;

    info!("Applying file updates...");
    apply_staged(&staging, root)?;

    info!("Updating installation database...");
    db.update_fields(
        &candidate.package,
        &candidate.version,
        candidate.update_time.as_deref().unwrap_or(""),
    )?;

    // A constrained update (update_dirs present) never deletes outside its
    // declared prefixes, so the obsolete-file sweep is skipped entirely.
    if metadata.update_dirs.is_none() {
        info!("Removing obsolete files...");
        remove_obsolete_files(&candidate.package, root, db, &metadata.files);
    }

    info!("Running PostUpdate hooks...");
    hooks::run_hooks(
        HookPhase::PostUpdate,
        Operation::Update,
        &changed_paths,
        root,
        Some(candidate.package.as_str()),
    )?;

    info!("Package updated successfully: {}", candidate.package);
    if is_critical(&candidate.package) {
        info!(
            "NOTICE: '{}' is critical. A reboot is recommended.",
            candidate.package
        );
    }
    Ok(())
}

/// Update the requested packages under `root`, prompting once unless
/// `confirm` is false.
pub fn update(requested: &[String], root: &Path, confirm: bool) -> Result<()> {
    info!("[1/4] Loading repository configuration...");
    let repo_urls = RepoConfig::load_urls(Path::new(paths::REPOS_CONF))?;
    info!("Found {} repository URL(s)", repo_urls.len());

    let db = Database::open(root);

    info!("[2/4] Checking repositories for updates...");
    let scratch = tempfile::Builder::new()
        .prefix("starpack_repo_cache_")
        .tempdir()
        .map_err(|e| Error::Filesystem(format!("cannot create temp directory: {}", e)))?;

    let mut candidates: Vec<UpdateCandidate> = Vec::new();
    for package in requested {
        info!("Checking updates for: {}", package);
        let Some(candidate) = find_best_candidate(package, &repo_urls, scratch.path())? else {
            info!("'{}' not found in any repository.", package);
            continue;
        };
        if is_up_to_date(&db, &candidate)? {
            info!("'{}' is already up-to-date.", package);
            continue;
        }
        info!(
            "Update found for '{}' (installed: {}, available: {})",
            package,
            db.version_of(package)?.unwrap_or_else(|| "none".to_string()),
            candidate.version
        );
        candidates.push(candidate);
    }

    if candidates.is_empty() {
        info!("All specified packages are up-to-date or not found.");
        return Ok(());
    }

    info!("[3/4] Confirming updates...");
    if candidates.iter().any(|c| is_critical(&c.package)) {
        warn!("At least one critical package is about to be updated!");
    }
    if confirm && !confirm_updates(&candidates)? {
        info!("Update canceled by user.");
        return Ok(());
    }

    info!("[4/4] Applying updates...");
    let mut first_error: Option<Error> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        info!(
            "({}/{}) Updating: {} to {}{}",
            idx + 1,
            candidates.len(),
            candidate.package,
            candidate.version,
            candidate
                .update_time
                .as_deref()
                .map(|t| format!(" (update time: {})", t))
                .unwrap_or_default()
        );
        if let Err(e) = apply_update(candidate, root, &db, &repo_urls) {
            error!("Update failed for {}: {}", candidate.package, e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    info!("--- Update process finished. ---");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_timestamp_precedence() {
        assert!(parse_timestamp("2024-05-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-05-01 10:00:00").is_some());
        assert!(parse_timestamp("Wed, 01 May 2024 10:00:00 +0000").is_some());
        assert!(parse_timestamp("01/05/2024").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_compare_update_times() {
        assert_eq!(
            compare_update_times("01/05/2024", "02/05/2024"),
            Ordering::Less
        );
        assert_eq!(
            compare_update_times("2024-05-02T00:00:00Z", "01/05/2024"),
            Ordering::Greater
        );
        // Unparseable dates compare equal.
        assert_eq!(compare_update_times("bogus", "01/05/2024"), Ordering::Equal);
    }

    fn candidate(version: &str, update_time: Option<&str>) -> UpdateCandidate {
        UpdateCandidate {
            package: "foo".to_string(),
            version: version.to_string(),
            update_time: update_time.map(str::to_string),
            archive_url: "https://repo.example/foo.starpack".to_string(),
            metadata: PackageMetadata {
                name: "foo".to_string(),
                version: version.to_string(),
                description: String::new(),
                file_name: "foo.starpack".to_string(),
                dependencies: Vec::new(),
                files: Vec::new(),
                strip_components: 0,
                update_dirs: None,
                update_time: update_time.map(str::to_string),
                size: None,
                arch: None,
                build_date: None,
            },
        }
    }

    fn db_with_foo(version: &str, update_time: Option<&str>) -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path());
        db.init().unwrap();
        db.append(&crate::db::InstalledRecord {
            name: "foo".to_string(),
            version: version.to_string(),
            update_time: update_time.map(str::to_string),
            files: vec!["/usr/bin/foo".to_string()],
            ..Default::default()
        })
        .unwrap();
        (dir, db)
    }

    #[test]
    fn test_up_to_date_when_installed_newer() {
        let (_dir, db) = db_with_foo("2.0", None);
        assert!(is_up_to_date(&db, &candidate("1.9", None)).unwrap());
    }

    #[test]
    fn test_not_up_to_date_when_candidate_newer() {
        let (_dir, db) = db_with_foo("1.0", None);
        assert!(!is_up_to_date(&db, &candidate("1.1", None)).unwrap());
    }

    #[test]
    fn test_equal_version_uses_update_time() {
        let (_dir, db) = db_with_foo("1.0", Some("01/05/2024"));
        // Candidate with a later time wins.
        assert!(!is_up_to_date(&db, &candidate("1.0", Some("02/05/2024"))).unwrap());
        // Candidate with an earlier or equal time does not.
        assert!(is_up_to_date(&db, &candidate("1.0", Some("01/05/2024"))).unwrap());
        // Candidate without a time is treated as up-to-date.
        assert!(is_up_to_date(&db, &candidate("1.0", None)).unwrap());
    }

    #[test]
    fn test_apply_staged_replaces_and_preserves() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        let root = dir.path().join("root");

        fs::create_dir_all(staging.join("usr/bin")).unwrap();
        fs::write(staging.join("usr/bin/foo"), "new").unwrap();
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::write(root.join("usr/bin/foo"), "old").unwrap();
        fs::write(root.join("usr/bin/other"), "keep").unwrap();

        apply_staged(&staging, &root).unwrap();

        assert_eq!(fs::read(root.join("usr/bin/foo")).unwrap(), b"new");
        assert_eq!(fs::read(root.join("usr/bin/other")).unwrap(), b"keep");
    }

    #[test]
    fn test_remove_obsolete_files_keeps_new_and_nonempty_dirs() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path());
        db.init().unwrap();
        db.append(&crate::db::InstalledRecord {
            name: "foo".to_string(),
            version: "1.0".to_string(),
            files: vec![
                "/share/foo/old.txt".to_string(),
                "/share/foo/keep.txt".to_string(),
                "/share/foo".to_string(),
            ],
            ..Default::default()
        })
        .unwrap();

        fs::create_dir_all(dir.path().join("share/foo")).unwrap();
        fs::write(dir.path().join("share/foo/old.txt"), "x").unwrap();
        fs::write(dir.path().join("share/foo/keep.txt"), "x").unwrap();

        let new_files = vec!["share/foo/keep.txt".to_string(), "share/foo".to_string()];
        remove_obsolete_files("foo", dir.path(), &db, &new_files);

        assert!(!dir.path().join("share/foo/old.txt").exists());
        assert!(dir.path().join("share/foo/keep.txt").exists());
        // Directory survives: it is both in the new set and non-empty.
        assert!(dir.path().join("share/foo").is_dir());
    }
}
