// src/remove.rs

//! The remover pipeline.
//!
//! Removal processes a FIFO queue seeded with the requested packages.
//! Critical packages and starpack itself are refused with a message chosen
//! without recent repetition. Unless forced, reverse dependencies that are
//! not also being removed in the batch block the removal. Files are
//! deleted deepest-first with a second pass for directories that became
//! empty, the database record is dropped atomically, and packages orphaned
//! by the removal are enqueued.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::hooks::{self, HookPhase, Operation};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Packages critical to system stability; removal is refused.
const CRITICAL_PACKAGES: &[&str] = &[
    "glibc",
    "linux",
    "coreutils",
    "bash",
    "systemd",
    "util-linux",
    "linux-zen",
    "linux-api-headers",
    "dracut",
    "linux-zen-headers",
    "sh",
];

/// Cautionary messages for critical-package removal attempts. `{pkg}` is
/// substituted with the package name.
const CRITICAL_MESSAGES: &[&str] = &[
    "Hey! Psst! Look up what removing {pkg} will do to your system.",
    "This is NOT the French language pack. ({pkg})",
    "Are you sure you're not trying to uninstall the operating system? ({pkg})",
    "Removing {pkg} will end your computing career.",
    "{pkg} is holding your system together... barely.",
    "Whoever told you to remove {pkg} hates you with a passion.",
    "Don't do it! Seriously, just don't. ({pkg})",
    "{pkg}? Really?",
    "How about we dont delete {pkg}? Hm?",
];

/// Special message for attempting to remove starpack itself.
const SELF_REMOVAL_MESSAGE: &str = "Removing Me? That's like tearing out the very soul of your \
                                    system. I can't believe you'd do something like this!";

/// How many recently used message indices to remember.
const MESSAGE_HISTORY_LEN: usize = 5;

/// Ring of recently used critical-message indices, shared per process.
static MESSAGE_HISTORY: Mutex<VecDeque<usize>> = Mutex::new(VecDeque::new());

pub fn is_critical_package(name: &str) -> bool {
    CRITICAL_PACKAGES.contains(&name)
}

/// Pick a cautionary message, avoiding the last few used.
pub fn critical_message(package: &str) -> String {
    if package == "starpack" {
        return SELF_REMOVAL_MESSAGE.to_string();
    }

    let mut rng = rand::thread_rng();
    let mut history = MESSAGE_HISTORY.lock().unwrap_or_else(|p| p.into_inner());

    let fresh: Vec<usize> = (0..CRITICAL_MESSAGES.len())
        .filter(|i| !history.contains(i))
        .collect();

    let index = match fresh.choose(&mut rng) {
        Some(&i) => i,
        None => rng.gen_range(0..CRITICAL_MESSAGES.len()),
    };

    history.push_back(index);
    while history.len() > MESSAGE_HISTORY_LEN {
        history.pop_front();
    }

    CRITICAL_MESSAGES[index].replace("{pkg}", package)
}

/// Delete a package's files under the root.
///
/// First pass runs deepest-first (descending path length): files are
/// removed, directories only when empty. The second pass runs ascending
/// and removes directories that became empty. Paths containing `..` are
/// refused.
fn remove_files(files: &[String], root: &Path) {
    let mut sorted: Vec<&String> = files.iter().collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()));

    for file in &sorted {
        if file.contains("..") {
            warn!("Skipping potentially unsafe path: {}", file);
            continue;
        }
        let rel = file.trim_start_matches('/');
        if rel.is_empty() {
            continue;
        }
        let abs = root.join(rel);

        let meta = match fs::symlink_metadata(&abs) {
            Ok(meta) => meta,
            Err(_) => {
                warn!("File listed in DB not found, cannot remove: {}", abs.display());
                continue;
            }
        };

        let result = if meta.file_type().is_dir() {
            match fs::read_dir(&abs).map(|mut d| d.next().is_none()) {
                Ok(true) => fs::remove_dir(&abs).map(|_| {
                    info!("Removed directory: {}", abs.display());
                }),
                Ok(false) => {
                    info!("Skipping non-empty directory: {}", abs.display());
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            fs::remove_file(&abs).map(|_| {
                info!("Removed: {}", abs.display());
            })
        };

        if let Err(e) = result {
            error!("Error removing path {}: {}", abs.display(), e);
        }
    }

    // Second pass, shortest paths first: parents may have emptied out.
    sorted.sort_by(|a, b| a.len().cmp(&b.len()));
    for file in &sorted {
        if file.contains("..") {
            continue;
        }
        let rel = file.trim_start_matches('/');
        if rel.is_empty() {
            continue;
        }
        let abs = root.join(rel);
        if let Ok(meta) = fs::symlink_metadata(&abs) {
            if meta.file_type().is_dir() {
                if let Ok(mut entries) = fs::read_dir(&abs) {
                    if entries.next().is_none() && fs::remove_dir(&abs).is_ok() {
                        info!("Removed now-empty directory: {}", abs.display());
                    }
                }
            }
        }
    }
}

/// Remove the requested packages and any packages they orphan.
///
/// Packages that are not installed are skipped (with an error message when
/// explicitly requested). With `force` the reverse-dependency guard is
/// bypassed.
pub fn remove(requested: &[String], root: &Path, force: bool) -> Result<()> {
    let db = Database::open(root);
    let explicit: HashSet<&str> = requested.iter().map(String::as_str).collect();

    let mut queue: VecDeque<String> = requested.iter().cloned().collect();
    let mut processed: HashSet<String> = HashSet::new();
    let mut removed: Vec<String> = Vec::new();

    while let Some(current) = queue.pop_front() {
        if !processed.insert(current.clone()) {
            continue;
        }
        info!("--- Processing removal for: {} ---", current);

        if current == "starpack" {
            warn!("{}", critical_message(&current));
            warn!("Skipping removal of 'starpack'.");
            continue;
        }
        if is_critical_package(&current) {
            error!("Attempted to remove critical package '{}'", current);
            error!("{}", critical_message(&current));
            continue;
        }

        if !db.is_installed(&current)? {
            if explicit.contains(current.as_str()) {
                error!("Package '{}' is not installed.", current);
            }
            continue;
        }

        if !force {
            let blockers: Vec<String> = db
                .reverse_dependencies(&current)?
                .into_iter()
                .filter(|rd| {
                    !explicit.contains(rd.as_str())
                        && !processed.contains(rd)
                        && !queue.contains(rd)
                })
                .collect();
            if !blockers.is_empty() {
                error!(
                    "Cannot remove '{}' because it is required by these installed packages:",
                    current
                );
                for blocker in &blockers {
                    error!("  - {}", blocker);
                }
                return Err(Error::Policy(format!(
                    "'{}' is required by: {}. Use --force to override.",
                    current,
                    blockers.join(", ")
                )));
            }
        }

        let files = db.files_of(&current)?;
        let relative: Vec<String> = files
            .iter()
            .map(|f| f.trim_start_matches('/').to_string())
            .filter(|f| !f.is_empty())
            .collect();

        info!("Running PreRemove hooks for {}...", current);
        hooks::run_hooks(HookPhase::PreRemove, Operation::Remove, &relative, root, Some(current.as_str()))?;

        info!("Removing files for package: {}...", current);
        remove_files(&files, root);

        db.remove(&current)?;
        removed.push(current.clone());

        info!("Running PostRemove hooks for {}...", current);
        hooks::run_hooks(HookPhase::PostRemove, Operation::Remove, &relative, root, Some(current.as_str()))?;

        // Anything this removal orphaned joins the queue.
        for orphan in db.orphans(&current)? {
            if !processed.contains(&orphan) && !queue.contains(&orphan) {
                info!("Adding orphaned dependency '{}' to removal queue.", orphan);
                queue.push_back(orphan);
            }
        }
    }

    if removed.is_empty() {
        if !requested.is_empty() {
            info!("No packages were removed.");
        }
    } else {
        info!("--- Removal Summary ---");
        for name in &removed {
            info!("Removed: {}", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InstalledRecord;
    use tempfile::TempDir;

    fn record(name: &str, files: &[&str], deps: &[&str]) -> InstalledRecord {
        InstalledRecord {
            name: name.to_string(),
            version: "1.0".to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_critical_detection() {
        assert!(is_critical_package("glibc"));
        assert!(is_critical_package("bash"));
        assert!(!is_critical_package("vim"));
    }

    #[test]
    fn test_critical_message_substitutes_and_varies() {
        let msg = critical_message("glibc");
        assert!(!msg.contains("{pkg}"));

        assert_eq!(critical_message("starpack"), SELF_REMOVAL_MESSAGE);

        // Messages avoid immediate repetition while fresh ones remain.
        let mut last = String::new();
        let mut repeats = 0;
        for _ in 0..4 {
            let m = critical_message("glibc");
            if m == last {
                repeats += 1;
            }
            last = m;
        }
        assert_eq!(repeats, 0);
    }

    #[test]
    fn test_remove_deletes_files_and_record() {
        let root = TempDir::new().unwrap();
        let db = Database::open(root.path());
        db.init().unwrap();
        db.append(&record("app", &["/usr/bin/app", "/usr/share/app/data.txt"], &[]))
            .unwrap();
        touch(root.path(), "usr/bin/app");
        touch(root.path(), "usr/share/app/data.txt");

        remove(&["app".to_string()], root.path(), false).unwrap();

        assert!(!db.is_installed("app").unwrap());
        assert!(!root.path().join("usr/bin/app").exists());
        assert!(!root.path().join("usr/share/app/data.txt").exists());
    }

    #[test]
    fn test_reverse_dependency_blocks_removal() {
        let root = TempDir::new().unwrap();
        let db = Database::open(root.path());
        db.init().unwrap();
        db.append(&record("lib", &["/usr/lib/lib.so"], &[])).unwrap();
        db.append(&record("app", &["/usr/bin/app"], &["lib"])).unwrap();
        touch(root.path(), "usr/lib/lib.so");
        touch(root.path(), "usr/bin/app");

        let err = remove(&["lib".to_string()], root.path(), false).unwrap_err();
        assert!(matches!(err, Error::Policy(_)));
        // Nothing was touched.
        assert!(db.is_installed("lib").unwrap());
        assert!(root.path().join("usr/lib/lib.so").exists());
    }

    #[test]
    fn test_force_overrides_reverse_dependency_guard() {
        let root = TempDir::new().unwrap();
        let db = Database::open(root.path());
        db.init().unwrap();
        db.append(&record("lib", &["/usr/lib/lib.so"], &[])).unwrap();
        db.append(&record("app", &["/usr/bin/app"], &["lib"])).unwrap();
        touch(root.path(), "usr/lib/lib.so");

        remove(&["lib".to_string()], root.path(), true).unwrap();
        assert!(!db.is_installed("lib").unwrap());
    }

    #[test]
    fn test_batch_removal_satisfies_guard() {
        let root = TempDir::new().unwrap();
        let db = Database::open(root.path());
        db.init().unwrap();
        db.append(&record("lib", &["/usr/lib/lib.so"], &[])).unwrap();
        db.append(&record("app", &["/usr/bin/app"], &["lib"])).unwrap();
        touch(root.path(), "usr/lib/lib.so");
        touch(root.path(), "usr/bin/app");

        // Removing both in one batch: app no longer blocks lib.
        remove(&["lib".to_string(), "app".to_string()], root.path(), false).unwrap();
        assert!(!db.is_installed("lib").unwrap());
        assert!(!db.is_installed("app").unwrap());
    }

    #[test]
    fn test_critical_package_is_refused() {
        let root = TempDir::new().unwrap();
        let db = Database::open(root.path());
        db.init().unwrap();
        db.append(&record("glibc", &["/usr/lib/libc.so"], &[])).unwrap();
        touch(root.path(), "usr/lib/libc.so");

        remove(&["glibc".to_string()], root.path(), false).unwrap();
        // Refused, not failed: the package is untouched.
        assert!(db.is_installed("glibc").unwrap());
        assert!(root.path().join("usr/lib/libc.so").exists());
    }

    #[test]
    fn test_non_empty_directory_is_preserved() {
        let root = TempDir::new().unwrap();
        let db = Database::open(root.path());
        db.init().unwrap();
        db.append(&record("app", &["/usr/share/app", "/usr/share/app/mine.txt"], &[]))
            .unwrap();
        touch(root.path(), "usr/share/app/mine.txt");
        // A foreign file keeps the directory alive.
        touch(root.path(), "usr/share/app/other.txt");

        remove(&["app".to_string()], root.path(), false).unwrap();
        assert!(root.path().join("usr/share/app").is_dir());
        assert!(root.path().join("usr/share/app/other.txt").exists());
        assert!(!root.path().join("usr/share/app/mine.txt").exists());
    }

    #[test]
    fn test_orphans_are_swept() {
        let root = TempDir::new().unwrap();
        let db = Database::open(root.path());
        db.init().unwrap();
        db.append(&record("app", &["/usr/bin/app"], &["helper"])).unwrap();
        // helper is depended on only by app.
        db.append(&record("helper", &["/usr/bin/helper"], &[])).unwrap();
        // base is needed by helper's sibling? No: make base required by helper.
        touch(root.path(), "usr/bin/app");
        touch(root.path(), "usr/bin/helper");

        remove(&["app".to_string()], root.path(), false).unwrap();
        assert!(!db.is_installed("app").unwrap());
        assert!(!db.is_installed("helper").unwrap());
    }

    #[test]
    fn test_dotdot_paths_are_refused() {
        let root = TempDir::new().unwrap();
        let outside = root.path().join("outside.txt");
        fs::write(&outside, b"keep me").unwrap();

        let inner = root.path().join("inner");
        fs::create_dir_all(&inner).unwrap();
        let db = Database::open(&inner);
        db.init().unwrap();
        db.append(&record("evil", &["/../outside.txt"], &[])).unwrap();

        remove(&["evil".to_string()], &inner, false).unwrap();
        assert!(outside.exists());
    }
}
