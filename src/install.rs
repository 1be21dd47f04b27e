// src/install.rs

//! The installer pipeline.
//!
//! Installation runs in strict stages; a later stage never starts until
//! the earlier one completed for the whole package set:
//!
//! 1. database init, 2. repository configuration, 3. concurrent catalog
//! fetch, 4. resolution and ordering, 5. confirmation, 6. batch archive +
//! signature fetch, 7. verification barrier, 8. per-package apply
//! (PreInstall hooks, `files/` extraction, skel propagation, hook
//! installation, database append) followed by a deferred PostInstall pass
//! once every package is on disk, so hooks can rely on the complete set.

use crate::archive;
use crate::catalog::{Catalog, PackageMetadata};
use crate::config::RepoConfig;
use crate::db::{Database, InstalledRecord};
use crate::download::{self, DownloadTask};
use crate::error::{Error, Result};
use crate::hooks::{self, HookPhase, Operation};
use crate::paths;
use crate::resolver;
use crate::verify::Verifier;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Ask the user to confirm the pending package list on stdin.
fn confirm_packages(packages: &[String]) -> Result<bool> {
    if packages.is_empty() {
        return Ok(true);
    }

    println!("\nThe following packages will be installed:\n  {}", packages.join(" "));
    print!("Proceed? [Y/n]: ");
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().lock().read_line(&mut response)?;
    let response = response.trim().to_lowercase();

    if response.is_empty() || response == "y" || response == "yes" {
        Ok(true)
    } else {
        println!("Aborting installation.");
        Ok(false)
    }
}

/// Copy `<root>/etc/skel` into `<root>/root` and every `<root>/home/*`.
///
/// Existing files are overwritten; per-file errors are warned and skipped.
fn propagate_skel(root: &Path) {
    let skel = root.join("etc/skel");
    if !skel.is_dir() {
        return;
    }

    let mut targets = vec![root.join("root")];
    let home = root.join("home");
    if home.is_dir() {
        if let Ok(entries) = fs::read_dir(&home) {
            for entry in entries.filter_map(|e| e.ok()) {
                if entry.path().is_dir() {
                    targets.push(entry.path());
                }
            }
        }
    }

    for target in targets {
        if let Err(e) = fs::create_dir_all(&target) {
            warn!("Could not create {}: {}", target.display(), e);
            continue;
        }
        for entry in WalkDir::new(&skel).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            let rel = match entry.path().strip_prefix(&skel) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let dest = target.join(rel);
            let result = if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)
            } else {
                if let Some(parent) = dest.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                fs::copy(entry.path(), &dest).map(|_| ())
            };
            if let Err(e) = result {
                warn!(
                    "Could not copy {} to {}: {}",
                    entry.path().display(),
                    dest.display(),
                    e
                );
            }
        }
    }
}

/// Extract the archive's `hooks/` section and install `*.hook` files into
/// the package's hook directory under the root.
fn install_package_hooks(
    archive_path: &Path,
    package: &str,
    strip_components: u32,
    root: &Path,
) -> Result<()> {
    let scratch = tempfile::Builder::new()
        .prefix(&format!("{}_hooks_", package))
        .tempdir_in(paths::cache_dir(root))
        .map_err(|e| Error::Filesystem(format!("cannot create hook scratch dir: {}", e)))?;

    if archive::extract_section(archive_path, "hooks/", scratch.path(), strip_components).is_err() {
        // The archive simply may not carry hooks.
        warn!("Failed to extract hooks section for {} (archive may not contain hooks)", package);
        return Ok(());
    }

    let dest_dir = paths::package_hooks_dir(root, package);
    let entries = match fs::read_dir(scratch.path()) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    let mut installed_any = false;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|x| x.to_str()) != Some("hook") {
            continue;
        }
        if !installed_any {
            fs::create_dir_all(&dest_dir)
                .map_err(|e| Error::Filesystem(format!("cannot create {}: {}", dest_dir.display(), e)))?;
        }
        let Some(file_name) = path.file_name() else { continue };
        let dest = dest_dir.join(file_name);
        match fs::copy(&path, &dest) {
            Ok(_) => {
                info!("Installed hook: {}", file_name.to_string_lossy());
                installed_any = true;
            }
            Err(e) => warn!("Error installing hook {}: {}", path.display(), e),
        }
    }
    Ok(())
}

/// Package-relative paths handed to hook matching.
fn affected_paths(meta: &PackageMetadata) -> Vec<String> {
    meta.files
        .iter()
        .map(|f| f.trim_start_matches('/').to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

fn package_progress_style() -> ProgressStyle {
    ProgressStyle::with_template("Progress: [{bar:50}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Install the requested packages (and their dependency closure) into
/// `root`, prompting for confirmation unless `confirm` is false.
pub fn install(requested: &[String], root: &Path, confirm: bool) -> Result<()> {
    info!("--- Starpack Installation ---");
    info!("Target directory: {}", root.display());

    // Stage 1: database
    let db = Database::open(root);
    db.init()?;

    // Stage 2: repository configuration
    info!("[1/8] Loading repository configuration...");
    let repo_urls = RepoConfig::load_urls(Path::new(paths::REPOS_CONF))?;
    info!("Found {} repository URL(s)", repo_urls.len());

    // Stage 3: catalogs
    info!("[2/8] Fetching repository catalogs...");
    let cache_dir = paths::cache_dir(root);
    fs::create_dir_all(&cache_dir)
        .map_err(|e| Error::Filesystem(format!("cannot create cache directory: {}", e)))?;
    let catalog = Catalog::load(&repo_urls, &cache_dir)?;

    // Stage 4: resolution
    info!("[3/8] Resolving dependencies...");
    let plan = resolver::resolve(requested, &catalog, &db)?;
    if plan.to_install.is_empty() {
        info!("All requested packages and dependencies are already installed.");
        return Ok(());
    }
    info!(
        "Packages requiring installation (in order): {}",
        plan.to_install.join(", ")
    );

    // Stage 5: confirmation
    if confirm {
        if !confirm_packages(&plan.to_install)? {
            return Ok(());
        }
    } else {
        info!("[Confirm] Skipping confirmation prompt (--noconfirm used).");
    }

    // Stage 6: archives and signatures
    info!("[4/8] Downloading package files and signatures...");
    let mut tasks: Vec<DownloadTask> = Vec::new();
    for name in &plan.to_install {
        let meta = catalog
            .get(name)
            .ok_or_else(|| Error::Catalog(format!("no source metadata for '{}'", name)))?;
        if meta.file_name.is_empty() {
            return Err(Error::Catalog(format!("missing 'file_name' for package '{}'", name)));
        }
        let url = catalog
            .archive_url(name)
            .ok_or_else(|| Error::Catalog(format!("no archive URL for '{}'", name)))?;
        let local = cache_dir.join(&meta.file_name);
        tasks.push(DownloadTask::new(url.clone(), local.clone()));
        tasks.push(DownloadTask::new(
            format!("{}.sig", url),
            cache_dir.join(format!("{}.sig", meta.file_name)),
        ));
    }
    download::fetch_many(&tasks)?;

    // Stage 7: verification barrier before any mutation
    info!("[5/8] Verifying package signatures...");
    let verifier = Verifier::new(root, &repo_urls);
    for name in &plan.to_install {
        let meta = catalog
            .get(name)
            .ok_or_else(|| Error::Catalog(format!("no source metadata for '{}'", name)))?;
        let package_path = cache_dir.join(&meta.file_name);
        let signature_path = cache_dir.join(format!("{}.sig", meta.file_name));
        info!("Verifying {}...", name);
        verifier.verify(&package_path, &signature_path)?;
    }
    info!("All package signatures verified successfully.");

    // Stage 8: apply, in topological order
    info!("[6/8] Installing packages...");
    let bar = ProgressBar::new(plan.to_install.len() as u64);
    bar.set_style(package_progress_style());

    let mut post_install: Vec<(String, Vec<String>)> = Vec::new();
    for name in &plan.to_install {
        if db.is_installed(name)? {
            info!("Skipping already installed package: {}", name);
            bar.inc(1);
            continue;
        }

        let meta = catalog
            .get(name)
            .ok_or_else(|| Error::Catalog(format!("no source metadata for '{}'", name)))?;
        let package_path = cache_dir.join(&meta.file_name);

        info!("Installing {}...", name);
        hooks::run_hooks(
            HookPhase::PreInstall,
            Operation::Install,
            &[],
            root,
            Some(name.as_str()),
        )?;

        archive::extract_section(&package_path, "files/", root, meta.strip_components)?;

        propagate_skel(root);
        install_package_hooks(&package_path, name, meta.strip_components, root)?;

        db.append(&InstalledRecord::from_metadata(meta))?;
        post_install.push((name.clone(), affected_paths(meta)));

        info!("Finished installing {}", name);
        bar.inc(1);
    }
    bar.finish();

    // PostInstall is deferred so hooks observe the complete batch.
    info!("[7/8] Running PostInstall hooks...");
    for (name, installed_paths) in &post_install {
        let executed = hooks::run_hooks(
            HookPhase::PostInstall,
            Operation::Install,
            installed_paths,
            root,
            Some(name.as_str()),
        )?;
        if executed > 0 {
            info!("Finished PostInstall hooks for {}: {} hook(s) executed", name, executed);
        }
    }

    info!("[8/8] Installation process finished.");
    info!("--- Installation Complete ---");
    Ok(())
}
