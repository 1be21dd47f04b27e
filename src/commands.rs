// src/commands.rs
//! Thin command wrappers over the engine library.

use anyhow::{bail, Context, Result};
use starpack::catalog::{CatalogFile, PackageMetadata, CATALOG_FILE_NAME};
use starpack::{download, index, paths, Database, RepoConfig};
use std::path::Path;

pub fn cmd_install(packages: &[String], installdir: &str, confirm: bool) -> Result<()> {
    starpack::install::install(packages, Path::new(installdir), confirm)
        .context("installation failed")?;
    Ok(())
}

pub fn cmd_remove(packages: &[String], installdir: &str, force: bool) -> Result<()> {
    starpack::remove::remove(packages, Path::new(installdir), force).context("removal failed")?;
    Ok(())
}

pub fn cmd_update(packages: &[String], installdir: &str, confirm: bool) -> Result<()> {
    let root = Path::new(installdir);

    // No names means every installed package.
    let targets = if packages.is_empty() {
        Database::open(root).installed_names()?
    } else {
        packages.to_vec()
    };
    if targets.is_empty() {
        println!("No packages installed; nothing to update.");
        return Ok(());
    }

    starpack::update::update(&targets, root, confirm).context("update failed")?;
    Ok(())
}

pub fn cmd_list(installdir: &str) -> Result<()> {
    let db = Database::open(Path::new(installdir));
    let names = db.installed_names()?;

    println!("Installed Packages:");
    println!("-------------------");
    if names.is_empty() {
        println!("No packages are installed (what?)");
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

fn display_package(
    name: &str,
    version: &str,
    description: &str,
    dependencies: &[String],
    files: &[String],
) {
    println!("Name: {}", name);
    println!("Version: {}", version);
    println!("Description: {}", description);
    println!("Dependencies:");
    if dependencies.is_empty() {
        println!("  (none)");
    } else {
        for dep in dependencies {
            println!("  - {}", dep);
        }
    }
    println!("Files:");
    if files.is_empty() {
        println!("  (none)");
    } else {
        for file in files {
            println!("  {}", file);
        }
    }
}

/// Look a package up in a repository catalog, fetching it to a scratch dir.
fn find_in_repos(name: &str) -> Result<Option<PackageMetadata>> {
    let repo_urls = RepoConfig::load_urls(Path::new(paths::REPOS_CONF))?;
    let scratch = tempfile::tempdir()?;

    for repo in &repo_urls {
        let local = scratch.path().join(CATALOG_FILE_NAME);
        let _ = std::fs::remove_file(&local);
        if download::fetch_one(&format!("{}{}", repo, CATALOG_FILE_NAME), &local).is_err() {
            continue;
        }
        let Ok(catalog) = CatalogFile::load(&local) else {
            continue;
        };
        if let Some(record) = catalog.packages.into_iter().find(|p| p.name == name) {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

pub fn cmd_info(package: &str) -> Result<()> {
    let db = Database::open(Path::new("/"));
    if let Some(record) = db.record(package)? {
        display_package(
            &record.name,
            &record.version,
            &record.description,
            &record.dependencies,
            &record.files,
        );
        return Ok(());
    }

    if let Some(record) = find_in_repos(package)? {
        display_package(
            &record.name,
            &record.version,
            &record.description,
            &record.dependencies,
            &record.files,
        );
        return Ok(());
    }

    bail!("package {} not found locally or in repositories", package);
}

pub fn cmd_clean(installdir: &str) -> Result<()> {
    starpack::cache::clean(Path::new(installdir))?;
    Ok(())
}

pub fn cmd_repo_list() -> Result<()> {
    let config = RepoConfig::load(Path::new(paths::REPOS_CONF))?;
    println!("Configured Repositories:");
    for repo in &config.repositories {
        println!("  - {}", repo);
    }
    Ok(())
}

pub fn cmd_repo_add(url: &str) -> Result<()> {
    let path = Path::new(paths::REPOS_CONF);
    let mut config = RepoConfig::load(path).unwrap_or_default();
    config.add_repository(url)?;
    config.save(path)?;
    Ok(())
}

pub fn cmd_repo_remove(url: &str) -> Result<()> {
    let path = Path::new(paths::REPOS_CONF);
    let mut config = RepoConfig::load(path)?;
    config.remove_repository(url)?;
    config.save(path)?;
    Ok(())
}

pub fn cmd_repo_index(location: &str) -> Result<()> {
    index::create_index(Path::new(location))?;
    Ok(())
}

pub fn cmd_repo_add_missing(location: &str) -> Result<()> {
    index::add_missing(Path::new(location))?;
    Ok(())
}
