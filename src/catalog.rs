// src/catalog.rs

//! Repository catalog loading.
//!
//! Every repository publishes a `repo.db.yaml` index: a map with a
//! `packages` key holding package metadata records. Catalogs are fetched
//! concurrently into the per-root cache directory and merged into one flat
//! map keyed by package name, first-seen-wins across the ordered
//! repository list. The providing repository is remembered per record so
//! archives are fetched from the matching URL.

use crate::download::{self, DownloadTask};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Catalog file name published at every repository root.
pub const CATALOG_FILE_NAME: &str = "repo.db.yaml";

/// One package record, shared by catalogs and package `metadata.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub strip_components: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_dirs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
}

/// On-disk catalog layout: `packages:` followed by a record sequence.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub packages: Vec<PackageMetadata>,
}

impl CatalogFile {
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Catalog(format!("malformed catalog: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Catalog(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::Catalog(format!("cannot serialize catalog: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| Error::Catalog(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }
}

/// Merged view over every reachable repository catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    /// name -> (source repository URL, record)
    packages: HashMap<String, (String, PackageMetadata)>,
}

/// Local cache path for one repository's catalog.
///
/// The URL is flattened into a file name so distinct repositories never
/// collide in the shared cache directory.
pub fn cached_catalog_path(cache_dir: &Path, repo_url: &str) -> PathBuf {
    let safe: String = repo_url
        .chars()
        .map(|c| if c == '/' || c == ':' { '_' } else { c })
        .collect();
    cache_dir.join(format!("{}{}", safe, CATALOG_FILE_NAME))
}

impl Catalog {
    /// Fetch and merge the catalogs of every configured repository.
    ///
    /// Unreachable or malformed catalogs are warned and skipped; the load
    /// only fails when no package records could be gathered at all.
    pub fn load(repo_urls: &[String], cache_dir: &Path) -> Result<Self> {
        fs::create_dir_all(cache_dir)
            .map_err(|e| Error::Catalog(format!("cannot create cache directory: {}", e)))?;

        let tasks: Vec<DownloadTask> = repo_urls
            .iter()
            .map(|url| {
                DownloadTask::new(
                    format!("{}{}", url, CATALOG_FILE_NAME),
                    cached_catalog_path(cache_dir, url),
                )
            })
            .collect();

        if download::fetch_many(&tasks).is_err() {
            warn!("One or more repository catalog downloads failed; continuing with what is available");
        }

        let mut catalog = Self::default();
        for url in repo_urls {
            let local = cached_catalog_path(cache_dir, url);
            if !local.exists() {
                warn!("Repository catalog missing, skipping repository: {}", url);
                continue;
            }
            match CatalogFile::load(&local) {
                Ok(parsed) => {
                    let count = catalog.merge(url, parsed);
                    info!("Loaded {} package definitions from {}", count, url);
                }
                Err(e) => {
                    warn!("Skipping repository {}: {}", url, e);
                }
            }
        }

        if catalog.packages.is_empty() {
            return Err(Error::Catalog(
                "no packages found in any repository catalog".to_string(),
            ));
        }
        Ok(catalog)
    }

    /// Insert records from one repository; first occurrence of a name wins.
    /// Returns the number of records newly inserted.
    pub fn merge(&mut self, repo_url: &str, file: CatalogFile) -> usize {
        let mut inserted = 0;
        for record in file.packages {
            if record.name.is_empty() {
                warn!("Ignoring catalog record with empty name from {}", repo_url);
                continue;
            }
            if !self.packages.contains_key(&record.name) {
                self.packages
                    .insert(record.name.clone(), (repo_url.to_string(), record));
                inserted += 1;
            }
        }
        inserted
    }

    pub fn get(&self, name: &str) -> Option<&PackageMetadata> {
        self.packages.get(name).map(|(_, record)| record)
    }

    /// Repository URL that provided a record.
    pub fn source(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(|(url, _)| url.as_str())
    }

    /// Full archive URL for a package.
    pub fn archive_url(&self, name: &str) -> Option<String> {
        let (repo, record) = self.packages.get(name)?;
        Some(format!("{}{}", repo, record.file_name))
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str) -> PackageMetadata {
        PackageMetadata {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            file_name: format!("{}-{}.starpack", name, version),
            dependencies: Vec::new(),
            files: Vec::new(),
            strip_components: 0,
            update_dirs: None,
            update_time: None,
            size: None,
            arch: None,
            build_date: None,
        }
    }

    #[test]
    fn test_parse_catalog_yaml() {
        let yaml = "\
packages:
  - name: foo
    version: \"1.0\"
    description: a test package
    file_name: foo-1.0.starpack
    dependencies:
      - bar
      - baz >= 2.0
    strip_components: 1
    files:
      - usr/bin/foo
";
        let parsed = CatalogFile::parse(yaml).unwrap();
        assert_eq!(parsed.packages.len(), 1);
        let pkg = &parsed.packages[0];
        assert_eq!(pkg.name, "foo");
        assert_eq!(pkg.dependencies, vec!["bar", "baz >= 2.0"]);
        assert_eq!(pkg.strip_components, 1);
        assert!(pkg.update_time.is_none());
    }

    #[test]
    fn test_first_seen_wins() {
        let mut catalog = Catalog::default();
        catalog.merge(
            "https://primary.example/",
            CatalogFile {
                packages: vec![record("foo", "2.0")],
            },
        );
        catalog.merge(
            "https://mirror.example/",
            CatalogFile {
                packages: vec![record("foo", "1.0"), record("bar", "1.0")],
            },
        );

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("foo").unwrap().version, "2.0");
        assert_eq!(catalog.source("foo"), Some("https://primary.example/"));
        assert_eq!(catalog.source("bar"), Some("https://mirror.example/"));
    }

    #[test]
    fn test_archive_url() {
        let mut catalog = Catalog::default();
        catalog.merge(
            "https://repo.example/core/",
            CatalogFile {
                packages: vec![record("foo", "1.0")],
            },
        );
        assert_eq!(
            catalog.archive_url("foo").unwrap(),
            "https://repo.example/core/foo-1.0.starpack"
        );
        assert!(catalog.archive_url("missing").is_none());
    }

    #[test]
    fn test_cached_catalog_path_is_unique_per_repo() {
        let dir = Path::new("/cache");
        let a = cached_catalog_path(dir, "https://a.example/core/");
        let b = cached_catalog_path(dir, "https://b.example/core/");
        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with(CATALOG_FILE_NAME));
    }
}
