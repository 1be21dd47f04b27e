// src/config.rs

//! Repository configuration file handling.
//!
//! `/etc/starpack/repos.conf` lists one repository URL per line. `#` starts
//! a comment, blank lines are ignored, and URLs are normalized with a
//! trailing slash when read for fetching.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Parsed repository configuration.
#[derive(Debug, Clone, Default)]
pub struct RepoConfig {
    pub repositories: Vec<String>,
}

impl RepoConfig {
    /// Load the configuration from a file.
    ///
    /// Lines are kept verbatim (no slash normalization) so a save round-trips
    /// what the administrator wrote.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let repositories = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        Ok(Self { repositories })
    }

    /// Repository URLs normalized with a trailing slash, duplicates dropped,
    /// order preserved. This is the form the engine fetches from.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for repo in &self.repositories {
            let mut url = repo.clone();
            if !url.ends_with('/') {
                url.push('/');
            }
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }

    /// Load and return the normalized URL list, failing when none remain.
    pub fn load_urls(path: &Path) -> Result<Vec<String>> {
        let urls = Self::load(path)?.urls();
        if urls.is_empty() {
            return Err(Error::Config(format!(
                "no repository URLs found in {}",
                path.display()
            )));
        }
        Ok(urls)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let mut file = fs::File::create(path)
            .map_err(|e| Error::Config(format!("cannot write {}: {}", path.display(), e)))?;

        writeln!(file, "# Starpack Repository Configuration")?;
        writeln!(file, "# Define repositories for Starpack to fetch packages from.")?;
        writeln!(file)?;
        for repo in &self.repositories {
            writeln!(file, "{}", repo)?;
        }
        Ok(())
    }

    pub fn add_repository(&mut self, repo: &str) -> Result<()> {
        if self.repositories.iter().any(|r| r == repo) {
            return Err(Error::Config(format!("repository already exists: {}", repo)));
        }
        self.repositories.push(repo.to_string());
        info!("Added repository: {}", repo);
        Ok(())
    }

    pub fn remove_repository(&mut self, repo: &str) -> Result<()> {
        let before = self.repositories.len();
        self.repositories.retain(|r| r != repo);
        if self.repositories.len() == before {
            return Err(Error::Config(format!("repository not found: {}", repo)));
        }
        info!("Removed repository: {}", repo);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_skips_comments_and_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repos.conf");
        fs::write(
            &path,
            "# comment\n\nhttps://repo.example.com/core\nhttps://mirror.example.org/extra/\n",
        )
        .unwrap();

        let config = RepoConfig::load(&path).unwrap();
        assert_eq!(config.repositories.len(), 2);

        let urls = config.urls();
        assert_eq!(urls[0], "https://repo.example.com/core/");
        assert_eq!(urls[1], "https://mirror.example.org/extra/");
    }

    #[test]
    fn test_urls_deduplicate() {
        let config = RepoConfig {
            repositories: vec![
                "https://a.example/repo".to_string(),
                "https://a.example/repo/".to_string(),
            ],
        };
        assert_eq!(config.urls().len(), 1);
    }

    #[test]
    fn test_add_remove_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repos.conf");

        let mut config = RepoConfig::default();
        config.add_repository("https://repo.example.com/core").unwrap();
        assert!(config.add_repository("https://repo.example.com/core").is_err());
        config.save(&path).unwrap();

        let mut loaded = RepoConfig::load(&path).unwrap();
        assert_eq!(loaded.repositories, config.repositories);

        loaded.remove_repository("https://repo.example.com/core").unwrap();
        assert!(loaded.remove_repository("https://repo.example.com/core").is_err());
        assert!(loaded.repositories.is_empty());
    }

    #[test]
    fn test_load_urls_empty_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repos.conf");
        fs::write(&path, "# nothing here\n").unwrap();
        assert!(matches!(RepoConfig::load_urls(&path), Err(Error::Config(_))));
    }
}
