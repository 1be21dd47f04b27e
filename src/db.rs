// src/db.rs

//! The installed-package database.
//!
//! A line-oriented text store at `<root>/var/lib/starpack/installed.db`.
//! Each record starts with a `"<name> /"` header, followed by key-value
//! lines, a `Files:` list of absolute paths, an optional `Dependencies:`
//! list, and a 40-dash separator. Records are appended on install and the
//! whole file is stream-rewritten to a `.tmp` sibling and renamed for
//! every other mutation; the live file is never modified in place.

use crate::catalog::PackageMetadata;
use crate::error::{Error, Result};
use crate::paths;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Record terminator line.
pub const SEPARATOR: &str = "----------------------------------------";

/// One installed-package record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledRecord {
    pub name: String,
    pub version: String,
    pub description: String,
    pub size: Option<String>,
    pub architecture: Option<String>,
    pub update_time: Option<String>,
    pub build_date: Option<String>,
    pub files: Vec<String>,
    pub dependencies: Vec<String>,
}

impl InstalledRecord {
    /// Build a database record from catalog metadata.
    ///
    /// File paths are normalized to absolute form; `Update-time` is
    /// preferred over `Build-date` when both are present.
    pub fn from_metadata(meta: &PackageMetadata) -> Self {
        let files = meta
            .files
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| {
                if f.starts_with('/') {
                    f.clone()
                } else {
                    format!("/{}", f)
                }
            })
            .collect();

        Self {
            name: meta.name.clone(),
            version: meta.version.clone(),
            description: meta.description.clone(),
            size: meta.size.clone(),
            architecture: meta.arch.clone(),
            update_time: meta.update_time.clone(),
            build_date: if meta.update_time.is_none() {
                meta.build_date.clone()
            } else {
                None
            },
            files,
            dependencies: meta.dependencies.clone(),
        }
    }

    fn write_block<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "{} /", self.name)?;
        if !self.version.is_empty() {
            writeln!(out, "Version: {}", self.version)?;
        }
        if !self.description.is_empty() {
            writeln!(out, "Description: {}", self.description)?;
        }
        if let Some(size) = &self.size {
            writeln!(out, "Size: {}", size)?;
        }
        if let Some(arch) = &self.architecture {
            writeln!(out, "Architecture: {}", arch)?;
        }
        if let Some(time) = &self.update_time {
            writeln!(out, "Update-time: {}", time)?;
        } else if let Some(date) = &self.build_date {
            writeln!(out, "Build-date: {}", date)?;
        }
        writeln!(out, "Files:")?;
        for file in &self.files {
            writeln!(out, "{}", file)?;
        }
        if !self.dependencies.is_empty() {
            writeln!(out, "Dependencies:")?;
            for dep in &self.dependencies {
                writeln!(out, "{}", dep)?;
            }
        }
        writeln!(out, "{}", SEPARATOR)?;
        Ok(())
    }
}

/// Handle on one root's installed database.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Database for the given install root. Nothing is touched on disk
    /// until `init` or a mutation runs.
    pub fn open(root: &Path) -> Self {
        Self {
            path: paths::db_path(root),
        }
    }

    /// Database at an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the database directory and file exist.
    pub fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        if !self.path.exists() {
            info!("Creating empty database file: {}", self.path.display());
            File::create(&self.path)
                .map_err(|e| Error::Database(format!("cannot create {}: {}", self.path.display(), e)))?;
        }
        Ok(())
    }

    fn reader(&self) -> Result<Option<BufReader<File>>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Database(format!(
                "cannot open {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Scan for a record header.
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        let Some(reader) = self.reader()? else {
            return Ok(false);
        };
        let header = format!("{} /", name);
        for line in reader.lines() {
            let line = line.map_err(|e| Error::Database(e.to_string()))?;
            if line == header {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Append a record block, flushing before returning.
    pub fn append(&self, record: &InstalledRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::Database(format!("cannot open {} for append: {}", self.path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        record
            .write_block(&mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| Error::Database(format!("cannot write record for {}: {}", record.name, e)))?;
        Ok(())
    }

    /// Remove a record: stream-rewrite to a `.tmp` sibling skipping the
    /// record's block, then rename into place. A failed rename discards
    /// the temp file.
    pub fn remove(&self, name: &str) -> Result<()> {
        let Some(reader) = self.reader()? else {
            warn!("Database file {} does not exist", self.path.display());
            return Ok(());
        };

        let tmp_path = self.path.with_extension("db.tmp");
        let tmp = File::create(&tmp_path)
            .map_err(|e| Error::Database(format!("cannot create {}: {}", tmp_path.display(), e)))?;
        let mut writer = BufWriter::new(tmp);

        let header = format!("{} /", name);
        let mut skipping = false;
        for line in reader.lines() {
            let line = line.map_err(|e| Error::Database(e.to_string()))?;
            if line == header {
                skipping = true;
            } else if skipping && line == SEPARATOR {
                skipping = false;
            } else if !skipping {
                writeln!(writer, "{}", line).map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        writer.flush().map_err(|e| Error::Database(e.to_string()))?;
        drop(writer);

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Database(format!(
                "failed to update {}: {}",
                self.path.display(),
                e
            )));
        }
        info!("Database updated (removed entry for {})", name);
        Ok(())
    }

    /// Replace the `Version:` and `Update-time:` lines of one record.
    ///
    /// If either field is absent the database is left untouched and a
    /// warning is logged.
    pub fn update_fields(&self, name: &str, version: &str, update_time: &str) -> Result<()> {
        let Some(reader) = self.reader()? else {
            return Err(Error::Database(format!(
                "cannot open {} for updating",
                self.path.display()
            )));
        };

        let header = format!("{} /", name);
        let mut in_target = false;
        let mut version_updated = false;
        let mut time_updated = false;
        let mut rewritten = String::new();

        for line in reader.lines() {
            let line = line.map_err(|e| Error::Database(e.to_string()))?;
            if !in_target && line == header {
                in_target = true;
                rewritten.push_str(&line);
                rewritten.push('\n');
            } else if in_target {
                if line.starts_with("Version:") {
                    rewritten.push_str(&format!("Version: {}\n", version));
                    version_updated = true;
                } else if line.starts_with("Update-time:") {
                    rewritten.push_str(&format!("Update-time: {}\n", update_time));
                    time_updated = true;
                } else {
                    rewritten.push_str(&line);
                    rewritten.push('\n');
                }
                if line == SEPARATOR {
                    in_target = false;
                }
            } else {
                rewritten.push_str(&line);
                rewritten.push('\n');
            }
        }

        if !version_updated || !time_updated {
            warn!(
                "Could not find '{}' or its Version/Update-time in {}; not updated",
                name,
                self.path.display()
            );
            return Ok(());
        }

        let tmp_path = self.path.with_extension("db.tmp");
        fs::write(&tmp_path, rewritten)
            .map_err(|e| Error::Database(format!("cannot write {}: {}", tmp_path.display(), e)))?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Database(format!(
                "failed to update {}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }

    /// Parse every record in the database.
    pub fn all_records(&self) -> Result<Vec<InstalledRecord>> {
        let Some(reader) = self.reader()? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        let mut current: Option<InstalledRecord> = None;
        #[derive(PartialEq)]
        enum Section {
            Fields,
            Files,
            Dependencies,
        }
        let mut section = Section::Fields;

        for line in reader.lines() {
            let line = line.map_err(|e| Error::Database(e.to_string()))?;

            if let Some(name) = line.strip_suffix(" /") {
                if current.is_none() && !name.is_empty() && !name.contains(' ') {
                    current = Some(InstalledRecord {
                        name: name.to_string(),
                        ..Default::default()
                    });
                    section = Section::Fields;
                    continue;
                }
            }

            if current.is_some() && line == SEPARATOR {
                records.push(current.take().unwrap_or_default());
                continue;
            }

            let Some(record) = current.as_mut() else {
                continue;
            };

            if line == "Files:" {
                section = Section::Files;
                continue;
            }
            if line == "Dependencies:" {
                section = Section::Dependencies;
                continue;
            }

            match section {
                Section::Files => {
                    if !line.trim().is_empty() {
                        record.files.push(line);
                    }
                }
                Section::Dependencies => {
                    let dep = line.trim();
                    if !dep.is_empty() {
                        record.dependencies.push(dep.to_string());
                    }
                }
                Section::Fields => {
                    if let Some(value) = line.strip_prefix("Version:") {
                        record.version = value.trim().to_string();
                    } else if let Some(value) = line.strip_prefix("Description:") {
                        record.description = value.trim().to_string();
                    } else if let Some(value) = line.strip_prefix("Size:") {
                        record.size = Some(value.trim().to_string());
                    } else if let Some(value) = line.strip_prefix("Architecture:") {
                        record.architecture = Some(value.trim().to_string());
                    } else if let Some(value) = line.strip_prefix("Update-time:") {
                        record.update_time = Some(value.trim().to_string());
                    } else if let Some(value) = line.strip_prefix("Build-date:") {
                        record.build_date = Some(value.trim().to_string());
                    }
                }
            }
        }
        Ok(records)
    }

    /// One record by name.
    pub fn record(&self, name: &str) -> Result<Option<InstalledRecord>> {
        Ok(self.all_records()?.into_iter().find(|r| r.name == name))
    }

    /// Names of every installed package, in database order.
    pub fn installed_names(&self) -> Result<Vec<String>> {
        Ok(self.all_records()?.into_iter().map(|r| r.name).collect())
    }

    /// Absolute paths owned by a package.
    pub fn files_of(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .record(name)?
            .map(|r| r.files)
            .unwrap_or_default())
    }

    /// Recorded dependency strings of a package.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .record(name)?
            .map(|r| r.dependencies)
            .unwrap_or_default())
    }

    /// Recorded version of a package.
    pub fn version_of(&self, name: &str) -> Result<Option<String>> {
        Ok(self.record(name)?.map(|r| r.version))
    }

    /// Recorded update-time (falling back to build-date) of a package.
    pub fn update_time_of(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .record(name)?
            .and_then(|r| r.update_time.or(r.build_date)))
    }

    /// Names whose records list `name` among their dependencies.
    ///
    /// Dependency strings are matched by their name component, so
    /// `"zlib >= 1.2"` blocks removal of `zlib`.
    pub fn reverse_dependencies(&self, name: &str) -> Result<Vec<String>> {
        let mut result = Vec::new();
        for record in self.all_records()? {
            if record.name == name {
                continue;
            }
            let depends = record.dependencies.iter().any(|d| {
                crate::version::Dependency::parse(d).name == name
            });
            if depends {
                result.push(record.name);
            }
        }
        Ok(result)
    }

    /// Installed packages required by no remaining record's dependencies,
    /// excluding `excluding`.
    pub fn orphans(&self, excluding: &str) -> Result<Vec<String>> {
        let records = self.all_records()?;

        let mut required: HashSet<String> = HashSet::new();
        for record in &records {
            if record.name == excluding {
                continue;
            }
            for dep in &record.dependencies {
                required.insert(crate::version::Dependency::parse(dep).name);
            }
        }

        let mut orphans = Vec::new();
        for record in &records {
            if record.name == excluding {
                continue;
            }
            if !required.contains(&record.name) {
                orphans.push(record.name.clone());
            }
        }
        Ok(orphans)
    }
}
