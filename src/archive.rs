// src/archive.rs

//! Streaming package-archive extraction.
//!
//! A `.starpack` archive is a compressed tarball with top-level sections
//! (`metadata.yaml`, `files/`, `hooks/`). The extractor streams one
//! section into a destination directory, removing the section prefix and a
//! caller-specified number of leading path components from every entry.
//! Hardlink targets are rewritten to land inside the destination, and a
//! destination object whose filesystem type conflicts with an entry is
//! removed with a warning before the entry is written.
//!
//! Nested archives are never descended into and symlinks are not followed
//! when composing destination paths.

use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use tracing::{debug, warn};

/// Read buffer used when probing the compression format.
const MAGIC_PROBE_LEN: usize = 6;

fn open_archive(path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let mut file = File::open(path)
        .map_err(|e| Error::Archive(format!("cannot open {}: {}", path.display(), e)))?;

    let mut magic = [0u8; MAGIC_PROBE_LEN];
    let n = file
        .read(&mut magic)
        .map_err(|e| Error::Archive(format!("cannot read {}: {}", path.display(), e)))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| Error::Archive(format!("cannot rewind {}: {}", path.display(), e)))?;

    let format = CompressionFormat::from_magic_bytes(&magic[..n]);
    debug!("Opening {} ({} compression)", path.display(), format);
    let reader = compression::create_decoder(file, format)
        .map_err(|e| Error::Archive(format!("cannot decode {}: {}", path.display(), e)))?;
    Ok(tar::Archive::new(reader))
}

/// Remove the section prefix (and one optional separator) from an entry
/// path. `None` means the entry is outside the section.
fn strip_section_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    Some(rest.trim_start_matches(['/', '\\']))
}

/// Drop `count` leading path components, skipping `.` and empty
/// components. `..` components are refused outright. `None` when nothing
/// remains.
fn strip_path_components(path: &str, count: u32) -> Option<PathBuf> {
    let mut remaining = count;
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => {
                if remaining > 0 {
                    remaining -= 1;
                } else {
                    out.push(part);
                }
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Stream-extract the entries of one archive section into `dest_root`.
///
/// Soft per-entry problems (type-conflict removal failures) are warned and
/// counted but do not fail the extraction; the call fails when the archive
/// cannot be read to EOF or an entry write fails fatally.
pub fn extract_section(
    archive_path: &Path,
    section_prefix: &str,
    dest_root: &Path,
    strip_components: u32,
) -> Result<()> {
    let mut archive = open_archive(archive_path)?;
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(true);
    archive.set_preserve_ownerships(nix::unistd::geteuid().is_root());

    let mut fatal_errors: Vec<String> = Vec::new();

    for entry in archive
        .entries()
        .map_err(|e| Error::Archive(format!("cannot read {}: {}", archive_path.display(), e)))?
    {
        let mut entry = entry.map_err(|e| {
            Error::Archive(format!(
                "error reading entry header in {}: {}",
                archive_path.display(),
                e
            ))
        })?;

        let entry_path = entry.path().map(|p| p.to_string_lossy().into_owned());
        let Ok(entry_path) = entry_path else {
            warn!("Skipping archive entry with unreadable path");
            continue;
        };

        let Some(in_section) = strip_section_prefix(&entry_path, section_prefix) else {
            continue;
        };
        if in_section.is_empty() {
            continue;
        }
        let Some(stripped) = strip_path_components(in_section, strip_components) else {
            continue;
        };

        let dest_path = dest_root.join(&stripped);
        if let Some(parent) = dest_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!("Failed to create directory {}: {}", parent.display(), e);
                }
            }
        }

        let entry_type = entry.header().entry_type();
        let entry_is_dir = entry_type == EntryType::Directory;

        // Resolve dir-vs-nondir conflicts at the destination. Symlinks are
        // inspected, never followed.
        match fs::symlink_metadata(&dest_path) {
            Ok(existing) => {
                let existing_is_dir = existing.file_type().is_dir();
                if existing_is_dir != entry_is_dir {
                    warn!(
                        "Path type conflict for {}; removing existing entry",
                        dest_path.display()
                    );
                    let removed = if existing_is_dir {
                        fs::remove_dir_all(&dest_path)
                    } else {
                        fs::remove_file(&dest_path)
                    };
                    if let Err(e) = removed {
                        warn!(
                            "Failed to remove conflicting entry {}: {}. Skipping.",
                            dest_path.display(),
                            e
                        );
                        continue;
                    }
                } else if !existing_is_dir
                    && matches!(entry_type, EntryType::Symlink | EntryType::Link)
                {
                    // Link creation cannot overwrite; clear same-type leftovers.
                    let _ = fs::remove_file(&dest_path);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Could not stat {}: {}", dest_path.display(), e);
            }
        }

        if entry_type == EntryType::Link {
            // Retarget the hardlink into the destination tree.
            let target = match entry.link_name() {
                Ok(Some(target)) => target.to_string_lossy().into_owned(),
                _ => {
                    warn!("Hardlink entry {} has no target; skipping", entry_path);
                    continue;
                }
            };
            let Some(target_in_section) = strip_section_prefix(&target, section_prefix) else {
                warn!("Hardlink target {} is outside the section; skipping", target);
                continue;
            };
            let Some(stripped_target) = strip_path_components(target_in_section, strip_components)
            else {
                continue;
            };
            let link_target = dest_root.join(stripped_target);
            if let Err(e) = fs::hard_link(&link_target, &dest_path) {
                fatal_errors.push(format!(
                    "hardlink {} -> {}: {}",
                    dest_path.display(),
                    link_target.display(),
                    e
                ));
            }
            continue;
        }

        // Regular files stream their data blocks; directories, symlinks,
        // and empty files only need their metadata written.
        if let Err(e) = entry.unpack(&dest_path) {
            fatal_errors.push(format!("{}: {}", dest_path.display(), e));
        }
    }

    if fatal_errors.is_empty() {
        Ok(())
    } else {
        for err in &fatal_errors {
            warn!("extraction error: {}", err);
        }
        Err(Error::Archive(format!(
            "failed to extract {} entries from {}",
            fatal_errors.len(),
            archive_path.display()
        )))
    }
}

/// Extract a single named entry (e.g. `metadata.yaml`) into `dest_dir`.
///
/// Matches the entry name with or without a leading `./`. Returns whether
/// the entry was found.
pub fn extract_file(archive_path: &Path, entry_name: &str, dest_dir: &Path) -> Result<bool> {
    let mut archive = open_archive(archive_path)?;
    fs::create_dir_all(dest_dir)
        .map_err(|e| Error::Archive(format!("cannot create {}: {}", dest_dir.display(), e)))?;

    let dotted = format!("./{}", entry_name);
    for entry in archive
        .entries()
        .map_err(|e| Error::Archive(format!("cannot read {}: {}", archive_path.display(), e)))?
    {
        let mut entry = entry.map_err(|e| {
            Error::Archive(format!("error reading entry in {}: {}", archive_path.display(), e))
        })?;
        let path = entry
            .path()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        if path == entry_name || path == dotted {
            let file_name = Path::new(entry_name)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(entry_name));
            let out_path = dest_dir.join(file_name);
            let mut out = File::create(&out_path)
                .map_err(|e| Error::Archive(format!("cannot create {}: {}", out_path.display(), e)))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| {
                let _ = fs::remove_file(&out_path);
                Error::Archive(format!("error extracting {}: {}", entry_name, e))
            })?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// List every entry path in an archive, in order.
pub fn list_entry_paths(archive_path: &Path) -> Result<Vec<String>> {
    let mut archive = open_archive(archive_path)?;
    let mut paths = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| Error::Archive(format!("cannot read {}: {}", archive_path.display(), e)))?
    {
        let entry = entry.map_err(|e| {
            Error::Archive(format!("error reading entry in {}: {}", archive_path.display(), e))
        })?;
        if let Ok(path) = entry.path() {
            let path = path.to_string_lossy().into_owned();
            if !path.is_empty() {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}
