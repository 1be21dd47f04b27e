// src/cache.rs

//! Cache cleanup.
//!
//! Removes stray `.starpack`, `.sig`, and `.yaml` files from `/tmp` and
//! wipes everything under the root's cache directory.

use crate::error::Result;
use crate::paths;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Extensions swept from /tmp.
const TMP_EXTENSIONS: &[&str] = &["starpack", "sig", "yaml"];

fn remove_matching(dir: &Path, matches: impl Fn(&Path) -> bool) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Directory not readable: {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() && matches(&path) {
            match fs::remove_file(&path) {
                Ok(()) => info!("Removed: {}", path.display()),
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Clean the package cache for an install root.
pub fn clean(root: &Path) -> Result<()> {
    info!("Cleaning up Starpack cache...");

    remove_matching(Path::new("/tmp"), |path| {
        path.extension()
            .and_then(|x| x.to_str())
            .map(|ext| TMP_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
    });

    let cache = paths::cache_dir(root);
    if cache.is_dir() {
        remove_matching(&cache, |_| true);
    }

    info!("Cache cleanup completed.");
    Ok(())
}
