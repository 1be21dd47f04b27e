// src/paths.rs
//! Centralized path derivation for Starpack directories under an install root.

use std::path::{Path, PathBuf};

/// Host-side repository configuration file.
pub const REPOS_CONF: &str = "/etc/starpack/repos.conf";

/// Host-side universal hook directory.
pub const UNIVERSAL_HOOKS_DIR: &str = "/etc/starpack.d/universal-hooks";

/// Directory holding the installed database.
pub fn db_dir(root: &Path) -> PathBuf {
    root.join("var/lib/starpack")
}

/// The installed database file.
pub fn db_path(root: &Path) -> PathBuf {
    db_dir(root).join("installed.db")
}

/// Cache directory for fetched archives, signatures, and catalogs.
pub fn cache_dir(root: &Path) -> PathBuf {
    db_dir(root).join("cache")
}

/// Directory holding trusted public keys.
pub fn keys_dir(root: &Path) -> PathBuf {
    root.join("etc/starpack/keys")
}

/// The gpg keyring consumed by the verifier.
pub fn keyring_path(root: &Path) -> PathBuf {
    keys_dir(root).join("starpack.gpg")
}

/// Base directory for package-specific hooks.
pub fn hooks_dir(root: &Path) -> PathBuf {
    root.join("etc/starpack/hooks")
}

/// Hook directory for one package.
pub fn package_hooks_dir(root: &Path, package: &str) -> PathBuf {
    hooks_dir(root).join(package)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_root() {
        let root = Path::new("/mnt/target");
        assert_eq!(
            db_path(root),
            PathBuf::from("/mnt/target/var/lib/starpack/installed.db")
        );
        assert_eq!(
            cache_dir(root),
            PathBuf::from("/mnt/target/var/lib/starpack/cache")
        );
        assert_eq!(
            keyring_path(root),
            PathBuf::from("/mnt/target/etc/starpack/keys/starpack.gpg")
        );
        assert_eq!(
            package_hooks_dir(root, "nginx"),
            PathBuf::from("/mnt/target/etc/starpack/hooks/nginx")
        );
    }
}
