// src/verify.rs

//! Detached-signature verification against the managed keyring.
//!
//! Verification shells out to `gpg` in batch mode with `--status-fd 1` and
//! parses the machine-readable status lines. A signature is good if and
//! only if a `GOODSIG` line appears and gpg exits zero. When the public
//! key is missing, `<repo>/keys/<keyid>.asc` is tried from each configured
//! repository in order; the first hit is imported into the keyring and
//! verification is re-run exactly once.

use crate::download;
use crate::error::{Error, Result, VerifyError};
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Parsed gpg `--status-fd` output.
#[derive(Debug, Default)]
struct GpgStatus {
    good_sig: bool,
    bad_sig: bool,
    expired_sig: bool,
    expired_key: bool,
    revoked_key: bool,
    missing_key: Option<String>,
    exit_ok: bool,
}

/// Signature verifier bound to one install root and repository list.
pub struct Verifier<'a> {
    root: &'a Path,
    repo_urls: &'a [String],
}

impl<'a> Verifier<'a> {
    pub fn new(root: &'a Path, repo_urls: &'a [String]) -> Self {
        Self { root, repo_urls }
    }

    fn keyring(&self) -> PathBuf {
        paths::keyring_path(self.root)
    }

    /// Verify `package_path` against its detached signature.
    pub fn verify(&self, package_path: &Path, signature_path: &Path) -> Result<()> {
        if !signature_path.exists() {
            return Err(VerifyError::Other(format!(
                "missing signature file: {}",
                signature_path.display()
            ))
            .into());
        }
        if !package_path.exists() {
            return Err(VerifyError::Other(format!(
                "missing data file: {}",
                package_path.display()
            ))
            .into());
        }

        fs::create_dir_all(paths::keys_dir(self.root))
            .map_err(|e| Error::Filesystem(format!("cannot create keys directory: {}", e)))?;
        fs::create_dir_all(paths::cache_dir(self.root))
            .map_err(|e| Error::Filesystem(format!("cannot create cache directory: {}", e)))?;

        let status = self.run_gpg_verify(package_path, signature_path)?;
        if status.good_sig && status.exit_ok {
            return Ok(());
        }

        if status.bad_sig {
            return Err(VerifyError::BadSignature.into());
        }
        if status.expired_sig {
            return Err(VerifyError::SignatureExpired.into());
        }
        if status.expired_key {
            return Err(VerifyError::KeyExpired.into());
        }
        if status.revoked_key {
            return Err(VerifyError::KeyRevoked.into());
        }

        if let Some(key_id) = status.missing_key {
            warn!("Verification failed: missing public key {}", key_id);
            self.fetch_and_import_key(&key_id)?;

            info!("Re-verifying signature after key import...");
            let retry = self.run_gpg_verify(package_path, signature_path)?;
            if retry.good_sig && retry.exit_ok {
                return Ok(());
            }
            return Err(VerifyError::Other(format!(
                "signature still fails after importing key {}",
                key_id
            ))
            .into());
        }

        Err(VerifyError::Other("gpg reported no usable status".to_string()).into())
    }

    fn run_gpg_verify(&self, package_path: &Path, signature_path: &Path) -> Result<GpgStatus> {
        let output = Command::new("gpg")
            .args(["--batch", "--no-tty", "--status-fd", "1", "--no-default-keyring"])
            .arg("--keyring")
            .arg(self.keyring())
            .arg("--verify")
            .arg(signature_path)
            .arg(package_path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| VerifyError::Other(format!("failed to run gpg: {}", e)))?;

        let mut status = GpgStatus {
            exit_ok: output.status.success(),
            ..GpgStatus::default()
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let Some(rest) = line.strip_prefix("[GNUPG:] ") else {
                continue;
            };
            debug!("gpg status: {}", rest);
            let mut words = rest.split_whitespace();
            match words.next() {
                Some("GOODSIG") => status.good_sig = true,
                Some("BADSIG") => status.bad_sig = true,
                Some("EXPSIG") => status.expired_sig = true,
                Some("EXPKEYSIG") => status.expired_key = true,
                Some("REVKEYSIG") => status.revoked_key = true,
                Some("NO_PUBKEY") => {
                    status.missing_key = words.next().map(str::to_string);
                }
                _ => {}
            }
        }
        Ok(status)
    }

    /// Download `<repo>/keys/<keyid>.asc` from each repository in order and
    /// import the first hit into the keyring.
    fn fetch_and_import_key(&self, key_id: &str) -> Result<()> {
        if self.repo_urls.is_empty() {
            return Err(VerifyError::MissingKey {
                key_id: key_id.to_string(),
            }
            .into());
        }

        let temp_key = tempfile::Builder::new()
            .prefix(key_id)
            .suffix(".asc")
            .tempfile_in(paths::cache_dir(self.root))
            .map_err(|e| Error::Filesystem(format!("cannot create temp key file: {}", e)))?;
        let temp_path = temp_key.path().to_path_buf();
        // The download path must not pre-exist or the fetch is skipped.
        drop(temp_key);

        let mut downloaded = false;
        for repo in self.repo_urls {
            let key_url = format!("{}keys/{}.asc", repo, key_id);
            info!("Attempting key download: {}", key_url);
            match download::fetch_one(&key_url, &temp_path) {
                Ok(()) => {
                    downloaded = true;
                    break;
                }
                Err(e) => {
                    debug!("Key not available from {}: {}", repo, e);
                    let _ = fs::remove_file(&temp_path);
                }
            }
        }

        if !downloaded {
            return Err(VerifyError::MissingKey {
                key_id: key_id.to_string(),
            }
            .into());
        }

        info!("Importing key {}...", key_id);
        let import = Command::new("gpg")
            .args(["--batch", "--no-tty", "--no-default-keyring"])
            .arg("--keyring")
            .arg(self.keyring())
            .arg("--import")
            .arg(&temp_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let _ = fs::remove_file(&temp_path);

        match import {
            Ok(status) if status.success() => {
                info!("Key imported successfully: {}", key_id);
                Ok(())
            }
            _ => Err(VerifyError::ImportFailed {
                key_id: key_id.to_string(),
            }
            .into()),
        }
    }
}
