// src/error.rs

//! Unified error type for the Starpack engine.
//!
//! Every pipeline stage reports through `Result<T>`; warnings that do not
//! abort an operation are logged instead of surfaced here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unreadable configuration, or no repositories configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure or HTTP status >= 400.
    #[error("download failed: {0}")]
    Download(String),

    /// Catalog missing, malformed, or containing invalid records.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// A required name is in no repository catalog and not installed.
    #[error("cannot resolve '{0}': not found in any repository and not installed")]
    Resolution(String),

    /// Signature verification failed; the reason is discriminated.
    #[error("signature verification failed: {0}")]
    Verification(#[from] VerifyError),

    /// Archive read failure, unreadable entry, or fatal write failure.
    #[error("archive error: {0}")]
    Archive(String),

    /// Rename, remove, or create failure after verification.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// Inability to read, rewrite, or rename the installed database.
    #[error("database error: {0}")]
    Database(String),

    /// A hook command exited non-zero or was killed by a signal.
    #[error("hook '{name}' failed: {reason}")]
    Hook { name: String, reason: String },

    /// Mount, fork, chroot, or exec failure inside the chroot executor.
    #[error("chroot execution failed: {0}")]
    Chroot(String),

    /// Refusal on policy grounds (critical package removal).
    #[error("{0}")]
    Policy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Discriminated signature-verification failure reason.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("BAD signature")]
    BadSignature,

    #[error("signature has expired")]
    SignatureExpired,

    #[error("signing key has expired")]
    KeyExpired,

    #[error("signing key has been revoked")]
    KeyRevoked,

    #[error("missing public key {key_id} (not available from any repository)")]
    MissingKey { key_id: String },

    #[error("failed to import public key {key_id}")]
    ImportFailed { key_id: String },

    #[error("{0}")]
    Other(String),
}
