// src/chroot.rs

//! Chroot command execution with managed kernel mounts.
//!
//! Running a hook inside an alternate install root requires `proc` and
//! `devpts` mounted under the chroot. Mounts are acquired by the parent
//! before forking and released in a cleanup phase that runs on every exit
//! path; the child only chroots, chdirs, and execs.

use crate::error::{Error, Result};
use nix::mount::{mount, umount, umount2, MntFlags, MsFlags};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, chroot, execve, fork, ForkResult};
use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Minimal PATH handed to chrooted commands.
const CHROOT_PATH_ENV: &str = "PATH=/usr/bin:/bin:/usr/sbin:/sbin";

/// Kernel mounts held for the duration of one chroot execution.
///
/// Unmount failures are reported by `release`; `Drop` is only a backstop
/// for early-error paths and must not panic.
struct ChrootMounts {
    proc_target: PathBuf,
    devpts_target: PathBuf,
    proc_mounted: bool,
    devpts_mounted: bool,
}

impl ChrootMounts {
    fn acquire(chroot_dir: &Path) -> Result<Self> {
        let mut mounts = Self {
            proc_target: chroot_dir.join("proc"),
            devpts_target: chroot_dir.join("dev/pts"),
            proc_mounted: false,
            devpts_mounted: false,
        };

        ensure_mount_point(&mounts.proc_target)?;
        mount(
            Some("proc"),
            &mounts.proc_target,
            Some("proc"),
            MsFlags::MS_NODEV | MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID,
            None::<&str>,
        )
        .map_err(|e| Error::Chroot(format!("failed to mount proc at {}: {}", mounts.proc_target.display(), e)))?;
        mounts.proc_mounted = true;

        ensure_mount_point(&mounts.devpts_target)?;
        let devpts_flags = MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC;
        let mounted = mount(
            Some("devpts"),
            &mounts.devpts_target,
            Some("devpts"),
            devpts_flags,
            Some("gid=5,mode=620"),
        );
        if mounted.is_err() {
            // Some kernels reject the mount data; retry bare.
            mount(
                Some("devpts"),
                &mounts.devpts_target,
                Some("devpts"),
                devpts_flags,
                None::<&str>,
            )
            .map_err(|e| {
                let _ = mounts.release();
                Error::Chroot(format!(
                    "failed to mount devpts at {}: {}",
                    mounts.devpts_target.display(),
                    e
                ))
            })?;
        }
        mounts.devpts_mounted = true;

        Ok(mounts)
    }

    /// Unmount in reverse order of mounting. Returns whether every
    /// unmount succeeded; non-existence is not an error.
    fn release(&mut self) -> bool {
        let mut ok = true;
        if self.devpts_mounted {
            ok &= unmount_target(&self.devpts_target);
            self.devpts_mounted = false;
        }
        if self.proc_mounted {
            ok &= unmount_target(&self.proc_target);
            self.proc_mounted = false;
        }
        ok
    }
}

impl Drop for ChrootMounts {
    fn drop(&mut self) {
        if self.proc_mounted || self.devpts_mounted {
            warn!("Chroot mounts released late; cleaning up");
            self.release();
        }
    }
}

fn ensure_mount_point(target: &Path) -> Result<()> {
    if !target.exists() {
        fs::create_dir_all(target).map_err(|e| {
            Error::Chroot(format!("cannot create mount point {}: {}", target.display(), e))
        })?;
    }
    Ok(())
}

/// Detach-unmount with a plain umount fallback. ENOENT and EINVAL mean
/// the target was never (or is no longer) mounted.
fn unmount_target(target: &Path) -> bool {
    match umount2(target, MntFlags::MNT_DETACH) {
        Ok(()) => true,
        Err(nix::errno::Errno::ENOENT) => true,
        Err(nix::errno::Errno::EINVAL) => match umount(target) {
            Ok(()) | Err(nix::errno::Errno::ENOENT) | Err(nix::errno::Errno::EINVAL) => true,
            Err(e) => {
                warn!("Error unmounting {}: {}", target.display(), e);
                false
            }
        },
        Err(e) => {
            warn!("Error unmounting {} (detach): {}", target.display(), e);
            match umount(target) {
                Ok(()) | Err(nix::errno::Errno::ENOENT) | Err(nix::errno::Errno::EINVAL) => true,
                Err(e) => {
                    warn!("Error unmounting {}: {}", target.display(), e);
                    false
                }
            }
        }
    }
}

/// Execute a command inside a chroot.
///
/// `command` is the executable path inside the chroot; `args` is the full
/// argv (including argv[0]). Success requires the child to exit zero and
/// every cleanup unmount to succeed.
pub fn execute_in_chroot(
    chroot_dir: &Path,
    command: &str,
    args: &[String],
    working_dir: &str,
) -> Result<()> {
    if command.is_empty() || args.is_empty() {
        return Err(Error::Chroot("empty command or argument vector".to_string()));
    }
    if !chroot_dir.is_dir() {
        return Err(Error::Chroot(format!(
            "chroot directory {} does not exist or is not a directory",
            chroot_dir.display()
        )));
    }

    let mut mounts = ChrootMounts::acquire(chroot_dir)?;
    let outcome = fork_and_run(chroot_dir, command, args, working_dir);
    let cleanup_ok = mounts.release();

    let result = outcome?;
    if !cleanup_ok {
        warn!(
            "Failed to unmount one or more filesystems from {}; manual cleanup may be required",
            chroot_dir.display()
        );
        return Err(Error::Chroot(format!(
            "cleanup unmount failed for {}",
            chroot_dir.display()
        )));
    }
    Ok(result)
}

fn fork_and_run(chroot_dir: &Path, command: &str, args: &[String], working_dir: &str) -> Result<()> {
    let command_c = CString::new(command)
        .map_err(|e| Error::Chroot(format!("invalid command string: {}", e)))?;
    let mut argv: Vec<CString> = Vec::with_capacity(args.len());
    for arg in args {
        argv.push(CString::new(arg.as_str()).map_err(|e| Error::Chroot(format!("invalid argument: {}", e)))?);
    }
    let envp = [CString::new(CHROOT_PATH_ENV)
        .map_err(|e| Error::Chroot(format!("invalid environment string: {}", e)))?];

    debug!(
        "Executing in chroot {}: {}",
        chroot_dir.display(),
        args.join(" ")
    );

    // Safety: the child immediately chroots and execs; no allocation or
    // locking happens between fork and execve beyond the prepared CStrings.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let status = (|| -> std::result::Result<(), nix::errno::Errno> {
                chroot(chroot_dir)?;
                chdir(Path::new(working_dir))?;
                execve(&command_c, &argv, &envp)?;
                Ok(())
            })();
            // Only reached when chroot/chdir/execve failed.
            let _ = status;
            unsafe { libc::_exit(127) };
        }
        Ok(ForkResult::Parent { child }) => match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, 0)) => Ok(()),
            Ok(WaitStatus::Exited(_, code)) => Err(Error::Chroot(format!(
                "chrooted command exited with status {}",
                code
            ))),
            Ok(WaitStatus::Signaled(_, signal, _)) => Err(Error::Chroot(format!(
                "chrooted command terminated by signal {:?}",
                signal
            ))),
            Ok(other) => Err(Error::Chroot(format!(
                "chrooted command finished with unexpected status: {:?}",
                other
            ))),
            Err(e) => Err(Error::Chroot(format!("waitpid failed: {}", e))),
        },
        Err(e) => Err(Error::Chroot(format!("fork failed: {}", e))),
    }
}
