// src/hooks.rs

//! Lifecycle hook discovery, matching, and execution.
//!
//! Hooks are INI-style `.hook` files with `[Hook]`, `[When]`, and `[Exec]`
//! sections. Universal hooks live on the host under
//! `/etc/starpack.d/universal-hooks/`; package-specific hooks live under
//! `<root>/etc/starpack/hooks/<pkg>/`. Universal hooks win on duplicate
//! basenames. Matching hooks run in ascending source-path order, via the
//! shell directly when the install root is `/` and inside a chroot
//! otherwise. The first failing hook aborts the surrounding operation.

use crate::chroot;
use crate::error::{Error, Result};
use crate::paths;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Lifecycle phases a hook can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreInstall,
    PostInstall,
    PreUpdate,
    PostUpdate,
    PreRemove,
    PostRemove,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreInstall => "PreInstall",
            Self::PostInstall => "PostInstall",
            Self::PreUpdate => "PreUpdate",
            Self::PostUpdate => "PostUpdate",
            Self::PreRemove => "PreRemove",
            Self::PostRemove => "PostRemove",
        }
    }
}

/// The operation a hook invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Update,
    Remove,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "Install",
            Self::Update => "Update",
            Self::Remove => "Remove",
        }
    }
}

/// A parsed `.hook` file.
#[derive(Debug, Clone, Default)]
pub struct HookFile {
    pub source_path: PathBuf,
    pub name: String,
    pub description: String,
    pub phase: String,
    pub ops: Vec<String>,
    pub paths: Vec<String>,
    pub negations: Vec<String>,
    pub command: String,
    pub needs_paths: bool,
}

/// Parse one `.hook` file. Unknown keys and malformed lines are warned
/// and skipped; a missing `Phase` or `Command` is warned here and makes
/// the hook unmatchable or unrunnable later.
pub fn parse_hook_file(path: &Path) -> Result<HookFile> {
    let content = fs::read_to_string(path).map_err(|e| Error::Hook {
        name: path.display().to_string(),
        reason: format!("cannot open hook file: {}", e),
    })?;

    let mut hook = HookFile {
        source_path: path.to_path_buf(),
        ..HookFile::default()
    };

    let mut section = String::new();
    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_string();
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("Invalid line (missing '=') in {}:{}: {}", path.display(), line_no, line);
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            warn!("Empty key in {}:{}", path.display(), line_no);
            continue;
        }

        match (section.as_str(), key) {
            ("Hook", "Name") => hook.name = value.to_string(),
            ("Hook", "Description") => hook.description = value.to_string(),
            ("When", "Phase") => hook.phase = value.to_string(),
            ("When", "Operation") => hook.ops.push(value.to_string()),
            ("When", "Paths") => hook.paths.push(value.to_string()),
            ("When", "Negation") => hook.negations.push(value.to_string()),
            ("Exec", "Command") => hook.command = value.to_string(),
            ("Exec", "NeedsPaths") => {
                let lower = value.to_lowercase();
                hook.needs_paths = lower == "yes" || lower == "true";
            }
            _ => {
                warn!(
                    "Unknown key '{}' in [{}] section of {}:{}",
                    key,
                    section,
                    path.display(),
                    line_no
                );
            }
        }
    }

    if hook.phase.is_empty() {
        warn!("Hook file {} is missing 'Phase' in [When]", path.display());
    }
    if hook.command.is_empty() {
        warn!("Hook file {} is missing 'Command' in [Exec]", path.display());
    }
    Ok(hook)
}

/// Wildcard matching for hook path patterns.
///
/// Supports exactly `*`, `X*`, `*X`, and `*X*`; any other use of `*` is
/// warned and the pattern treated as a literal.
pub fn match_wildcard(pattern: &str, s: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let Some(first_star) = pattern.find('*') else {
        return pattern == s;
    };
    let last_star = pattern.rfind('*').unwrap_or(first_star);

    if first_star == 0 && last_star == pattern.len() - 1 && pattern.len() > 1 {
        let inner = &pattern[1..pattern.len() - 1];
        if !inner.contains('*') {
            return s.contains(inner);
        }
    } else if first_star == 0 && first_star == last_star {
        return s.ends_with(&pattern[1..]);
    } else if first_star == pattern.len() - 1 && first_star == last_star {
        return s.starts_with(&pattern[..pattern.len() - 1]);
    }

    warn!(
        "Wildcard pattern '{}' is too complex for basic matching; treating as literal",
        pattern
    );
    pattern == s
}

/// Match a hook against an operation and the affected paths.
fn hook_matches(hook: &HookFile, operation: Operation, affected_paths: &[String]) -> bool {
    if !hook.ops.is_empty() && !hook.ops.iter().any(|op| op == operation.as_str()) {
        return false;
    }

    if !hook.paths.is_empty() {
        let matched = hook
            .paths
            .iter()
            .any(|pattern| affected_paths.iter().any(|p| match_wildcard(pattern, p)));
        if !matched {
            return false;
        }
    }

    for pattern in &hook.negations {
        if affected_paths.iter().any(|p| match_wildcard(pattern, p)) {
            return false;
        }
    }
    true
}

/// Collect candidate hook files: universal hooks plus (when a package
/// context is given) package-specific hooks, deduplicated by basename
/// with universal hooks taking precedence.
fn collect_hook_files(root: &Path, package: Option<&str>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut scan = |dir: PathBuf| {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|x| x.to_str()) == Some("hook"))
            .collect();
        found.sort();
        for path in found {
            let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if seen.insert(basename.to_string()) {
                files.push(path);
            }
        }
    };

    scan(PathBuf::from(paths::UNIVERSAL_HOOKS_DIR));
    if let Some(package) = package {
        if !package.is_empty() {
            scan(paths::package_hooks_dir(root, package));
        }
    }
    files
}

fn root_is_host(root: &Path) -> bool {
    let host = Path::new("/");
    let canonical_root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    canonical_root == host
}

/// Find and execute every hook matching (phase, operation, paths).
///
/// Returns the number of hooks executed. A hook that exits non-zero or is
/// killed by a signal aborts with `Error::Hook`.
pub fn run_hooks(
    phase: HookPhase,
    operation: Operation,
    affected_paths: &[String],
    root: &Path,
    package: Option<&str>,
) -> Result<usize> {
    let candidates = collect_hook_files(root, package);

    let mut matching: Vec<HookFile> = Vec::new();
    for path in candidates {
        let hook = match parse_hook_file(&path) {
            Ok(hook) => hook,
            Err(e) => {
                warn!("Error parsing hook file {}: {}. Skipping.", path.display(), e);
                continue;
            }
        };
        if hook.phase != phase.as_str() {
            continue;
        }
        if hook_matches(&hook, operation, affected_paths) {
            matching.push(hook);
        }
    }

    if matching.is_empty() {
        return Ok(0);
    }

    matching.sort_by(|a, b| a.source_path.cmp(&b.source_path));

    let use_chroot = !root_is_host(root);
    info!(
        "Running {} {} hooks ({} matching, {})",
        phase.as_str(),
        operation.as_str(),
        matching.len(),
        if use_chroot { "in chroot" } else { "direct on host" }
    );

    let mut executed = 0;
    for hook in &matching {
        let label = hook
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| hook.source_path.display().to_string());

        if hook.command.is_empty() {
            warn!("Empty command in hook {}; skipping", label);
            continue;
        }
        if hook.needs_paths {
            // Path passing is unimplemented; the command runs without them.
            warn!(
                "Hook {} sets NeedsPaths=true but path passing is not implemented; running without paths",
                label
            );
        }

        debug!("Executing hook {}: {}", label, hook.command);
        if use_chroot {
            if !root.join("bin/sh").exists() {
                return Err(Error::Hook {
                    name: label,
                    reason: format!("/bin/sh not found within chroot {}", root.display()),
                });
            }
            let argv = vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                hook.command.clone(),
            ];
            chroot::execute_in_chroot(root, "/bin/sh", &argv, "/").map_err(|e| Error::Hook {
                name: label.clone(),
                reason: e.to_string(),
            })?;
        } else {
            let status = Command::new("/bin/sh")
                .arg("-c")
                .arg(&hook.command)
                .status()
                .map_err(|e| Error::Hook {
                    name: label.clone(),
                    reason: format!("failed to spawn shell: {}", e),
                })?;
            if !status.success() {
                let reason = match status.code() {
                    Some(code) => format!("exit code {}", code),
                    None => "terminated by signal".to_string(),
                };
                return Err(Error::Hook { name: label, reason });
            }
        }
        executed += 1;
    }

    Ok(executed)
}
