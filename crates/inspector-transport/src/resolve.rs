use crate::environment::Environment;
use crate::error::TransportError;
use log::debug;
use std::path::{Path, PathBuf};

/// The program and arguments actually handed to the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExecutable {
    pub command: String,
    pub args: Vec<String>,
}

/// Map a logical command name to the executable that will be spawned.
///
/// Bare names are searched on the snapshot's `PATH`. A name that cannot be
/// found is returned unchanged so that the spawn itself reports the failure.
/// On Windows, batch shims (`npx.cmd` and friends) are run through `cmd.exe`.
pub fn resolve_executable(
    command: &str,
    args: &[String],
    env: &Environment,
) -> Result<ResolvedExecutable, TransportError> {
    if command.trim().is_empty() {
        return Err(TransportError::MissingCommand);
    }

    let resolved = if has_path_separator(command) {
        PathBuf::from(command)
    } else {
        match lookup(command, env) {
            Some(path) => path,
            None => {
                debug!("'{}' not found on PATH, spawning it as given", command);
                return Ok(ResolvedExecutable {
                    command: command.to_string(),
                    args: args.to_vec(),
                });
            }
        }
    };

    let resolved = resolved
        .to_str()
        .ok_or_else(|| {
            TransportError::construction(format!("Resolved path for '{}' is not valid UTF-8", command))
        })?
        .to_string();

    Ok(wrap_shim(resolved, args))
}

fn has_path_separator(command: &str) -> bool {
    command.contains('/') || (cfg!(windows) && command.contains('\\'))
}

fn lookup(command: &str, env: &Environment) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    which::which_in(command, env.var("PATH").map(|(_, path)| path), cwd).ok()
}

#[cfg(windows)]
fn wrap_shim(resolved: String, args: &[String]) -> ResolvedExecutable {
    let is_shim = Path::new(&resolved)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("cmd") || ext.eq_ignore_ascii_case("bat"))
        .unwrap_or(false);

    if !is_shim {
        return ResolvedExecutable { command: resolved, args: args.to_vec() };
    }

    let mut shim_args = vec!["/c".to_string(), resolved];
    shim_args.extend(args.iter().cloned());
    ResolvedExecutable { command: "cmd.exe".to_string(), args: shim_args }
}

#[cfg(not(windows))]
fn wrap_shim(resolved: String, args: &[String]) -> ResolvedExecutable {
    ResolvedExecutable { command: resolved, args: args.to_vec() }
}

/// Final path component of `command`, for logs and metadata.
pub fn display_name(command: &str) -> &str {
    Path::new(command)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(command)
}
