//! Shell selection per host platform.

use std::path::{Path, PathBuf};

/// The host platform families the shell policy distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    Unix,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Unix
        }
    }
}

/// Pick the shell binary to launch.
///
/// An explicitly configured shell always wins. On Windows, PowerShell 7
/// (`pwsh.exe`) is preferred when it is on `PATH`, falling back to Windows
/// PowerShell. Elsewhere `$SHELL` is used when it names an existing absolute
/// path, then `/bin/bash`, then `/bin/sh`.
///
/// `available` answers whether a shell exists: absolute paths are checked on
/// disk, bare names are looked up on `PATH`.
pub fn select_shell(
    platform: HostPlatform,
    configured: Option<&str>,
    env_shell: Option<&str>,
    available: &dyn Fn(&str) -> bool,
) -> String {
    if let Some(shell) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        return shell.to_string();
    }

    match platform {
        HostPlatform::Windows => {
            if available("pwsh.exe") {
                "pwsh.exe".to_string()
            } else {
                "powershell.exe".to_string()
            }
        }
        HostPlatform::Unix => {
            if let Some(shell) = env_shell.filter(|s| s.starts_with('/') && available(s)) {
                return shell.to_string();
            }
            if available("/bin/bash") {
                "/bin/bash".to_string()
            } else {
                "/bin/sh".to_string()
            }
        }
    }
}

/// [`select_shell`] against the real environment.
pub fn default_shell(configured: Option<&str>) -> String {
    let env_shell = std::env::var("SHELL").ok();
    select_shell(
        HostPlatform::current(),
        configured,
        env_shell.as_deref(),
        &shell_available,
    )
}

fn shell_available(name: &str) -> bool {
    let path = Path::new(name);
    if path.is_absolute() {
        return path.is_file();
    }
    find_on_path(name).is_some()
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
