use std::path::Path;
use std::process::{Command, Stdio};

use log::info;

use crate::error::LaunchError;
use crate::model::{Entry, EntryKind};
use crate::sources::desktop::read_desktop_file;

/// Starts whatever an entry points at.
pub trait Launcher {
    fn launch(&self, entry: &Entry) -> Result<(), LaunchError>;

    /// Opens the file manager at the entry's file.
    fn reveal(&self, entry: &Entry) -> Result<(), LaunchError>;
}

/// Launches through the operating system: shortcut `Exec` lines and
/// executables directly, everything else through the desktop opener.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher {
    terminal: Option<String>,
}

impl SystemLauncher {
    pub fn new(terminal: Option<String>) -> Self {
        Self { terminal }
    }

    /// Command line for an entry, as program + arguments.
    pub fn command_for(&self, entry: &Entry) -> Result<Vec<String>, LaunchError> {
        let target = entry.target.trim();
        if target.is_empty() {
            return Err(LaunchError::EmptyTarget(entry.name.clone()));
        }

        let path = Path::new(target);
        let is_desktop = path.extension().and_then(|e| e.to_str()) == Some("desktop");
        if entry.kind == EntryKind::App && is_desktop {
            if let Some(desktop) = read_desktop_file(path) {
                if let Some(command) = desktop.command() {
                    let mut parts = Vec::new();
                    if desktop.terminal {
                        if let Some(term_cmd) = &self.terminal {
                            parts.extend(term_cmd.split_whitespace().map(String::from));
                        }
                    }
                    parts.extend(command.split_whitespace().map(String::from));
                    return Ok(parts);
                }
            }
        }

        Ok(opener_command(target))
    }

    /// Command line that shows the entry's file in the file manager.
    pub fn reveal_command_for(&self, entry: &Entry) -> Result<Vec<String>, LaunchError> {
        let target = entry.target.trim();
        if target.is_empty() {
            return Err(LaunchError::EmptyTarget(entry.name.clone()));
        }
        if target.contains("://") {
            return Err(LaunchError::NotAFile(entry.name.clone()));
        }
        Ok(reveal_command(Path::new(target)))
    }

    fn spawn(&self, entry: &Entry, parts: &[String]) -> Result<(), LaunchError> {
        let Some((program, args)) = parts.split_first() else {
            return Err(LaunchError::EmptyTarget(entry.name.clone()));
        };

        let mut command = Command::new(program);
        command.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().map_err(|source| LaunchError::Spawn {
            target: entry.target.clone(),
            source,
        })?;
        info!("{} via {}", entry.id(), program);
        Ok(())
    }
}

#[cfg(windows)]
fn opener_command(target: &str) -> Vec<String> {
    vec!["cmd".into(), "/C".into(), "start".into(), String::new(), target.into()]
}

#[cfg(target_os = "macos")]
fn opener_command(target: &str) -> Vec<String> {
    vec!["open".into(), target.into()]
}

#[cfg(not(any(windows, target_os = "macos")))]
fn opener_command(target: &str) -> Vec<String> {
    vec!["xdg-open".into(), target.into()]
}

#[cfg(windows)]
fn reveal_command(path: &Path) -> Vec<String> {
    vec!["explorer".into(), "/select,".into(), path.display().to_string()]
}

#[cfg(target_os = "macos")]
fn reveal_command(path: &Path) -> Vec<String> {
    vec!["open".into(), "-R".into(), path.display().to_string()]
}

// xdg-open cannot select a file, so open its folder
#[cfg(not(any(windows, target_os = "macos")))]
fn reveal_command(path: &Path) -> Vec<String> {
    let folder = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    vec!["xdg-open".into(), folder.display().to_string()]
}

impl Launcher for SystemLauncher {
    fn launch(&self, entry: &Entry) -> Result<(), LaunchError> {
        let parts = self.command_for(entry)?;
        self.spawn(entry, &parts)
    }

    fn reveal(&self, entry: &Entry) -> Result<(), LaunchError> {
        let parts = self.reveal_command_for(entry)?;
        self.spawn(entry, &parts)
    }
}
