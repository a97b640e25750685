//! Freedesktop `.desktop` shortcut parsing.

use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopEntry {
    pub exec: Option<String>,
    pub icon: Option<String>,
    pub terminal: bool,
}

impl DesktopEntry {
    /// Exec line without field codes (`%f`, `%U`, ...).
    pub fn command(&self) -> Option<String> {
        let exec = self.exec.as_deref()?;
        let clean: String = exec
            .split_whitespace()
            .filter(|s| !s.starts_with('%'))
            .collect::<Vec<_>>()
            .join(" ");
        if clean.is_empty() { None } else { Some(clean) }
    }

    /// First word of the command, i.e. the program that would be started.
    pub fn program(&self) -> Option<String> {
        self.command()
            .and_then(|cmd| cmd.split_whitespace().next().map(|s| s.trim_matches('"').to_string()))
    }
}

pub fn read_desktop_file(path: &Path) -> Option<DesktopEntry> {
    let content = fs::read_to_string(path).ok()?;
    Some(parse_desktop_file(&content))
}

pub fn parse_desktop_file(content: &str) -> DesktopEntry {
    let mut entry = DesktopEntry::default();
    let mut is_desktop_entry = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') { continue; }

        if line.starts_with('[') {
            is_desktop_entry = line == "[Desktop Entry]";
            continue;
        }

        if !is_desktop_entry { continue; }

        let Some((key, value)) = line.split_once('=') else { continue };
        let value = value.trim();
        match key.trim() {
            "Exec" => entry.exec = Some(value.to_string()),
            "Icon" if !value.is_empty() => entry.icon = Some(value.to_string()),
            "Terminal" => entry.terminal = value == "true",
            _ => {}
        }
    }

    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_only_the_desktop_entry_group() {
        let entry = parse_desktop_file(
            "# comment\n[Desktop Entry]\nName=Files\nExec=nautilus --new-window %U\nIcon=org.gnome.Nautilus\nTerminal=false\n\n[Desktop Action new]\nName=New Window\nExec=nautilus --other\n",
        );
        assert_eq!(entry.command().as_deref(), Some("nautilus --new-window"));
        assert_eq!(entry.program().as_deref(), Some("nautilus"));
        assert_eq!(entry.icon.as_deref(), Some("org.gnome.Nautilus"));
        assert!(!entry.terminal);
    }

    #[test]
    fn missing_exec_has_no_command() {
        let entry = parse_desktop_file("[Desktop Entry]\nName=Broken\nIcon=\n");
        assert_eq!(entry.command(), None);
        assert_eq!(entry.icon, None);
    }
}
