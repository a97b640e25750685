use std::env;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use log::debug;

use crate::error::ExtractionError;
use crate::icons::loader;
use crate::sources::desktop::read_desktop_file;

/// Where a shortcut's icon lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconLocation {
    /// An icon resource file and the index of the icon inside it.
    File { path: PathBuf, index: i32 },
    /// No explicit icon; the shortcut's resolved target.
    Target(PathBuf),
}

impl IconLocation {
    pub fn path(&self) -> &Path {
        match self {
            IconLocation::File { path, .. } | IconLocation::Target(path) => path,
        }
    }
}

/// Platform shell integration: shortcut file -> icon location.
pub trait ShortcutResolver: Send + Sync {
    fn locate(&self, shortcut: &Path) -> Result<IconLocation, ExtractionError>;
}

/// Produces a decoded icon image for a source path.
pub trait IconExtractor: Send + Sync {
    fn extract(&self, source: &Path) -> Result<RgbaImage, ExtractionError>;
}

/// Resolves the icon location through a [`ShortcutResolver`] and rasterizes it.
///
/// Multi-icon containers are decoded by the image backend, which picks the
/// largest entry; the location's index is informational.
pub struct ShortcutIconExtractor<R> {
    resolver: R,
    size: u32,
}

impl<R: ShortcutResolver> ShortcutIconExtractor<R> {
    pub fn new(resolver: R, size: u32) -> Self {
        Self { resolver, size }
    }
}

impl<R: ShortcutResolver> IconExtractor for ShortcutIconExtractor<R> {
    fn extract(&self, source: &Path) -> Result<RgbaImage, ExtractionError> {
        let location = self.resolver.locate(source)?;
        debug!("icon for {:?} at {:?}", source, location);
        loader::load_icon(location.path(), self.size)
    }
}

/// For targets without shell integration: every lookup falls back.
pub struct NullResolver;

impl ShortcutResolver for NullResolver {
    fn locate(&self, shortcut: &Path) -> Result<IconLocation, ExtractionError> {
        Err(ExtractionError::Unsupported(shortcut.to_path_buf()))
    }
}

const ICON_EXTENSIONS: [&str; 4] = ["png", "svg", "xpm", "ico"];

fn is_icon_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ICON_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Resolves `.desktop` shortcuts through their `Icon=` key and the icon theme directories.
pub struct DesktopEntryResolver {
    icon_theme_paths: Vec<PathBuf>,
}

impl DesktopEntryResolver {
    pub fn new(icon_theme_paths: Vec<PathBuf>) -> Self {
        Self { icon_theme_paths }
    }

    fn find_themed(&self, icon_name: &str) -> Option<PathBuf> {
        let path = Path::new(icon_name);
        if path.is_absolute() {
            return path.exists().then(|| path.to_path_buf());
        }

        let common_subdirs = [
            "hicolor/256x256/apps",
            "hicolor/128x128/apps",
            "hicolor/64x64/apps",
            "hicolor/48x48/apps",
            "hicolor/scalable/apps",
            "hicolor/32x32/apps",
            "Adwaita/48x48/apps",
            "Adwaita/scalable/apps",
            "",
        ];

        for root in &self.icon_theme_paths {
            if !root.exists() { continue; }

            for sub in common_subdirs {
                let dir = root.join(sub);
                if !dir.exists() { continue; }

                for ext in ["png", "svg"] {
                    let file_path = dir.join(format!("{}.{}", icon_name, ext));
                    if file_path.exists() {
                        return Some(file_path);
                    }
                }
            }
        }
        None
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.is_absolute() {
        return candidate.exists().then(|| candidate.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

impl ShortcutResolver for DesktopEntryResolver {
    fn locate(&self, shortcut: &Path) -> Result<IconLocation, ExtractionError> {
        if is_icon_file(shortcut) {
            return Ok(IconLocation::File { path: shortcut.to_path_buf(), index: 0 });
        }

        let is_desktop = shortcut.extension().and_then(|e| e.to_str()) == Some("desktop");
        if !is_desktop {
            return Err(ExtractionError::Unsupported(shortcut.to_path_buf()));
        }

        let entry = read_desktop_file(shortcut).ok_or_else(|| ExtractionError::NoIcon(shortcut.to_path_buf()))?;
        if let Some(path) = entry.icon.as_deref().and_then(|name| self.find_themed(name)) {
            return Ok(IconLocation::File { path, index: 0 });
        }
        entry
            .program()
            .and_then(|program| find_in_path(&program))
            .map(IconLocation::Target)
            .ok_or_else(|| ExtractionError::NoIcon(shortcut.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn desktop_icon_name_resolves_through_theme_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let theme = dir.path().join("icons");
        let icon = theme.join("hicolor/48x48/apps/editor.png");
        fs::create_dir_all(icon.parent().unwrap()).unwrap();
        fs::write(&icon, b"png").unwrap();
        let shortcut = dir.path().join("editor.desktop");
        fs::write(&shortcut, "[Desktop Entry]\nName=Editor\nExec=editor %F\nIcon=editor\n").unwrap();

        let resolver = DesktopEntryResolver::new(vec![theme]);
        assert_eq!(resolver.locate(&shortcut).unwrap(), IconLocation::File { path: icon, index: 0 });
    }

    #[test]
    fn absolute_icon_path_is_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("tool.svg");
        fs::write(&icon, b"<svg/>").unwrap();
        let shortcut = dir.path().join("tool.desktop");
        fs::write(&shortcut, format!("[Desktop Entry]\nName=Tool\nIcon={}\n", icon.display())).unwrap();

        let resolver = DesktopEntryResolver::new(Vec::new());
        assert_eq!(resolver.locate(&shortcut).unwrap().path(), icon.as_path());
    }

    #[test]
    fn shortcut_without_icon_or_program_has_no_icon() {
        let dir = tempfile::tempdir().unwrap();
        let shortcut = dir.path().join("ghost.desktop");
        fs::write(&shortcut, "[Desktop Entry]\nName=Ghost\nExec=definitely-not-installed-xyz\n").unwrap();

        let resolver = DesktopEntryResolver::new(Vec::new());
        assert!(matches!(resolver.locate(&shortcut), Err(ExtractionError::NoIcon(_))));
        assert!(matches!(
            resolver.locate(&dir.path().join("app.lnk")),
            Err(ExtractionError::Unsupported(_))
        ));
    }

    #[test]
    fn extractor_rasterizes_the_located_file() {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("app.png");
        RgbaImage::from_pixel(8, 8, image::Rgba([1, 2, 3, 255])).save(&icon).unwrap();

        let extractor = ShortcutIconExtractor::new(DesktopEntryResolver::new(Vec::new()), 8);
        assert_eq!(extractor.extract(&icon).unwrap().get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert!(ShortcutIconExtractor::new(NullResolver, 8).extract(&icon).is_err());
    }
}
