//! Shell link resolution through COM.

use std::env;
use std::ffi::{OsString, c_void};
use std::mem;
use std::os::windows::ffi::OsStringExt;
use std::path::{Path, PathBuf};
use std::ptr;

use image::RgbaImage;
use log::debug;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, CreateCompatibleDC, CreateDIBSection, DIB_RGB_COLORS, DeleteDC, DeleteObject,
    SelectObject,
};
use windows::Win32::System::Com::{
    CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, CoCreateInstance, CoInitializeEx, CoUninitialize, IPersistFile,
    STGM_READ,
};
use windows::Win32::UI::Shell::{ExtractIconExW, IShellLinkW, SLGP_RAWPATH, ShellLink};
use windows::Win32::UI::WindowsAndMessaging::{DI_NORMAL, DestroyIcon, DrawIconEx, HICON};
use windows::core::{HSTRING, Interface};

use super::loader;
use super::resolver::{IconExtractor, IconLocation, ShortcutResolver};
use crate::error::ExtractionError;

const MAX_PATH_CHARS: usize = 260;

/// Initializes COM for the current thread; uninitializes on drop when it was ours.
pub struct ComGuard {
    needs_uninit: bool,
}

impl ComGuard {
    pub fn init() -> Result<Self, ExtractionError> {
        match unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok() {
            Ok(()) => Ok(ComGuard { needs_uninit: true }),
            // already initialized with another apartment model
            Err(e) if e.code() == RPC_E_CHANGED_MODE => Ok(ComGuard { needs_uninit: false }),
            Err(e) => Err(platform_error("CoInitializeEx", e)),
        }
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.needs_uninit {
            unsafe { CoUninitialize() }
        }
    }
}

fn platform_error(call: &str, e: windows::core::Error) -> ExtractionError {
    ExtractionError::Platform(format!("{call} failed: {e}"))
}

fn from_wide(buf: &[u16]) -> PathBuf {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    PathBuf::from(OsString::from_wide(&buf[..len]))
}

/// Reads `.lnk` files through `IShellLinkW`.
pub struct ShellLinkResolver;

impl ShellLinkResolver {
    fn read_link(shortcut: &Path) -> Result<IconLocation, ExtractionError> {
        let link: IShellLinkW = unsafe { CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER) }
            .map_err(|e| platform_error("CoCreateInstance", e))?;
        let persist: IPersistFile = link.cast().map_err(|e| platform_error("IPersistFile", e))?;
        unsafe { persist.Load(&HSTRING::from(shortcut.as_os_str()), STGM_READ) }
            .map_err(|e| platform_error("IPersistFile::Load", e))?;

        let mut icon_buf = [0u16; MAX_PATH_CHARS];
        let mut index = 0i32;
        unsafe { link.GetIconLocation(&mut icon_buf, &mut index) }
            .map_err(|e| platform_error("GetIconLocation", e))?;
        let icon_path = from_wide(&icon_buf);
        if !icon_path.as_os_str().is_empty() {
            return Ok(IconLocation::File { path: icon_path, index });
        }

        let mut target_buf = [0u16; MAX_PATH_CHARS];
        unsafe { link.GetPath(&mut target_buf, ptr::null_mut(), SLGP_RAWPATH.0 as u32) }
            .map_err(|e| platform_error("GetPath", e))?;
        let target = from_wide(&target_buf);
        if target.as_os_str().is_empty() {
            return Err(ExtractionError::NoIcon(shortcut.to_path_buf()));
        }
        Ok(IconLocation::Target(target))
    }
}

    /// Same as [`ShortcutResolver::locate`] for callers already holding a [`ComGuard`].
    fn locate_initialized(shortcut: &Path) -> Result<IconLocation, ExtractionError> {
        let is_link = shortcut
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("lnk"));
        if !is_link {
            return Ok(IconLocation::File { path: shortcut.to_path_buf(), index: 0 });
        }
        Self::read_link(shortcut)
    }
}

impl ShortcutResolver for ShellLinkResolver {
    fn locate(&self, shortcut: &Path) -> Result<IconLocation, ExtractionError> {
        let _com = ComGuard::init()?;
        Self::locate_initialized(shortcut)
    }
}

const RESOURCE_CONTAINERS: [&str; 7] = ["exe", "dll", "icl", "cpl", "ocx", "scr", "mun"];

fn is_resource_container(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| RESOURCE_CONTAINERS.iter().any(|known| known.eq_ignore_ascii_case(e)))
}

/// Expands `%NAME%` references the way shell links store system paths.
/// Unknown names are kept as written.
fn expand_env(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if !raw.contains('%') {
        return path.to_path_buf();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.as_ref();
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        match env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                out.push('%');
                out.push_str(name);
                out.push('%');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    PathBuf::from(out)
}

/// Swaps GDI's BGRA byte order; icons drawn without an alpha channel become opaque.
fn bgra_to_rgba(bgra: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(bgra.len());
    let mut has_alpha = false;
    for px in bgra.chunks_exact(4) {
        rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        has_alpha |= px[3] != 0;
    }
    if !has_alpha {
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
    }
    rgba
}

/// Draws `hicon` into a top-down 32bpp DIB section of `size` pixels.
fn hicon_to_rgba(hicon: HICON, size: u32) -> Result<RgbaImage, ExtractionError> {
    let side = size as i32;
    let bmi = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: side,
            biHeight: -side,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };

    unsafe {
        let hdc = CreateCompatibleDC(None);
        if hdc.is_invalid() {
            return Err(ExtractionError::Platform("CreateCompatibleDC failed".into()));
        }

        let mut bits: *mut c_void = ptr::null_mut();
        let bitmap = match CreateDIBSection(hdc, &bmi, DIB_RGB_COLORS, &mut bits, None, 0) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                let _ = DeleteDC(hdc);
                return Err(platform_error("CreateDIBSection", e));
            }
        };
        if bits.is_null() {
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(hdc);
            return Err(ExtractionError::Platform("CreateDIBSection returned no pixels".into()));
        }

        let previous = SelectObject(hdc, bitmap);
        let drawn = DrawIconEx(hdc, 0, 0, hicon, side, side, 0, None, DI_NORMAL);
        let pixels = std::slice::from_raw_parts(bits as *const u8, (size * size * 4) as usize);
        let rgba = bgra_to_rgba(pixels);

        SelectObject(hdc, previous);
        let _ = DeleteObject(bitmap);
        let _ = DeleteDC(hdc);

        drawn.map_err(|e| platform_error("DrawIconEx", e))?;
        RgbaImage::from_raw(size, size, rgba)
            .ok_or_else(|| ExtractionError::Platform("icon buffer has the wrong size".into()))
    }
}

/// Renders icon `index` of an `.exe`/`.dll`-style resource file.
fn extract_resource_icon(file: &Path, index: i32, size: u32) -> Result<RgbaImage, ExtractionError> {
    let mut large = HICON::default();
    let count = unsafe { ExtractIconExW(&HSTRING::from(file.as_os_str()), index, Some(&mut large), None, 1) };
    if count == 0 || large.is_invalid() {
        return Err(ExtractionError::NoIcon(file.to_path_buf()));
    }

    let image = hicon_to_rgba(large, size);
    unsafe {
        let _ = DestroyIcon(large);
    }
    image
}

/// Resolves `.lnk` files and rasterizes their icon, including icons embedded
/// in executable resources. Everything runs inside one COM scope.
pub struct ShellLinkExtractor {
    size: u32,
}

impl ShellLinkExtractor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl IconExtractor for ShellLinkExtractor {
    fn extract(&self, source: &Path) -> Result<RgbaImage, ExtractionError> {
        let _com = ComGuard::init()?;
        let location = ShellLinkResolver::locate_initialized(source)?;
        debug!("icon for {:?} at {:?}", source, location);

        let (file, index) = match &location {
            IconLocation::File { path, index } => (expand_env(path), *index),
            IconLocation::Target(path) => (expand_env(path), 0),
        };
        if is_resource_container(&file) {
            extract_resource_icon(&file, index, self.size)
        } else {
            loader::load_icon(&file, self.size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gdi_pixels_become_rgba() {
        let translucent = bgra_to_rgba(&[10, 20, 30, 128, 1, 2, 3, 0]);
        assert_eq!(translucent, [30, 20, 10, 128, 3, 2, 1, 0]);

        // no alpha anywhere means the icon was drawn without a mask
        let opaque = bgra_to_rgba(&[10, 20, 30, 0]);
        assert_eq!(opaque, [30, 20, 10, 255]);
    }

    #[test]
    fn only_resource_files_go_through_extracticon() {
        assert!(is_resource_container(Path::new(r"C:\Windows\System32\shell32.dll")));
        assert!(is_resource_container(Path::new(r"C:\Program Files\App\App.EXE")));
        assert!(!is_resource_container(Path::new(r"C:\Icons\app.ico")));
    }

    #[test]
    fn environment_references_are_expanded() {
        let Ok(root) = env::var("SystemRoot") else { return };
        let expanded = expand_env(Path::new(r"%SystemRoot%\system32\imageres.dll"));
        assert_eq!(expanded, PathBuf::from(format!(r"{root}\system32\imageres.dll")));

        let unknown = Path::new(r"%NoSuchVariable%\x.dll");
        assert_eq!(expand_env(unknown), unknown);
    }
}
