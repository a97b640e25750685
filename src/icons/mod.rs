pub mod loader;
pub mod resolver;
#[cfg(windows)]
pub mod shell_link;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use image::{ImageFormat, Rgba, RgbaImage};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::config::IconConfig;
use crate::error::ExtractionError;

pub use resolver::{
    DesktopEntryResolver, IconExtractor, IconLocation, NullResolver, ShortcutIconExtractor, ShortcutResolver,
};

pub type IconHandle = Arc<RgbaImage>;

const FALLBACK_SIZE: u32 = 32;

fn fallback_image(size: u32) -> RgbaImage {
    let border = size / 8;
    RgbaImage::from_fn(size, size, |x, y| {
        let inner = x >= border && y >= border && x < size - border && y < size - border;
        if inner { Rgba([160, 160, 160, 255]) } else { Rgba([96, 96, 96, 255]) }
    })
}

/// Cache file name for a source path: lowercase sha256 hex of the path string.
pub fn cache_key(source: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// Extractor for the current platform.
pub fn platform_extractor(config: &IconConfig) -> Box<dyn IconExtractor> {
    #[cfg(windows)]
    {
        Box::new(shell_link::ShellLinkExtractor::new(config.icon_size))
    }
    #[cfg(unix)]
    {
        Box::new(ShortcutIconExtractor::new(
            DesktopEntryResolver::new(config.theme_paths.clone()),
            config.icon_size,
        ))
    }
    #[cfg(not(any(windows, unix)))]
    {
        Box::new(ShortcutIconExtractor::new(NullResolver, config.icon_size))
    }
}

/// Content-addressed icon cache: memory map in front of `<hash>.png` files,
/// bounded on disk by total size with oldest-modified eviction.
pub struct IconCache {
    dir: PathBuf,
    limit_bytes: u64,
    memory: Mutex<HashMap<String, IconHandle>>,
    extractor: Box<dyn IconExtractor>,
    fallback: IconHandle,
}

impl IconCache {
    pub fn new(dir: impl Into<PathBuf>, limit_bytes: u64, extractor: Box<dyn IconExtractor>) -> Self {
        Self {
            dir: dir.into(),
            limit_bytes,
            memory: Mutex::new(HashMap::new()),
            extractor,
            fallback: Arc::new(fallback_image(FALLBACK_SIZE)),
        }
    }

    pub fn from_config(config: &IconConfig) -> Self {
        Self::new(config.cache_dir.clone(), config.cache_limit_bytes(), platform_extractor(config))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fallback(&self) -> IconHandle {
        Arc::clone(&self.fallback)
    }

    pub fn is_fallback(&self, handle: &IconHandle) -> bool {
        Arc::ptr_eq(handle, &self.fallback)
    }

    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, IconHandle>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disk_path(&self, source: &Path) -> PathBuf {
        self.dir.join(format!("{}.png", cache_key(source)))
    }

    /// Returns the icon for `source`, or the fallback handle when it cannot be produced.
    pub fn resolve(&self, source: &Path) -> IconHandle {
        let key = source.to_string_lossy().into_owned();
        if let Some(hit) = self.memory().get(&key) {
            return Arc::clone(hit);
        }

        let cached = self.disk_path(source);
        if cached.exists() {
            match image::open(&cached) {
                Ok(img) => {
                    let handle: IconHandle = Arc::new(img.into_rgba8());
                    self.memory().insert(key, Arc::clone(&handle));
                    return handle;
                }
                Err(e) => debug!("unreadable cached icon {:?}: {}", cached, e),
            }
        }

        let img = match self.extractor.extract(source) {
            Ok(img) => img,
            Err(e) => {
                debug!("no icon for {:?}: {}", source, e);
                return self.fallback();
            }
        };

        if let Err(e) = self.write(&cached, &img) {
            debug!("failed to cache icon for {:?}: {}", source, e);
            return self.fallback();
        }

        let handle: IconHandle = Arc::new(img);
        self.memory().insert(key, Arc::clone(&handle));
        if let Err(e) = self.evict() {
            warn!("icon cache sweep failed in {:?}: {}", self.dir, e);
        }
        handle
    }

    fn write(&self, path: &Path, img: &RgbaImage) -> Result<(), ExtractionError> {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("png.tmp");
        img.save_with_format(&tmp, ImageFormat::Png).map_err(|e| ExtractionError::Decode {
            path: tmp.clone(),
            message: e.to_string(),
        })?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn cached_files(&self) -> io::Result<Vec<(PathBuf, u64, SystemTime)>> {
        let mut files = Vec::new();
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e),
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() {
                files.push((path, meta.len(), meta.modified()?));
            }
        }
        Ok(files)
    }

    /// Total bytes held by cached PNG files.
    pub fn disk_usage(&self) -> io::Result<u64> {
        Ok(self.cached_files()?.iter().map(|(_, len, _)| len).sum())
    }

    /// Deletes least-recently-modified files until the directory fits the limit.
    /// Returns how many files were deleted.
    pub fn evict(&self) -> io::Result<usize> {
        let mut files = self.cached_files()?;
        let mut total: u64 = files.iter().map(|(_, len, _)| len).sum();
        if total <= self.limit_bytes {
            return Ok(0);
        }

        files.sort_by_key(|(_, _, modified)| *modified);
        let mut removed = 0;
        for (path, len, _) in files {
            if total <= self.limit_bytes {
                break;
            }
            fs::remove_file(&path)?;
            total = total.saturating_sub(len);
            removed += 1;
        }

        if removed > 0 {
            self.memory().clear();
            info!("icon cache evicted {} files, {} bytes remain", removed, total);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingExtractor {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl IconExtractor for CountingExtractor {
        fn extract(&self, source: &Path) -> Result<RgbaImage, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractionError::NoIcon(source.to_path_buf()));
            }
            Ok(RgbaImage::from_pixel(16, 16, Rgba([200, 10, 10, 255])))
        }
    }

    fn counting(fail: bool) -> (Arc<AtomicUsize>, Box<dyn IconExtractor>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&calls), Box::new(CountingExtractor { calls, fail }))
    }

    #[test]
    fn key_is_sha256_hex_of_the_path() {
        let key = cache_key(Path::new("C:/Start Menu/Notepad.lnk"));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(key, cache_key(Path::new("C:/Start Menu/Paint.lnk")));
    }

    #[test]
    fn repeated_resolution_extracts_once() {
        let dir = tempfile::tempdir().unwrap();
        let (calls, extractor) = counting(false);
        let cache = IconCache::new(dir.path(), u64::MAX, extractor);
        let source = Path::new("/menu/Notepad.lnk");

        let first = cache.resolve(source);
        let second = cache.resolve(source);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!cache.is_fallback(&first));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join(format!("{}.png", cache_key(source))).exists());
    }

    #[test]
    fn disk_entries_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let source = Path::new("/menu/Paint.lnk");
        let (_, extractor) = counting(false);
        IconCache::new(dir.path(), u64::MAX, extractor).resolve(source);

        let (calls, extractor) = counting(false);
        let cache = IconCache::new(dir.path(), u64::MAX, extractor);
        let icon = cache.resolve(source);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(icon.get_pixel(0, 0).0, [200, 10, 10, 255]);
    }

    #[test]
    fn failures_return_fallback_and_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (calls, extractor) = counting(true);
        let cache = IconCache::new(dir.path(), u64::MAX, extractor);
        let source = Path::new("/menu/Broken.lnk");

        assert!(cache.is_fallback(&cache.resolve(source)));
        assert!(cache.is_fallback(&cache.resolve(source)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.memory_len(), 0);
    }

    #[test]
    fn eviction_keeps_the_newest_files_under_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);
        for (i, name) in ["oldest", "middle", "newest"].iter().enumerate() {
            let path = dir.path().join(format!("{name}.png"));
            fs::write(&path, vec![0u8; 1000]).unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(base + Duration::from_secs(60 * i as u64))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), vec![0u8; 5000]).unwrap();

        let (_, extractor) = counting(false);
        let cache = IconCache::new(dir.path(), 2000, extractor);
        assert_eq!(cache.evict().unwrap(), 1);
        assert!(cache.disk_usage().unwrap() <= 2000);
        assert!(!dir.path().join("oldest.png").exists());
        assert!(dir.path().join("middle.png").exists());
        assert!(dir.path().join("newest.png").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn eviction_clears_memory() {
        let dir = tempfile::tempdir().unwrap();
        let (calls, extractor) = counting(false);
        // smaller than a single encoded icon
        let cache = IconCache::new(dir.path(), 1, extractor);
        cache.resolve(Path::new("/menu/A.lnk"));
        assert_eq!(cache.memory_len(), 0);
        assert_eq!(cache.disk_usage().unwrap(), 0);

        cache.resolve(Path::new("/menu/A.lnk"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
