use serde::Deserialize;
use std::path::{Path, PathBuf};
use directories::{BaseDirs, ProjectDirs};
use std::fs;

use crate::error::ConfigError;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "quantum", "quantum-launcher")
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub icons: IconConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    #[serde(default)]
    pub terminal: Option<String>,
}

fn default_recent_limit() -> usize { 50 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            terminal: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_scan_roots")]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[cfg(target_os = "windows")]
fn default_scan_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(appdata) = std::env::var("APPDATA") {
        roots.push(PathBuf::from(appdata).join("Microsoft/Windows/Start Menu/Programs"));
    }
    roots.push(PathBuf::from("C:/ProgramData/Microsoft/Windows/Start Menu/Programs"));
    roots
}

#[cfg(not(target_os = "windows"))]
fn default_scan_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(base_dirs) = BaseDirs::new() {
        roots.push(base_dirs.data_dir().join("applications"));
    }
    roots.push(PathBuf::from("/usr/share/applications"));
    roots.push(PathBuf::from("/usr/local/share/applications"));
    roots
}

fn default_extensions() -> Vec<String> {
    vec!["lnk".to_string(), "desktop".to_string()]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: default_scan_roots(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_threshold() -> f64 { 90.0 }
fn default_cache_capacity() -> usize { 100 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct IconConfig {
    #[serde(default = "default_icon_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_cache_limit_mb")]
    pub cache_limit_mb: u64,
    #[serde(default = "default_icon_size")]
    pub icon_size: u32,
    #[serde(default = "default_theme_paths")]
    pub theme_paths: Vec<PathBuf>,
}

fn default_icon_cache_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("icon_cache"))
        .unwrap_or_else(|| PathBuf::from("icon_cache"))
}

fn default_cache_limit_mb() -> u64 { 100 }
fn default_icon_size() -> u32 { 64 }

fn default_theme_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = BaseDirs::new() {
        paths.push(home.data_dir().join("icons"));
    }
    paths.push(PathBuf::from("/usr/share/icons"));
    paths.push(PathBuf::from("/usr/share/pixmaps"));
    paths
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_icon_cache_dir(),
            cache_limit_mb: default_cache_limit_mb(),
            icon_size: default_icon_size(),
            theme_paths: default_theme_paths(),
        }
    }
}

impl IconConfig {
    pub fn cache_limit_bytes(&self) -> u64 {
        self.cache_limit_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { dir: default_data_dir() }
    }
}

pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Loads `config.toml`, falling back to defaults when the file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: config_path,
        source,
    })
}
