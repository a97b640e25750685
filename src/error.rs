use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("scan worker could not be started: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no icon source for {0}")]
    NoIcon(PathBuf),
    #[error("unsupported shortcut {0}")]
    Unsupported(PathBuf),
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("shell api failure: {0}")]
    Platform(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("nothing to launch for {0}")]
    EmptyTarget(String),
    #[error("failed to start {target}: {source}")]
    Spawn {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not present in its collection anymore")]
    Missing(String),
    #[error("{0} does not point at a file")]
    NotAFile(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {document}: {source}")]
    Encode {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link name and url must not be empty")]
    Blank,
    #[error("a link named {0:?} already exists")]
    Duplicate(String),
    #[error("no link named {0:?}")]
    NotFound(String),
    #[error("select exactly one link, {0} selected")]
    SelectionCount(usize),
    #[error("{0} is not an internet shortcut or application shortcut")]
    UnsupportedDrop(PathBuf),
    #[error("{0} has no URL= line")]
    MissingUrl(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
