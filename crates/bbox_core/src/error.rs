use std::path::PathBuf;

/// Errors surfaced by the annotation core.
///
/// Image resolution never shows up here: an unreadable source is downgraded
/// to a literal URL instead.
#[derive(Debug, thiserror::Error)]
pub enum AnnotatorError {
    #[error("box index {index} is out of range for {len} boxes")]
    BoxIndexOutOfRange { index: usize, len: usize },

    #[error("cannot read options file {}", path.display())]
    ReadOptions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse options file {}", path.display())]
    ParseOptions {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;
