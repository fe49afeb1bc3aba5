//! Image source resolution.
//!
//! A source is turned into something a surface can display directly: local
//! files become base64 data URIs, anything else is handed over verbatim.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Where the displayed image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Tried as a local file first, used verbatim if it cannot be read.
    Path(PathBuf),
    /// Never touches the filesystem.
    Url(String),
    /// Raw encoded image bytes.
    Bytes(Arc<[u8]>),
}

impl Default for ImageSource {
    fn default() -> Self {
        ImageSource::Path(PathBuf::new())
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(path) => write!(f, "{}", path.display()),
            ImageSource::Url(url) => f.write_str(url),
            ImageSource::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for ImageSource {
    fn from(location: &str) -> Self {
        ImageSource::Path(PathBuf::from(location))
    }
}

impl From<String> for ImageSource {
    fn from(location: String) -> Self {
        ImageSource::Path(PathBuf::from(location))
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes.into())
    }
}

/// The displayable form of an [`ImageSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedImage {
    /// A `data:` URI or the literal location.
    pub display: String,
    /// Loaded bytes, if the source was a readable file or a byte buffer.
    pub bytes: Option<Arc<[u8]>>,
}

impl ResolvedImage {
    pub fn is_data_uri(&self) -> bool {
        self.display.starts_with("data:")
    }
}

/// Resolve `source` into its displayable form. Never fails.
pub fn resolve_image(source: &ImageSource) -> ResolvedImage {
    match source {
        ImageSource::Path(path) => match fs::read(path) {
            Ok(data) => {
                let subtype = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .filter(|ext| !ext.is_empty())
                    .map(|ext| ext.to_ascii_lowercase());
                encode(data.into(), subtype)
            }
            Err(err) => {
                tracing::debug!(
                    "{} is not a readable file ({err}), using it verbatim",
                    path.display()
                );
                ResolvedImage {
                    display: path.to_string_lossy().into_owned(),
                    bytes: None,
                }
            }
        },
        ImageSource::Url(url) => ResolvedImage {
            display: url.clone(),
            bytes: None,
        },
        ImageSource::Bytes(bytes) => encode(bytes.clone(), None),
    }
}

fn encode(bytes: Arc<[u8]>, subtype: Option<String>) -> ResolvedImage {
    let media_type = match subtype.or_else(|| sniff_subtype(&bytes)) {
        Some(subtype) => format!("image/{subtype}"),
        None => FALLBACK_MEDIA_TYPE.to_string(),
    };
    let display = format!("data:{media_type};base64,{}", STANDARD.encode(&bytes));
    ResolvedImage {
        display,
        bytes: Some(bytes),
    }
}

fn sniff_subtype(bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes).ok()?;
    format.extensions_str().first().map(|ext| ext.to_string())
}
