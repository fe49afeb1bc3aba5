use crate::bbox::AnnotationSet;
use crate::error::{AnnotatorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Ten colors of the Tab10 colormap, assigned to classes in order.
pub const DEFAULT_COLORS: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Construction options for [`AnnotationStateManager`](crate::AnnotationStateManager).
///
/// Every field may be omitted when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetOptions {
    /// Path or URL of the image to annotate.
    pub image: String,
    pub classes: Vec<String>,
    pub colors: Vec<String>,
    pub bboxes: AnnotationSet,
    /// Class assigned to newly drawn boxes.
    pub label: String,
    /// Show image and boxes without any box interaction.
    pub view_only: bool,
    /// Hide the submit and skip buttons.
    pub hide_buttons: bool,
}

impl Default for WidgetOptions {
    fn default() -> Self {
        Self {
            image: String::new(),
            classes: Vec::new(),
            colors: DEFAULT_COLORS.iter().map(|c| c.to_string()).collect(),
            bboxes: AnnotationSet::default(),
            label: String::new(),
            view_only: false,
            hide_buttons: false,
        }
    }
}

impl WidgetOptions {
    pub fn new<I, S>(image: impl Into<String>, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: image.into(),
            classes: classes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| AnnotatorError::ReadOptions {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| AnnotatorError::ParseOptions {
            path: path.to_path_buf(),
            source,
        })
    }
}
