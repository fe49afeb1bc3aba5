//! Messages exchanged with a rendering surface.
//!
//! The manager publishes [`StateChange`]s as they happen and can produce a
//! full [`WidgetState`] on demand. Surfaces report user actions back as
//! [`SurfaceMessage`]s. Both sides serialize to JSON with the same field
//! names, so a transport only has to move the values around.

use crate::bbox::AnnotationSet;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Wire value of "no box selected".
pub const NO_SELECTION: i64 = -1;

/// One observable change, delivered synchronously to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateChange {
    Bboxes(AnnotationSet),
    SelectedIndex(#[serde(serialize_with = "serialize_cursor")] Option<usize>),
    /// Source location as given.
    Image(String),
    /// Data URI or literal location the surface displays.
    ImageData(String),
    Classes(Vec<String>),
    Colors(Vec<String>),
    Label(String),
    ViewOnly(bool),
    HideButtons(bool),
}

/// Signals a surface delivers to the manager.
///
/// Tagged by `type`, e.g. `{"type": "select", "index": 2}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceMessage {
    Submit,
    Skip,
    /// `-1` or any out-of-range index clears the selection.
    Select { index: i64 },
    /// An attached control changed its value.
    Control { name: String, value: Value },
    SetBboxes { bboxes: AnnotationSet },
    SetLabel { label: String },
}

/// Full observable state, as a surface would mirror it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetState {
    pub image: String,
    pub image_data: String,
    pub classes: Vec<String>,
    pub label: String,
    pub colors: Vec<String>,
    pub bboxes: AnnotationSet,
    #[serde(serialize_with = "serialize_cursor")]
    pub selected_index: Option<usize>,
    pub view_only: bool,
    pub hide_buttons: bool,
}

/// Maps a wire index onto a cursor for a set of `len` boxes.
pub fn cursor_from_index(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&i| i < len)
}

pub fn cursor_to_index(cursor: Option<usize>) -> i64 {
    cursor
        .and_then(|i| i64::try_from(i).ok())
        .unwrap_or(NO_SELECTION)
}

fn serialize_cursor<S: Serializer>(cursor: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(cursor_to_index(*cursor))
}
