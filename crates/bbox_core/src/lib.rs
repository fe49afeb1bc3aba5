//! Annotation state for a bounding-box labelling surface.
//!
//! [`AnnotationStateManager`] holds the boxes drawn on one image, the
//! selected box, the extra fields bound to surface controls and the resolved
//! image. A rendering surface feeds it [`SurfaceMessage`]s and redraws from
//! the [`StateChange`]s it publishes.

pub mod bbox;
pub mod control;
pub mod error;
pub mod export;
pub mod image_source;
pub mod manager;
pub mod options;
pub mod sync;

pub use bbox::{AnnotationSet, BBox};
pub use control::{FieldControl, SharedControl, ValueControl};
pub use error::{AnnotatorError, Result};
pub use export::export_csv;
pub use image_source::{ImageSource, ResolvedImage, resolve_image};
pub use manager::{AnnotationStateManager, AttachedField, SubscriptionId};
pub use options::{DEFAULT_COLORS, WidgetOptions};
pub use sync::{NO_SELECTION, StateChange, SurfaceMessage, WidgetState};
