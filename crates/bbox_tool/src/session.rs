//! Session file: the image rotation, attached fields and widget options.

use anyhow::{Context, Result};
use bbox_core::WidgetOptions;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    /// Images visited in order by skip; wraps around.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(flatten)]
    pub widget: WidgetOptions,
}

/// A text field attached to every selected box.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default = "empty_text")]
    pub default: Value,
}

fn empty_text() -> Value {
    Value::String(String::new())
}

impl Session {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read session {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid session {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut session: Session = toml::from_str(raw)?;
        if session.widget.image.is_empty()
            && let Some(first) = session.images.first()
        {
            session.widget.image = first.clone();
        }
        Ok(session)
    }
}

/// Image following `current` in `images`, starting over after the last one.
pub fn next_image<'a>(current: &str, images: &'a [String]) -> Option<&'a str> {
    if images.is_empty() {
        return None;
    }
    let next = match images.iter().position(|i| i == current) {
        Some(index) => (index + 1) % images.len(),
        None => 0,
    };
    Some(images[next].as_str())
}
