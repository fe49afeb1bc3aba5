use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A single bounding-box annotation.
///
/// Boxes are flat records of named scalar fields. The geometry fields
/// (`x`, `y`, `width`, `height`) and `label` have typed accessors, every
/// other field comes from an attached control. Nothing is validated: a box
/// missing its geometry is carried through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BBox(Map<String, Value>);

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut fields = Map::new();
        fields.insert("x".into(), Value::from(x));
        fields.insert("y".into(), Value::from(y));
        fields.insert("width".into(), Value::from(width));
        fields.insert("height".into(), Value::from(height));
        Self(fields)
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        self.with_field("label", label.into())
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn x(&self) -> Option<f64> {
        self.number("x")
    }

    pub fn y(&self) -> Option<f64> {
        self.number("y")
    }

    pub fn width(&self) -> Option<f64> {
        self.number("width")
    }

    pub fn height(&self) -> Option<f64> {
        self.number("height")
    }

    pub fn label(&self) -> Option<&str> {
        self.0.get("label").and_then(Value::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// True when `name` is present with a non-null value.
    pub fn has_field(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn number(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }
}

impl From<Map<String, Value>> for BBox {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Immutable snapshot of the ordered box list.
///
/// Every edit builds a new snapshot; boxes that did not change are shared
/// with the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSet(Arc<[Arc<BBox>]>);

impl AnnotationSet {
    pub fn new(boxes: impl IntoIterator<Item = BBox>) -> Self {
        Self(boxes.into_iter().map(Arc::new).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BBox> {
        self.0.get(index).map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BBox> {
        self.0.iter().map(Arc::as_ref)
    }

    /// Returns a copy of this set where box `index` has `name` set to `value`.
    ///
    /// `None` when `index` is out of range.
    pub fn with_property(&self, index: usize, name: &str, value: Value) -> Option<Self> {
        let current = self.0.get(index)?;
        let mut edited = BBox::clone(current);
        edited.insert(name, value);
        let mut boxes: Vec<Arc<BBox>> = self.0.to_vec();
        boxes[index] = Arc::new(edited);
        Some(Self(boxes.into()))
    }

    /// True when both snapshots hold the very same allocation for box `index`.
    pub fn shares_box(&self, other: &AnnotationSet, index: usize) -> bool {
        match (self.0.get(index), other.0.get(index)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Vec<BBox>> for AnnotationSet {
    fn from(boxes: Vec<BBox>) -> Self {
        Self::new(boxes)
    }
}

impl FromIterator<BBox> for AnnotationSet {
    fn from_iter<I: IntoIterator<Item = BBox>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl Serialize for AnnotationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for AnnotationSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<BBox>::deserialize(deserializer).map(Self::from)
    }
}
