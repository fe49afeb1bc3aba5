use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Capability a surface's input control exposes so it can be attached to a
/// box field.
pub trait FieldControl {
    /// Human readable description; doubles as the field name when none is
    /// given at attach time.
    fn label(&self) -> String;

    fn value(&self) -> Value;

    fn set_value(&mut self, value: Value);

    fn set_disabled(&mut self, disabled: bool);
}

/// Controls stay owned by the surface; the manager keeps a shared handle.
pub type SharedControl = Rc<RefCell<dyn FieldControl>>;

/// In-memory control holding a single value.
///
/// Headless surfaces use it directly, others can use it as a mirror of a
/// real widget.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueControl {
    label: String,
    value: Value,
    disabled: bool,
}

impl ValueControl {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            disabled: false,
        }
    }

    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl FieldControl for ValueControl {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn value(&self) -> Value {
        self.value.clone()
    }

    fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }
}
