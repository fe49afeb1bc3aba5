use crate::bbox::AnnotationSet;
use crate::control::SharedControl;
use crate::error::{AnnotatorError, Result};
use crate::image_source::{ImageSource, ResolvedImage, resolve_image};
use crate::options::WidgetOptions;
use crate::sync::{StateChange, SurfaceMessage, WidgetState, cursor_from_index};
use serde_json::Value;
use std::fmt;

type Callback = Box<dyn FnMut()>;
type Listener = Box<dyn FnMut(&StateChange)>;

/// Handle returned by [`AnnotationStateManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A box field bound to an external control.
pub struct AttachedField {
    name: String,
    control: SharedControl,
    default_value: Value,
}

impl AttachedField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }
}

impl fmt::Debug for AttachedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedField")
            .field("name", &self.name)
            .field("default_value", &self.default_value)
            .finish_non_exhaustive()
    }
}

/// Single source of truth for the boxes, the selection, the attached fields
/// and the image of one annotation surface.
///
/// All operations are synchronous. Subscribers are called inside the
/// operation that produced the change, once per change, so a single
/// [`select`](Self::select) can notify several times. Listeners and
/// callbacks must not call back into the manager; queue work and apply it
/// once the call has returned.
pub struct AnnotationStateManager {
    image: ImageSource,
    resolved: ResolvedImage,
    classes: Vec<String>,
    colors: Vec<String>,
    label: String,
    view_only: bool,
    hide_buttons: bool,
    bboxes: AnnotationSet,
    selected: Option<usize>,
    fields: Vec<AttachedField>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    submit_callback: Option<Callback>,
    skip_callback: Option<Callback>,
}

impl AnnotationStateManager {
    pub fn new(options: WidgetOptions) -> Self {
        let image = ImageSource::from(options.image);
        let resolved = resolve_image(&image);
        Self {
            image,
            resolved,
            classes: options.classes,
            colors: options.colors,
            label: options.label,
            view_only: options.view_only,
            hide_buttons: options.hide_buttons,
            bboxes: options.bboxes,
            selected: None,
            fields: Vec::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            submit_callback: None,
            skip_callback: None,
        }
    }

    // ─── Image ───────────────────────────────────────────────────────────

    /// Replace the image and resolve it for display.
    ///
    /// A source that cannot be read as a local file is shown verbatim; this
    /// never fails.
    pub fn set_image(&mut self, source: impl Into<ImageSource>) {
        let source = source.into();
        self.resolved = resolve_image(&source);
        self.image = source;
        tracing::debug!(
            "image set to {} (data uri: {})",
            self.image,
            self.resolved.is_data_uri()
        );
        self.publish(StateChange::Image(self.image.to_string()));
        self.publish(StateChange::ImageData(self.resolved.display.clone()));
    }

    pub fn image(&self) -> &ImageSource {
        &self.image
    }

    /// Data URI or literal location the surface should display.
    pub fn resolved_image(&self) -> &str {
        &self.resolved.display
    }

    pub fn image_bytes(&self) -> Option<&[u8]> {
        self.resolved.bytes.as_deref()
    }

    // ─── Boxes and selection ─────────────────────────────────────────────

    pub fn bboxes(&self) -> &AnnotationSet {
        &self.bboxes
    }

    /// Replace every box at once. The selection is left untouched.
    pub fn set_boxes(&mut self, boxes: impl Into<AnnotationSet>) {
        self.bboxes = boxes.into();
        self.publish(StateChange::Bboxes(self.bboxes.clone()));
    }

    /// Set one field of one box by publishing a new snapshot.
    pub fn set_box_property(
        &mut self,
        index: usize,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let next = self
            .bboxes
            .with_property(index, name, value.into())
            .ok_or_else(|| AnnotatorError::BoxIndexOutOfRange {
                index,
                len: self.bboxes.len(),
            })?;
        self.set_boxes(next);
        Ok(())
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// Move the selection cursor and sync every attached control with it.
    ///
    /// Out-of-range indices clear the selection. Selecting a box that lacks
    /// an attached field writes the field's default into it first.
    pub fn select(&mut self, index: Option<usize>) {
        let cursor = index.filter(|&i| i < self.bboxes.len());
        if cursor != index {
            tracing::debug!("selection {index:?} out of range, clearing");
        }
        self.selected = cursor;
        self.publish(StateChange::SelectedIndex(cursor));
        self.sync_controls();
    }

    /// [`select`](Self::select) with a wire index, where `-1` means none.
    pub fn select_index(&mut self, index: i64) {
        self.select(cursor_from_index(index, self.bboxes.len()));
    }

    // ─── Attached fields ─────────────────────────────────────────────────

    /// Bind `control` to the box field `name`.
    ///
    /// `name` defaults to the control's label, `default_value` to its
    /// current value. Attaching a name twice replaces the earlier binding.
    /// Returns the field name in use.
    pub fn attach(
        &mut self,
        control: SharedControl,
        name: Option<&str>,
        default_value: Option<Value>,
    ) -> String {
        let (name, default_value) = {
            let c = control.borrow();
            (
                name.map_or_else(|| c.label(), str::to_owned),
                default_value.unwrap_or_else(|| c.value()),
            )
        };
        let field = AttachedField {
            name: name.clone(),
            control,
            default_value,
        };
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => {
                tracing::warn!("field {name} attached again, replacing previous control");
                *existing = field;
            }
            None => self.fields.push(field),
        }
        self.sync_controls();
        name
    }

    pub fn attached_fields(&self) -> &[AttachedField] {
        &self.fields
    }

    /// An attached control changed its value.
    ///
    /// Writes `value` into the selected box and mirrors it on the bound
    /// control; does nothing without a selection. The caller must not hold
    /// a borrow of that control.
    pub fn control_changed(&mut self, name: &str, value: Value) -> Result<()> {
        let Some(index) = self.selected else {
            return Ok(());
        };
        let Some(control) = self
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.control.clone())
        else {
            tracing::warn!("change for unattached field {name} ignored");
            return Ok(());
        };
        self.set_box_property(index, name, value.clone())?;
        control.borrow_mut().set_value(value);
        Ok(())
    }

    fn sync_controls(&mut self) {
        let bindings: Vec<(String, SharedControl, Value)> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.control.clone(), f.default_value.clone()))
            .collect();
        for (name, control, default_value) in bindings {
            match self.selected {
                None => {
                    let mut control = control.borrow_mut();
                    control.set_value(default_value);
                    control.set_disabled(true);
                }
                Some(index) => {
                    control.borrow_mut().set_disabled(false);
                    let current = self
                        .bboxes
                        .get(index)
                        .filter(|b| b.has_field(&name))
                        .and_then(|b| b.get(&name))
                        .cloned();
                    let value = match current {
                        Some(value) => value,
                        None => {
                            if let Err(e) =
                                self.set_box_property(index, &name, default_value.clone())
                            {
                                tracing::warn!("cannot fill default for {name}: {e}");
                            }
                            default_value
                        }
                    };
                    control.borrow_mut().set_value(value);
                }
            }
        }
    }

    // ─── Submit / skip ───────────────────────────────────────────────────

    /// Register the submit callback, replacing any previous one.
    pub fn on_submit(&mut self, callback: impl FnMut() + 'static) {
        self.submit_callback = Some(Box::new(callback));
    }

    /// Register the skip callback, replacing any previous one.
    pub fn on_skip(&mut self, callback: impl FnMut() + 'static) {
        self.skip_callback = Some(Box::new(callback));
    }

    pub fn submit(&mut self) {
        tracing::debug!("submit pressed");
        if let Some(callback) = self.submit_callback.as_mut() {
            callback();
        }
    }

    pub fn skip(&mut self) {
        tracing::debug!("skip pressed");
        if let Some(callback) = self.skip_callback.as_mut() {
            callback();
        }
    }

    // ─── Display state ───────────────────────────────────────────────────

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn set_classes(&mut self, classes: Vec<String>) {
        self.classes = classes;
        self.publish(StateChange::Classes(self.classes.clone()));
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn set_colors(&mut self, colors: Vec<String>) {
        self.colors = colors;
        self.publish(StateChange::Colors(self.colors.clone()));
    }

    /// Palette color for `class`; colors repeat when there are more classes.
    pub fn color_for_class(&self, class: &str) -> Option<&str> {
        if self.colors.is_empty() {
            return None;
        }
        let position = self.classes.iter().position(|c| c == class)?;
        Some(self.colors[position % self.colors.len()].as_str())
    }

    /// Class given to newly drawn boxes.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
        self.publish(StateChange::Label(self.label.clone()));
    }

    pub fn view_only(&self) -> bool {
        self.view_only
    }

    pub fn set_view_only(&mut self, view_only: bool) {
        self.view_only = view_only;
        self.publish(StateChange::ViewOnly(view_only));
    }

    pub fn hide_buttons(&self) -> bool {
        self.hide_buttons
    }

    pub fn set_hide_buttons(&mut self, hide_buttons: bool) {
        self.hide_buttons = hide_buttons;
        self.publish(StateChange::HideButtons(hide_buttons));
    }

    // ─── Surface plumbing ────────────────────────────────────────────────

    pub fn subscribe(&mut self, listener: impl FnMut(&StateChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Snapshot of everything a surface renders.
    pub fn state(&self) -> WidgetState {
        WidgetState {
            image: self.image.to_string(),
            image_data: self.resolved.display.clone(),
            classes: self.classes.clone(),
            label: self.label.clone(),
            colors: self.colors.clone(),
            bboxes: self.bboxes.clone(),
            selected_index: self.selected,
            view_only: self.view_only,
            hide_buttons: self.hide_buttons,
        }
    }

    /// Route a surface signal to the matching operation.
    pub fn handle_message(&mut self, message: SurfaceMessage) -> Result<()> {
        match message {
            SurfaceMessage::Submit => self.submit(),
            SurfaceMessage::Skip => self.skip(),
            SurfaceMessage::Select { index } => self.select_index(index),
            SurfaceMessage::Control { name, value } => self.control_changed(&name, value)?,
            SurfaceMessage::SetBboxes { bboxes } => self.set_boxes(bboxes),
            SurfaceMessage::SetLabel { label } => self.set_label(label),
        }
        Ok(())
    }

    fn publish(&mut self, change: StateChange) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change);
        }
    }
}

impl Default for AnnotationStateManager {
    fn default() -> Self {
        Self::new(WidgetOptions::default())
    }
}

impl fmt::Debug for AnnotationStateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationStateManager")
            .field("image", &self.image)
            .field("bboxes", &self.bboxes)
            .field("selected", &self.selected)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::control::{FieldControl, ValueControl};
    use rstest::{fixture, rstest};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type Events = Rc<RefCell<Vec<StateChange>>>;

    fn record(manager: &mut AnnotationStateManager) -> Events {
        let events: Events = Rc::default();
        let sink = events.clone();
        manager.subscribe(move |change| sink.borrow_mut().push(change.clone()));
        events
    }

    fn box_events(events: &Events) -> Vec<AnnotationSet> {
        events
            .borrow()
            .iter()
            .filter_map(|c| match c {
                StateChange::Bboxes(set) => Some(set.clone()),
                _ => None,
            })
            .collect()
    }

    #[fixture]
    fn fruit() -> AnnotationStateManager {
        let mut options = WidgetOptions::new("fruit.jpg", ["apple", "orange", "pear"]);
        options.bboxes = AnnotationSet::new([
            BBox::new(0.0, 0.0, 10.0, 10.0).with_label("apple"),
            BBox::new(20.0, 20.0, 5.0, 5.0).with_label("pear"),
        ]);
        AnnotationStateManager::new(options)
    }

    #[rstest]
    fn starts_with_nothing_selected(fruit: AnnotationStateManager) {
        assert_eq!(fruit.selected_index(), None);
        assert_eq!(fruit.bboxes().len(), 2);
        assert_eq!(fruit.resolved_image(), "fruit.jpg");
    }

    #[rstest]
    fn select_materializes_missing_field(mut fruit: AnnotationStateManager) {
        let size = ValueControl::new("size", "L").shared();
        fruit.attach(size.clone(), None, Some(json!("M")));

        fruit.select(Some(1));

        let b = fruit.bboxes().get(1).expect("box 1");
        assert_eq!(b.get("size"), Some(&json!("M")));
        assert_eq!(size.borrow().value(), json!("M"));
        assert!(!size.borrow().is_disabled());
    }

    #[rstest]
    fn select_shows_existing_value(mut fruit: AnnotationStateManager) {
        fruit.set_box_property(0, "size", "S").expect("box 0 exists");
        let size = ValueControl::new("size", "M").shared();
        fruit.attach(size.clone(), None, None);

        let events = record(&mut fruit);
        fruit.select(Some(0));

        assert_eq!(size.borrow().value(), json!("S"));
        assert!(box_events(&events).is_empty());
    }

    #[rstest]
    fn select_replaces_null_field_with_default(mut fruit: AnnotationStateManager) {
        fruit.set_box_property(0, "size", Value::Null).expect("box 0 exists");
        let size = ValueControl::new("size", "M").shared();
        fruit.attach(size.clone(), None, None);

        fruit.select(Some(0));

        assert_eq!(fruit.bboxes().get(0).and_then(|b| b.get("size")), Some(&json!("M")));
        assert_eq!(size.borrow().value(), json!("M"));
    }

    #[rstest]
    fn deselect_disables_and_resets_controls(mut fruit: AnnotationStateManager) {
        let note = ValueControl::new("note", "").shared();
        let size = ValueControl::new("size", "M").shared();
        fruit.attach(note.clone(), None, None);
        fruit.attach(size.clone(), None, None);
        fruit.select(Some(0));
        fruit.control_changed("note", json!("bruised")).expect("selected");
        assert_eq!(note.borrow().value(), json!("bruised"));

        fruit.select_index(-1);

        assert_eq!(fruit.selected_index(), None);
        for (control, default) in [(&note, json!("")), (&size, json!("M"))] {
            assert!(control.borrow().is_disabled());
            assert_eq!(control.borrow().value(), default);
        }
        assert_eq!(
            fruit.bboxes().get(0).and_then(|b| b.get("note")),
            Some(&json!("bruised"))
        );
    }

    #[rstest]
    #[case(Some(2))]
    #[case(Some(99))]
    #[case(None)]
    fn invalid_selection_clears_cursor(mut fruit: AnnotationStateManager, #[case] index: Option<usize>) {
        fruit.select(Some(0));
        fruit.select(index);
        assert_eq!(fruit.selected_index(), None);
    }

    #[test]
    fn selecting_in_empty_set_is_none() {
        let mut manager = AnnotationStateManager::default();
        manager.select(Some(0));
        assert_eq!(manager.selected_index(), None);
    }

    #[rstest]
    fn set_box_property_publishes_new_snapshot(mut fruit: AnnotationStateManager) {
        let before = fruit.bboxes().clone();
        let events = record(&mut fruit);

        fruit.set_box_property(0, "label", "cat").expect("box 0 exists");

        let after = fruit.bboxes();
        assert_eq!(after.get(0).and_then(BBox::label), Some("cat"));
        assert_eq!(after.get(0).and_then(BBox::width), Some(10.0));
        assert!(after.shares_box(&before, 1));
        assert_eq!(before.get(0).and_then(BBox::label), Some("apple"));
        assert_eq!(box_events(&events), vec![after.clone()]);
    }

    #[rstest]
    fn set_box_property_out_of_range_errors(mut fruit: AnnotationStateManager) {
        let events = record(&mut fruit);
        let err = fruit.set_box_property(5, "label", "cat").unwrap_err();
        assert!(matches!(
            err,
            AnnotatorError::BoxIndexOutOfRange { index: 5, len: 2 }
        ));
        assert!(events.borrow().is_empty());
    }

    #[rstest]
    fn control_change_without_selection_is_ignored(mut fruit: AnnotationStateManager) {
        let note = ValueControl::new("note", "").shared();
        fruit.attach(note, None, None);
        let before = fruit.bboxes().clone();

        fruit.control_changed("note", json!("x")).expect("no-op");

        assert_eq!(fruit.bboxes(), &before);
    }

    #[rstest]
    fn control_change_writes_selected_box(mut fruit: AnnotationStateManager) {
        let note = ValueControl::new("note", "").shared();
        fruit.attach(note, None, None);
        fruit.select(Some(1));

        fruit.control_changed("note", json!("ripe")).expect("selected");

        assert_eq!(
            fruit.bboxes().get(1).and_then(|b| b.get("note")),
            Some(&json!("ripe"))
        );
        assert_eq!(fruit.bboxes().get(0).and_then(|b| b.get("note")), None);
    }

    #[rstest]
    fn attach_syncs_with_current_selection(mut fruit: AnnotationStateManager) {
        fruit.select(Some(0));
        let occluded = ValueControl::new("occluded", false).shared();

        let name = fruit.attach(occluded.clone(), None, None);

        assert_eq!(name, "occluded");
        assert!(!occluded.borrow().is_disabled());
        assert_eq!(
            fruit.bboxes().get(0).and_then(|b| b.get("occluded")),
            Some(&json!(false))
        );
    }

    #[rstest]
    fn attach_without_selection_disables(mut fruit: AnnotationStateManager) {
        let note = ValueControl::new("Note", "hello").shared();
        fruit.attach(note.clone(), Some("note"), Some(json!("")));

        assert!(note.borrow().is_disabled());
        assert_eq!(note.borrow().value(), json!(""));
        assert_eq!(fruit.attached_fields()[0].name(), "note");
    }

    #[rstest]
    fn attaching_same_name_replaces_binding(mut fruit: AnnotationStateManager) {
        let first = ValueControl::new("size", "M").shared();
        let second = ValueControl::new("size", "XL").shared();
        fruit.attach(first.clone(), None, None);
        fruit.attach(second.clone(), None, None);
        fruit.select(Some(0));

        assert_eq!(fruit.attached_fields().len(), 1);
        assert_eq!(fruit.attached_fields()[0].default_value(), &json!("XL"));
        assert_eq!(second.borrow().value(), json!("XL"));
        assert!(first.borrow().is_disabled());
    }

    #[rstest]
    fn boxes_replacement_keeps_cursor(mut fruit: AnnotationStateManager) {
        fruit.select(Some(1));
        fruit.set_boxes(vec![BBox::new(1.0, 1.0, 1.0, 1.0)]);
        assert_eq!(fruit.selected_index(), Some(1));
    }

    #[rstest]
    fn skip_and_submit_call_their_callbacks(mut fruit: AnnotationStateManager) {
        let skips = Rc::new(Cell::new(0));
        let submits = Rc::new(Cell::new(0));
        let (s, t) = (skips.clone(), submits.clone());
        fruit.on_skip(move || s.set(s.get() + 1));
        fruit.on_submit(move || t.set(t.get() + 1));

        fruit.skip();

        assert_eq!(skips.get(), 1);
        assert_eq!(submits.get(), 0);
    }

    #[rstest]
    fn later_callback_replaces_earlier(mut fruit: AnnotationStateManager) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (calls.clone(), calls.clone());
        fruit.on_submit(move || a.borrow_mut().push("first"));
        fruit.on_submit(move || b.borrow_mut().push("second"));

        fruit.submit();

        assert_eq!(*calls.borrow(), vec!["second"]);
    }

    #[test]
    fn signals_without_callbacks_do_nothing() {
        let mut manager = AnnotationStateManager::default();
        manager.submit();
        manager.skip();
    }

    #[rstest]
    fn color_cycles_through_palette(mut fruit: AnnotationStateManager) {
        fruit.set_colors(vec!["#111111".into(), "#222222".into()]);
        assert_eq!(fruit.color_for_class("apple"), Some("#111111"));
        assert_eq!(fruit.color_for_class("orange"), Some("#222222"));
        assert_eq!(fruit.color_for_class("pear"), Some("#111111"));
        assert_eq!(fruit.color_for_class("kiwi"), None);
    }

    #[rstest]
    fn unsubscribe_stops_delivery(mut fruit: AnnotationStateManager) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = fruit.subscribe(move |_| c.set(c.get() + 1));
        fruit.set_label("apple");
        assert!(fruit.unsubscribe(id));
        fruit.set_label("pear");

        assert_eq!(count.get(), 1);
        assert!(!fruit.unsubscribe(id));
    }

    #[rstest]
    fn state_reports_wire_values(mut fruit: AnnotationStateManager) -> anyhow::Result<()> {
        fruit.set_hide_buttons(true);
        let state = serde_json::to_value(fruit.state())?;
        assert_eq!(state["selected_index"], json!(-1));
        assert_eq!(state["image_data"], json!("fruit.jpg"));
        assert_eq!(state["hide_buttons"], json!(true));
        assert_eq!(state["colors"][9], json!("#17becf"));
        assert_eq!(state["bboxes"][1]["label"], json!("pear"));
        Ok(())
    }

    #[rstest]
    fn handle_message_routes_signals(mut fruit: AnnotationStateManager) -> anyhow::Result<()> {
        let skips = Rc::new(Cell::new(0));
        let s = skips.clone();
        fruit.on_skip(move || s.set(s.get() + 1));

        fruit.handle_message(serde_json::from_str(r#"{"type": "select", "index": 1}"#)?)?;
        fruit.handle_message(serde_json::from_str(r#"{"type": "set_label", "label": "pear"}"#)?)?;
        fruit.handle_message(serde_json::from_str(r#"{"type": "skip"}"#)?)?;

        assert_eq!(fruit.selected_index(), Some(1));
        assert_eq!(fruit.label(), "pear");
        assert_eq!(skips.get(), 1);
        Ok(())
    }
}
