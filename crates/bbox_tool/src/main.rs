//! Headless annotation surface.
//!
//! Reads surface messages as JSON lines on stdin and prints every state
//! change as a JSON line on stdout. Skip moves to the next image of the
//! session, submit writes the boxes of the current image to a CSV file.

mod session;

use anyhow::{Context, Result};
use bbox_core::{
    AnnotationSet, AnnotationStateManager, BBox, StateChange, SurfaceMessage, ValueControl,
    export_csv,
};
use serde_json::Value;
use session::{Session, next_image};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

const DEFAULT_CSV: &str = "bboxes.csv";

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    if let Err(e) = run() {
        eprintln!("bbox-tool stopped: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let session_path = args
        .next()
        .context("usage: bbox-tool <session.toml> [bboxes.csv]")?;
    let csv_path = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_CSV.to_string()));
    let session = Session::load(&session_path)?;

    let mut tool = Tool::new(session, csv_path);
    let stdin = io::stdin();
    let stdout = io::stdout();
    tool.serve(stdin.lock(), stdout.lock())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Submit,
    Skip,
}

struct Tool {
    manager: AnnotationStateManager,
    images: Vec<String>,
    // Callbacks only queue work; it runs once the manager call has returned.
    actions: Rc<RefCell<VecDeque<Action>>>,
    outbox: Rc<RefCell<Vec<StateChange>>>,
    collected: Vec<BBox>,
    csv_path: PathBuf,
}

impl Tool {
    fn new(session: Session, csv_path: PathBuf) -> Self {
        let mut manager = AnnotationStateManager::new(session.widget);
        for field in session.fields {
            let control = ValueControl::new(field.name.as_str(), field.default).shared();
            manager.attach(control, None, None);
        }

        let actions: Rc<RefCell<VecDeque<Action>>> = Rc::default();
        let queue = actions.clone();
        manager.on_submit(move || queue.borrow_mut().push_back(Action::Submit));
        let queue = actions.clone();
        manager.on_skip(move || queue.borrow_mut().push_back(Action::Skip));

        let outbox: Rc<RefCell<Vec<StateChange>>> = Rc::default();
        let sink = outbox.clone();
        manager.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        Self {
            manager,
            images: session.images,
            actions,
            outbox,
            collected: Vec::new(),
            csv_path,
        }
    }

    fn serve<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        serde_json::to_writer(&mut output, &self.manager.state())?;
        writeln!(output)?;
        output.flush()?;

        for line in input.lines() {
            let line = line.context("cannot read stdin")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(e) = self.handle_line(line) {
                tracing::warn!("message ignored: {e:#}");
            }
            self.flush(&mut output)?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        let message: SurfaceMessage =
            serde_json::from_str(line).with_context(|| format!("bad message {line}"))?;
        self.manager.handle_message(message)?;
        self.run_actions()
    }

    fn run_actions(&mut self) -> Result<()> {
        loop {
            let action = self.actions.borrow_mut().pop_front();
            match action {
                Some(Action::Skip) => self.next_image(),
                Some(Action::Submit) => self.save()?,
                None => return Ok(()),
            }
        }
    }

    fn next_image(&mut self) {
        let current = self.manager.image().to_string();
        if let Some(next) = next_image(&current, &self.images) {
            self.manager.set_image(next);
        }
        self.manager.select(None);
        self.manager.set_boxes(AnnotationSet::default());
    }

    fn save(&mut self) -> Result<()> {
        let image = self.manager.image().to_string();
        let submitted = self.manager.bboxes().len();
        // A resubmit replaces the rows saved earlier for the same image.
        let stamp = Value::from(image.as_str());
        self.collected.retain(|b| b.get("image") != Some(&stamp));
        self.collected.extend(
            self.manager
                .bboxes()
                .iter()
                .map(|b| b.clone().with_field("image", image.as_str())),
        );
        export_csv(&self.collected, &self.csv_path)
            .with_context(|| format!("cannot write {}", self.csv_path.display()))?;
        tracing::info!(
            "saved {submitted} boxes for {image} ({} total) to {}",
            self.collected.len(),
            self.csv_path.display()
        );
        Ok(())
    }

    fn flush<W: Write>(&mut self, output: &mut W) -> Result<()> {
        let changes: Vec<StateChange> = self.outbox.borrow_mut().drain(..).collect();
        for change in changes {
            serde_json::to_writer(&mut *output, &change)?;
            writeln!(output)?;
        }
        output.flush()?;
        Ok(())
    }
}
