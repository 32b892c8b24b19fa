//! A [`CarHost`] that keeps rendered [`HostScreen`]s in memory.
//!
//! Drives the simulated head unit and the tests: every stack operation is
//! reported to an observer, and a cloneable [`HostView`] lets other threads
//! read what the car is showing.

use crate::error::RenderError;
use crate::host::CarHost;
use crate::render::{self, HostScreen};
use crate::template::TemplateConfig;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "template", rename_all = "camelCase")]
pub enum HostOp {
    SetRoot(HostScreen),
    Push(HostScreen),
    Pop,
    ReplaceTop(HostScreen),
    Finish,
}

impl HostOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetRoot(_) => "setRoot",
            Self::Push(_) => "push",
            Self::Pop => "pop",
            Self::ReplaceTop(_) => "replaceTop",
            Self::Finish => "finish",
        }
    }

    pub fn screen(&self) -> Option<&HostScreen> {
        match self {
            Self::SetRoot(screen) | Self::Push(screen) | Self::ReplaceTop(screen) => Some(screen),
            Self::Pop | Self::Finish => None,
        }
    }
}

type Observer = Box<dyn FnMut(&HostOp) + Send>;

pub struct ModelHost {
    screens: Arc<Mutex<Vec<HostScreen>>>,
    observer: Observer,
}

/// Read-only handle on a [`ModelHost`]'s screen stack.
#[derive(Clone, Default)]
pub struct HostView {
    screens: Arc<Mutex<Vec<HostScreen>>>,
}

impl ModelHost {
    pub fn new(observer: impl FnMut(&HostOp) + Send + 'static) -> (Self, HostView) {
        let screens = Arc::new(Mutex::new(Vec::new()));
        let host = Self {
            screens: screens.clone(),
            observer: Box::new(observer),
        };
        (host, HostView { screens })
    }

    /// Host whose operations are appended to the returned log.
    pub fn recording() -> (Self, HostView, Arc<Mutex<Vec<HostOp>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let (host, view) = Self::new(move |op| sink.lock().push(op.clone()));
        (host, view, log)
    }

    fn apply(&mut self, op: HostOp) {
        {
            let mut screens = self.screens.lock();
            match &op {
                HostOp::SetRoot(screen) => {
                    screens.clear();
                    screens.push(screen.clone());
                }
                HostOp::Push(screen) => screens.push(screen.clone()),
                HostOp::Pop => {
                    if screens.len() > 1 {
                        screens.pop();
                    }
                }
                HostOp::ReplaceTop(screen) => match screens.last_mut() {
                    Some(top) => *top = screen.clone(),
                    None => screens.push(screen.clone()),
                },
                HostOp::Finish => {}
            }
        }
        (self.observer)(&op);
    }
}

impl CarHost for ModelHost {
    type Template = HostScreen;

    fn render(
        &mut self,
        screen: &str,
        template: &TemplateConfig,
        params: &Value,
    ) -> Result<HostScreen, RenderError> {
        render::render_template(screen, template, params)
    }

    fn placeholder(&mut self, message: &str) -> HostScreen {
        render::placeholder(message)
    }

    fn set_root(&mut self, template: HostScreen) {
        self.apply(HostOp::SetRoot(template));
    }

    fn push(&mut self, template: HostScreen) {
        self.apply(HostOp::Push(template));
    }

    fn pop(&mut self) {
        self.apply(HostOp::Pop);
    }

    fn replace_top(&mut self, template: HostScreen) {
        self.apply(HostOp::ReplaceTop(template));
    }

    fn finish(&mut self) {
        self.apply(HostOp::Finish);
    }
}

impl HostView {
    pub fn top(&self) -> Option<HostScreen> {
        self.screens.lock().last().cloned()
    }

    pub fn depth(&self) -> usize {
        self.screens.lock().len()
    }

    pub fn screens(&self) -> Vec<HostScreen> {
        self.screens.lock().clone()
    }

    /// Interaction payload for tapping `element_id` on the visible screen.
    pub fn tap(&self, element_id: &str) -> Option<Map<String, Value>> {
        self.screens.lock().last()?.interaction(element_id)
    }
}
