//! Application-side half of element correlation.
//!
//! Handlers cannot cross into the session, so every interactive slot of a
//! template is given a position-derived id before registration and the
//! handler is parked here under `(screen, id)`. A host tap carrying that id is
//! routed back through [`CallbackCorrelator::resolve`].

use crate::template::{Action, PressHandler, Row, ScreenConfig, TemplateConfig};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;

pub type CallbackMap = IndexMap<String, PressHandler>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSlot {
    Item(usize),
    ListItem { list: usize, item: usize },
    HeaderAction,
    ActionStrip(usize),
    Row(usize),
    Action(usize),
}

impl ElementSlot {
    pub fn element_id(self, screen: &str) -> String {
        match self {
            Self::Item(index) => format!("{screen}_item_{index}"),
            Self::ListItem { list, item } => format!("{screen}_list_{list}_item_{item}"),
            Self::HeaderAction => format!("{screen}_headerAction"),
            Self::ActionStrip(index) => format!("{screen}_actionStrip_{index}"),
            Self::Row(index) => format!("{screen}_row_{index}"),
            Self::Action(index) => format!("{screen}_action_{index}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct CallbackCorrelator {
    store: Mutex<HashMap<String, CallbackMap>>,
}

impl CallbackCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wire-safe copy of `config` and the handlers lifted out of it.
    ///
    /// Slots are visited as items, item lists, rows, actions, header action,
    /// action strip; array slots in declaration order. Every slot gets its id,
    /// only slots with a handler contribute to the map.
    pub fn prepare(config: &ScreenConfig) -> (ScreenConfig, CallbackMap) {
        let mut stripped = config.clone();
        let mut callbacks = CallbackMap::new();
        let screen = config.name.as_str();

        match &mut stripped.template {
            TemplateConfig::ListTemplate(list) => {
                for (index, row) in list.items.iter_mut().enumerate() {
                    tag_row(screen, ElementSlot::Item(index), row, &mut callbacks);
                }
                for (list_index, item_list) in list.item_lists.iter_mut().enumerate() {
                    for (item_index, row) in item_list.items.iter_mut().enumerate() {
                        let slot = ElementSlot::ListItem {
                            list: list_index,
                            item: item_index,
                        };
                        tag_row(screen, slot, row, &mut callbacks);
                    }
                }
                tag_chrome(screen, &mut list.header_action, &mut list.action_strip, &mut callbacks);
            }
            TemplateConfig::MessageTemplate(message) => {
                tag_chrome(
                    screen,
                    &mut message.header_action,
                    &mut message.action_strip,
                    &mut callbacks,
                );
            }
            TemplateConfig::PaneTemplate(pane) => {
                for (index, row) in pane.rows.iter_mut().enumerate() {
                    tag_row(screen, ElementSlot::Row(index), row, &mut callbacks);
                }
                for (index, action) in pane.actions.iter_mut().enumerate() {
                    tag_action(screen, ElementSlot::Action(index), action, &mut callbacks);
                }
                tag_chrome(screen, &mut pane.header_action, &mut pane.action_strip, &mut callbacks);
            }
        }

        (stripped, callbacks)
    }

    /// Replaces every handler previously stored for `screen`.
    pub fn store(&self, screen: &str, callbacks: CallbackMap) {
        self.store.lock().insert(screen.to_string(), callbacks);
    }

    pub fn resolve(&self, screen: &str, element_id: &str) -> Option<PressHandler> {
        self.store
            .lock()
            .get(screen)
            .and_then(|callbacks| callbacks.get(element_id))
            .cloned()
    }

    pub fn available_ids(&self, screen: &str) -> Option<Vec<String>> {
        self.store
            .lock()
            .get(screen)
            .map(|callbacks| callbacks.keys().cloned().collect())
    }

    pub fn screens(&self) -> Vec<String> {
        let mut screens: Vec<String> = self.store.lock().keys().cloned().collect();
        screens.sort();
        screens
    }
}

fn tag_chrome(
    screen: &str,
    header_action: &mut Option<Action>,
    action_strip: &mut [Action],
    callbacks: &mut CallbackMap,
) {
    if let Some(action) = header_action {
        tag_action(screen, ElementSlot::HeaderAction, action, callbacks);
    }
    for (index, action) in action_strip.iter_mut().enumerate() {
        tag_action(screen, ElementSlot::ActionStrip(index), action, callbacks);
    }
}

fn tag_row(screen: &str, slot: ElementSlot, row: &mut Row, callbacks: &mut CallbackMap) {
    let id = slot.element_id(screen);
    if let Some(handler) = row.on_press.take() {
        callbacks.insert(id.clone(), handler);
    }
    row.id = Some(id);
}

fn tag_action(screen: &str, slot: ElementSlot, action: &mut Action, callbacks: &mut CallbackMap) {
    let id = slot.element_id(screen);
    if let Some(handler) = action.on_press.take() {
        callbacks.insert(id.clone(), handler);
    }
    action.id = Some(id);
}
