//! Reference template renderer.
//!
//! Builds a platform-neutral [`HostScreen`] from a [`TemplateConfig`] with the
//! constraints the car template hosts enforce. Hosts that draw natively can
//! ignore this and implement [`crate::CarHost::render`] themselves.

use crate::error::RenderError;
use crate::template::{Action, ListTemplate, MessageTemplate, PaneTemplate, Row, TemplateConfig};
use serde::Serialize;
use serde_json::{Map, Value, json};

pub const PLACEHOLDER_TITLE: &str = "Car Projection";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostScreen {
    pub screen: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
    pub body: HostTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostTemplate {
    #[serde(rename_all = "camelCase")]
    List {
        title: String,
        loading: bool,
        header_action: Option<HostAction>,
        action_strip: Vec<HostAction>,
        sections: Vec<HostSection>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        title: String,
        message: String,
        header_action: Option<HostAction>,
        action_strip: Vec<HostAction>,
    },
    #[serde(rename_all = "camelCase")]
    Pane {
        title: String,
        loading: bool,
        rows: Vec<HostRow>,
        actions: Vec<HostAction>,
        header_action: Option<HostAction>,
        action_strip: Vec<HostAction>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSection {
    pub header: Option<String>,
    pub rows: Vec<HostRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRow {
    pub id: Option<String>,
    pub title: String,
    pub texts: Vec<String>,
    pub clickable: bool,
    #[serde(skip)]
    payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostAction {
    Back,
    AppIcon,
    #[serde(rename_all = "camelCase")]
    Custom {
        id: Option<String>,
        title: String,
        has_icon: bool,
        tinted: bool,
    },
}

pub fn render_template(
    screen: &str,
    template: &TemplateConfig,
    params: &Value,
) -> Result<HostScreen, RenderError> {
    let body = match template {
        TemplateConfig::ListTemplate(list) => render_list(list)?,
        TemplateConfig::MessageTemplate(message) => render_message(message),
        TemplateConfig::PaneTemplate(pane) => render_pane(pane)?,
    };

    Ok(HostScreen {
        screen: Some(screen.to_string()),
        params: params.clone(),
        body,
    })
}

pub fn placeholder(message: &str) -> HostScreen {
    HostScreen {
        screen: None,
        params: Value::Null,
        body: HostTemplate::Message {
            title: PLACEHOLDER_TITLE.to_string(),
            message: message.to_string(),
            header_action: None,
            action_strip: Vec::new(),
        },
    }
}

impl HostScreen {
    pub fn is_placeholder(&self) -> bool {
        self.screen.is_none()
    }

    /// Flat `onUserInteraction` payload for a tap on `element_id`, if that
    /// element is present and clickable on this screen.
    pub fn interaction(&self, element_id: &str) -> Option<Map<String, Value>> {
        let screen = self.screen.as_deref()?;

        if let Some(row) = self.rows().find(|row| row.clickable && row.id.as_deref() == Some(element_id)) {
            let mut event = Map::new();
            event.insert("action".into(), json!("rowPress"));
            event.insert("screen".into(), json!(screen));
            event.extend(row.payload.clone());
            return Some(event);
        }

        self.actions().find_map(|action| match action {
            HostAction::Custom {
                id: Some(id),
                title,
                ..
            } if id == element_id => {
                let mut event = Map::new();
                event.insert("action".into(), json!("actionPress"));
                event.insert("screen".into(), json!(screen));
                event.insert("id".into(), json!(id));
                event.insert("title".into(), json!(title));
                Some(event)
            }
            _ => None,
        })
    }

    fn rows(&self) -> Box<dyn Iterator<Item = &HostRow> + '_> {
        match &self.body {
            HostTemplate::List { sections, .. } => {
                Box::new(sections.iter().flat_map(|section| section.rows.iter()))
            }
            HostTemplate::Pane { rows, .. } => Box::new(rows.iter()),
            HostTemplate::Message { .. } => Box::new(std::iter::empty()),
        }
    }

    fn actions(&self) -> impl Iterator<Item = &HostAction> + '_ {
        let (header_action, action_strip, body_actions) = match &self.body {
            HostTemplate::List {
                header_action,
                action_strip,
                ..
            }
            | HostTemplate::Message {
                header_action,
                action_strip,
                ..
            } => (header_action, action_strip, [].as_slice()),
            HostTemplate::Pane {
                header_action,
                action_strip,
                actions,
                ..
            } => (header_action, action_strip, actions.as_slice()),
        };

        header_action
            .iter()
            .chain(action_strip.iter())
            .chain(body_actions.iter())
    }
}

fn render_list(list: &ListTemplate) -> Result<HostTemplate, RenderError> {
    let mut sections = Vec::new();

    if !list.items.is_empty() {
        sections.push(HostSection {
            header: list.header.clone(),
            rows: list.items.iter().map(|row| render_row(row, true)).collect(),
        });
    }

    for item_list in &list.item_lists {
        sections.push(HostSection {
            header: item_list.header.clone(),
            rows: item_list.items.iter().map(|row| render_row(row, true)).collect(),
        });
    }

    if list.is_loading && sections.iter().any(|section| !section.rows.is_empty()) {
        return Err(RenderError::new(
            "list template cannot carry rows while loading",
        ));
    }

    Ok(HostTemplate::List {
        title: or_default(&list.title, "List"),
        loading: list.is_loading,
        header_action: list.header_action.as_ref().map(render_header_action),
        action_strip: list.action_strip.iter().map(render_action).collect(),
        sections,
    })
}

fn render_message(message: &MessageTemplate) -> HostTemplate {
    HostTemplate::Message {
        title: or_default(&message.title, "Message"),
        message: or_default(&message.message, "Message"),
        header_action: message.header_action.as_ref().map(render_header_action),
        action_strip: message.action_strip.iter().map(render_action).collect(),
    }
}

fn render_pane(pane: &PaneTemplate) -> Result<HostTemplate, RenderError> {
    if !pane.is_loading && pane.rows.is_empty() {
        return Err(RenderError::new(
            "pane template requires at least one row unless loading",
        ));
    }

    Ok(HostTemplate::Pane {
        title: or_default(&pane.title, "Details"),
        loading: pane.is_loading,
        // Pane rows cannot take click listeners on the host.
        rows: pane.rows.iter().map(|row| render_row(row, false)).collect(),
        actions: pane.actions.iter().map(render_action).collect(),
        header_action: pane.header_action.as_ref().map(render_header_action),
        action_strip: pane.action_strip.iter().map(render_action).collect(),
    })
}

fn render_row(row: &Row, allow_click: bool) -> HostRow {
    let mut payload = Map::new();
    payload.insert("title".into(), json!(row.title));
    if !row.texts.is_empty() {
        payload.insert("texts".into(), json!(row.texts));
    }
    for (key, value) in &row.extra {
        if is_primitive(value) {
            payload.insert(key.clone(), value.clone());
        }
    }
    if let Some(id) = &row.id {
        payload.insert("id".into(), json!(id));
    }

    HostRow {
        id: row.id.clone(),
        title: or_default(&row.title, "Row"),
        texts: row.texts.clone(),
        clickable: allow_click && row.id.is_some(),
        payload,
    }
}

fn render_header_action(action: &Action) -> HostAction {
    let title = action.title.to_lowercase();
    if title.contains("back") {
        return HostAction::Back;
    }
    if title == "app icon" || title == "app_icon" {
        return HostAction::AppIcon;
    }
    render_action(action)
}

fn render_action(action: &Action) -> HostAction {
    HostAction::Custom {
        id: action.id.clone(),
        title: or_default(&action.title, "Action"),
        has_icon: action.icon.is_some(),
        tinted: action.background_color.is_some(),
    }
}

fn is_primitive(value: &Value) -> bool {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
        Value::Array(items) => items.iter().all(Value::is_string),
        Value::Null | Value::Object(_) => false,
    }
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ItemList;

    fn tagged_row(id: &str, title: &str) -> Row {
        Row {
            id: Some(id.to_string()),
            ..Row::new(title)
        }
    }

    #[test]
    fn list_items_and_sections_render_in_order() {
        let list = ListTemplate {
            title: String::new(),
            header: Some("Top".into()),
            items: vec![tagged_row("s_item_0", "A")],
            item_lists: vec![ItemList {
                header: Some("More".into()),
                items: vec![tagged_row("s_list_0_item_0", "B")],
            }],
            ..ListTemplate::default()
        };

        let screen = render_template("s", &TemplateConfig::ListTemplate(list), &Value::Null)
            .expect("render");
        let HostTemplate::List { title, sections, .. } = &screen.body else {
            panic!("expected list, got {:?}", screen.body);
        };
        assert_eq!(title, "List");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].header.as_deref(), Some("Top"));
        assert_eq!(sections[1].rows[0].id.as_deref(), Some("s_list_0_item_0"));
    }

    #[test]
    fn loading_list_with_rows_fails() {
        let list = ListTemplate {
            is_loading: true,
            items: vec![Row::new("A")],
            ..ListTemplate::default()
        };
        assert!(render_template("s", &TemplateConfig::ListTemplate(list), &Value::Null).is_err());
    }

    #[test]
    fn empty_pane_fails_unless_loading() {
        let pane = PaneTemplate::default();
        assert!(render_template("s", &TemplateConfig::PaneTemplate(pane.clone()), &Value::Null).is_err());

        let loading = PaneTemplate {
            is_loading: true,
            ..pane
        };
        assert!(render_template("s", &TemplateConfig::PaneTemplate(loading), &Value::Null).is_ok());
    }

    #[test]
    fn back_titled_header_action_becomes_standard_back() {
        let message = MessageTemplate {
            header_action: Some(Action::new("Go Back")),
            ..MessageTemplate::default()
        };
        let screen = render_template("s", &TemplateConfig::MessageTemplate(message), &Value::Null)
            .expect("render");
        let HostTemplate::Message { header_action, .. } = &screen.body else {
            panic!("expected message");
        };
        assert_eq!(header_action, &Some(HostAction::Back));
    }

    #[test]
    fn row_tap_produces_flat_interaction() {
        let mut row = tagged_row("root_item_0", "Home");
        row.texts = vec!["5 min".into()];
        row.extra.insert("distance".into(), json!("2 km"));
        row.extra.insert("nested".into(), json!({"x": 1}));
        let list = ListTemplate {
            items: vec![row],
            ..ListTemplate::default()
        };
        let screen = render_template("root", &TemplateConfig::ListTemplate(list), &Value::Null)
            .expect("render");

        let event = screen.interaction("root_item_0").expect("row is clickable");
        assert_eq!(event["action"], "rowPress");
        assert_eq!(event["screen"], "root");
        assert_eq!(event["id"], "root_item_0");
        assert_eq!(event["distance"], "2 km");
        assert!(!event.contains_key("nested"));
        assert!(screen.interaction("root_item_9").is_none());
    }

    #[test]
    fn pane_rows_are_not_clickable_but_actions_are() {
        let pane = PaneTemplate {
            rows: vec![tagged_row("p_row_0", "info")],
            actions: vec![Action {
                id: Some("p_action_0".into()),
                ..Action::new("Start")
            }],
            ..PaneTemplate::default()
        };
        let screen = render_template("p", &TemplateConfig::PaneTemplate(pane), &Value::Null)
            .expect("render");

        assert!(screen.interaction("p_row_0").is_none());
        let event = screen.interaction("p_action_0").expect("action is clickable");
        assert_eq!(event["action"], "actionPress");
        assert_eq!(event["title"], "Start");
    }

    #[test]
    fn placeholder_has_no_screen_and_no_interactions() {
        let screen = placeholder("No screens registered");
        assert!(screen.is_placeholder());
        assert!(screen.interaction("anything").is_none());
    }
}
