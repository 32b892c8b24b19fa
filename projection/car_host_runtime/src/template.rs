use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Application closure attached to an interactive element.
///
/// Never serialized. Two handlers are equal only when they share the same
/// allocation, so a resolved handler can be checked against the registered one.
#[derive(Clone)]
pub struct PressHandler(Arc<dyn Fn() + Send + Sync>);

impl PressHandler {
    pub fn new(handler: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(handler))
    }

    pub fn call(&self) {
        (self.0)();
    }
}

impl fmt::Debug for PressHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PressHandler(..)")
    }
}

impl PartialEq for PressHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CarColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    #[serde(default = "opaque")]
    pub alpha: u8,
}

fn opaque() -> u8 {
    u8::MAX
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip)]
    pub on_press: Option<PressHandler>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Row {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn text(mut self, line: impl Into<String>) -> Self {
        self.texts.push(line.into());
        self
    }

    pub fn on_press(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_press = Some(PressHandler::new(handler));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<CarColor>,
    #[serde(skip)]
    pub on_press: Option<PressHandler>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn on_press(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_press = Some(PressHandler::new(handler));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub items: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTemplate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_action: Option<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_strip: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Row>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_lists: Vec<ItemList>,
}

impl ListTemplate {
    /// Single-section list: `items` are moved under one `itemLists` entry
    /// carrying `header`.
    pub fn sectioned(title: impl Into<String>, header: Option<String>, items: Vec<Row>) -> Self {
        Self {
            title: title.into(),
            header: header.clone(),
            item_lists: vec![ItemList { header, items }],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_action: Option<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_strip: Vec<Action>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneTemplate {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_action: Option<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_strip: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TemplateConfig {
    ListTemplate(ListTemplate),
    MessageTemplate(MessageTemplate),
    PaneTemplate(PaneTemplate),
}

impl TemplateConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListTemplate(_) => "ListTemplate",
            Self::MessageTemplate(_) => "MessageTemplate",
            Self::PaneTemplate(_) => "PaneTemplate",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::ListTemplate(list) => &list.title,
            Self::MessageTemplate(message) => &message.title,
            Self::PaneTemplate(pane) => &pane.title,
        }
    }

    pub fn message(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MessageTemplate(MessageTemplate {
            title: title.into(),
            message: message.into(),
            ..MessageTemplate::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenConfig {
    #[serde(default)]
    pub name: String,
    pub template: TemplateConfig,
}

impl ScreenConfig {
    pub fn new(name: impl Into<String>, template: TemplateConfig) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::InvalidArgument(
                "screen name is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Canonical registration payload: the config as a JSON string.
    pub fn to_wire(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(raw: &str) -> BridgeResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Accepts an already-decoded map, as some hosts hand one over directly.
    pub fn from_value(value: Value) -> BridgeResult<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }
}
