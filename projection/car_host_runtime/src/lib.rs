//! Runtime for projecting application-defined template screens onto a car
//! head unit.
//!
//! The application registers [`ScreenConfig`]s and drives navigation through
//! a [`CarProjection`]. The platform side implements [`CarHost`] and reports
//! lifecycle signals and taps through a [`HostLink`]. Events flow back to the
//! application as flat key/value maps on a dedicated bridge thread.

pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod host;
pub mod media;
pub mod model_host;
pub mod navigation;
pub mod registry;
pub mod render;
pub mod session;
pub mod template;

pub use crate::config::{BridgeConfig, ConnectionPolicy, PackagingConfig};
pub use crate::correlator::{CallbackCorrelator, CallbackMap, ElementSlot};
pub use crate::dispatch::{CarProjection, HostLink};
pub use crate::error::{BridgeError, BridgeResult, RenderError};
pub use crate::events::{
    BridgeEvent, EventPayload, InteractionAction, Subscription, UserInteractionData,
};
pub use crate::host::CarHost;
pub use crate::media::{MediaEvent, MediaItem, PlaybackState, PlaybackStatus};
pub use crate::navigation::{NavigationStack, StackEntry};
pub use crate::registry::ScreenRegistry;
pub use crate::session::{SessionController, SessionState};
pub use crate::template::{
    Action, CarColor, ItemList, ListTemplate, MessageTemplate, PaneTemplate, PressHandler, Row,
    ScreenConfig, TemplateConfig,
};
pub use serde_json;
