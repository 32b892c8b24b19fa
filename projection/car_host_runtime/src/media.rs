//! Media transport relay.
//!
//! The car's media session forwards transport commands here; they travel to
//! the application as bridge events like any other host signal. Playback
//! state and the browse tree flow the other way and are only stored.

use crate::error::BridgeResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::debug;

pub const BROWSE_ROOT_ID: &str = "__ROOT__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum MediaEvent {
    Play,
    Pause,
    Stop,
    SkipToNext,
    SkipToPrevious,
    SeekTo {
        position: u64,
    },
    #[serde(rename_all = "camelCase")]
    PlayFromId {
        media_id: String,
    },
    BrowserConnected,
}

impl MediaEvent {
    pub const EVENT_NAMES: [&'static str; 8] = [
        "onMediaPlay",
        "onMediaPause",
        "onMediaStop",
        "onMediaSkipToNext",
        "onMediaSkipToPrevious",
        "onMediaSeekTo",
        "onMediaPlayFromId",
        "onMediaBrowserConnected",
    ];

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Play => "onMediaPlay",
            Self::Pause => "onMediaPause",
            Self::Stop => "onMediaStop",
            Self::SkipToNext => "onMediaSkipToNext",
            Self::SkipToPrevious => "onMediaSkipToPrevious",
            Self::SeekTo { .. } => "onMediaSeekTo",
            Self::PlayFromId { .. } => "onMediaPlayFromId",
            Self::BrowserConnected => "onMediaBrowserConnected",
        }
    }

    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        match self {
            Self::SeekTo { position } => {
                payload.insert("position".into(), json!(position));
            }
            Self::PlayFromId { media_id } => {
                payload.insert("mediaId".into(), json!(media_id));
            }
            _ => {}
        }
        payload
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    None,
    Stopped,
    Paused,
    Playing,
    Buffering,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub state: PlaybackStatus,
    /// Milliseconds.
    pub position: u64,
    /// Milliseconds.
    pub duration: u64,
    #[serde(default = "normal_speed")]
    pub speed: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
}

fn normal_speed() -> f32 {
    1.0
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            state: PlaybackStatus::None,
            position: 0,
            duration: 0,
            speed: normal_speed(),
            title: None,
            artist: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_uri: Option<String>,
    #[serde(default)]
    pub playable: bool,
    #[serde(default)]
    pub browsable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSessionTarget {
    pub package_name: String,
    pub service_name: String,
}

/// State the media side of the host reads back from the application.
#[derive(Debug, Clone, Default)]
pub struct MediaSessionState {
    target: Option<MediaSessionTarget>,
    playback: PlaybackState,
    browse_tree: HashMap<String, Vec<MediaItem>>,
}

impl MediaSessionState {
    pub fn configure(&mut self, package_name: impl Into<String>, service_name: impl Into<String>) {
        let target = MediaSessionTarget {
            package_name: package_name.into(),
            service_name: service_name.into(),
        };
        debug!(package = %target.package_name, service = %target.service_name, "media session configured");
        self.target = Some(target);
    }

    pub fn target(&self) -> Option<&MediaSessionTarget> {
        self.target.as_ref()
    }

    pub fn update_playback(&mut self, playback: PlaybackState) {
        self.playback = playback;
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    /// Replaces the browse tree from its string-encoded form, keyed by parent id.
    pub fn set_browse_tree(&mut self, raw: &str) -> BridgeResult<()> {
        let tree: HashMap<String, Vec<MediaItem>> = serde_json::from_str(raw)?;
        debug!(parents = tree.len(), "media browse tree replaced");
        self.browse_tree = tree;
        Ok(())
    }

    pub fn load_children(&self, parent_id: &str) -> Vec<MediaItem> {
        self.browse_tree.get(parent_id).cloned().unwrap_or_default()
    }
}
