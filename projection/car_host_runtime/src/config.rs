use serde::{Deserialize, Serialize};

const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;
pub const DEFAULT_PLACEHOLDER_MESSAGE: &str = "No screens registered";

/// When `is_connected` starts reporting true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionPolicy {
    /// Only after the host reports the session started.
    #[default]
    OnStart,
    /// As soon as the host asks for the root screen.
    OnCreate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub connection_policy: ConnectionPolicy,
    pub outbound_queue_cap: usize,
    pub placeholder_message: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connection_policy: ConnectionPolicy::default(),
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            placeholder_message: DEFAULT_PLACEHOLDER_MESSAGE.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self {
            outbound_queue_cap: parse_outbound_queue_capacity(
                std::env::var("PROJECTION_OUTBOUND_QUEUE_CAP").ok().as_deref(),
            ),
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.connection_policy = policy;
        self
    }
}

fn parse_outbound_queue_capacity(raw: Option<&str>) -> usize {
    raw.and_then(|raw| raw.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAP)
}

/// Packaging-time options consumed when generating the Android manifest
/// entries and the CarPlay entitlements. No runtime effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackagingConfig {
    pub car_app_category: String,
    pub min_car_api_level: u32,
    pub target_car_api_level: Option<u32>,
    pub car_play_enabled: bool,
    pub media_only: bool,
    pub custom_permissions: Vec<String>,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            car_app_category: "media".to_string(),
            min_car_api_level: 1,
            target_car_api_level: None,
            car_play_enabled: true,
            media_only: false,
            custom_permissions: Vec::new(),
        }
    }
}

pub const CAR_APPLICATION_PERMISSION: &str = "com.google.android.gms.permission.CAR_APPLICATION";
pub const CARPLAY_AUDIO_ENTITLEMENT: &str = "com.apple.developer.carplay-audio";

impl PackagingConfig {
    pub fn target_api_level(&self) -> u32 {
        self.target_car_api_level
            .unwrap_or(self.min_car_api_level)
            .max(self.min_car_api_level)
    }

    /// Intent-filter category for the car app service.
    pub fn service_category(&self) -> String {
        format!(
            "androidx.car.app.category.{}",
            self.car_app_category.to_uppercase()
        )
    }

    /// Contents of `res/xml/automotive_app_desc.xml`.
    pub fn automotive_app_descriptor(&self) -> String {
        let uses = if self.media_only { "media" } else { "template" };
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<automotiveApp>\n");
        xml.push_str(&format!("  <uses name=\"{uses}\" />\n"));
        if !self.media_only {
            xml.push_str("  <library name=\"androidx.car.app.CarAppLibrary\" />\n");
            xml.push_str(&format!(
                "  <api name=\"androidx.car.app\" minApiLevel=\"{}\" targetApiLevel=\"{}\" />\n",
                self.min_car_api_level,
                self.target_api_level()
            ));
        }
        xml.push_str("</automotiveApp>");
        xml
    }

    /// Manifest permissions, de-duplicated, car permission first.
    pub fn permissions(&self) -> Vec<String> {
        let mut permissions = vec![CAR_APPLICATION_PERMISSION.to_string()];
        for permission in &self.custom_permissions {
            if !permissions.contains(permission) {
                permissions.push(permission.clone());
            }
        }
        permissions
    }

    pub fn carplay_entitlements(&self) -> Vec<&'static str> {
        if self.car_play_enabled {
            vec![CARPLAY_AUDIO_ENTITLEMENT]
        } else {
            Vec::new()
        }
    }
}
