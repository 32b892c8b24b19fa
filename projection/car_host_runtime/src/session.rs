//! Car session state machine.
//!
//! Owns the host's template controller and the navigation stack that mirrors
//! it. Every method here runs on the session's UI-affinity thread; see
//! [`crate::dispatch`] for how calls get there.

use crate::config::{BridgeConfig, ConnectionPolicy};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, EventSink};
use crate::host::CarHost;
use crate::navigation::NavigationStack;
use crate::registry::ScreenRegistry;
use crate::template::{ScreenConfig, TemplateConfig};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No host attached.
    Disconnected,
    /// Host attached and root shown, session not reported as started.
    Connecting,
    Active,
}

pub struct SessionController<H: CarHost> {
    config: BridgeConfig,
    registry: Arc<RwLock<ScreenRegistry>>,
    events: EventSink,
    host: Option<H>,
    state: SessionState,
    stack: NavigationStack,
    showing_placeholder: bool,
    placeholder_beneath: bool,
}

impl<H: CarHost> SessionController<H> {
    pub fn new(
        config: BridgeConfig,
        registry: Arc<RwLock<ScreenRegistry>>,
        events: EventSink,
    ) -> Self {
        Self {
            config,
            registry,
            events,
            host: None,
            state: SessionState::Disconnected,
            stack: NavigationStack::new(),
            showing_placeholder: false,
            placeholder_beneath: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Active && self.host.is_some()
    }

    pub fn current_screen(&self) -> Option<String> {
        self.stack.top().map(str::to_string)
    }

    pub fn stack(&self) -> &NavigationStack {
        &self.stack
    }

    pub fn showing_placeholder(&self) -> bool {
        self.showing_placeholder
    }

    /// Whether the host keeps a placeholder underneath the real root.
    pub fn placeholder_beneath(&self) -> bool {
        self.placeholder_beneath
    }

    /// The host asks for its first screen.
    pub fn create_root_screen(&mut self, host: H) {
        if self.host.is_some() {
            warn!("host reattached without disconnect; resetting session");
            self.end_if_started();
        }
        self.host = Some(host);
        self.stack.clear();
        self.showing_placeholder = false;
        self.placeholder_beneath = false;
        self.state = SessionState::Connecting;

        let root = self.registry.read().select_root().map(str::to_string);
        match root {
            Some(root) => {
                info!(root = %root, "creating root screen");
                self.present(&root, &Value::Null, Placement::Root);
                self.stack.push(root.clone(), Value::Null);
                self.events.emit(BridgeEvent::ScreenChanged(Some(root)));
            }
            None => {
                info!("no screens registered; showing placeholder");
                let message = self.config.placeholder_message.clone();
                if let Some(host) = self.host.as_mut() {
                    let template = host.placeholder(&message);
                    host.set_root(template);
                }
                self.showing_placeholder = true;
            }
        }

        if self.config.connection_policy == ConnectionPolicy::OnCreate {
            self.mark_started();
        }
    }

    pub fn session_started(&mut self) {
        if self.host.is_none() {
            warn!("session start reported without a host");
            return;
        }
        self.mark_started();
    }

    pub fn session_stopped(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        info!("car session stopped");
        self.end_if_started();
    }

    pub fn disconnect(&mut self) {
        info!(depth = self.stack.len(), "host disconnected");
        self.end_if_started();
        self.host = None;
        self.state = SessionState::Disconnected;
        self.stack.clear();
        self.showing_placeholder = false;
        self.placeholder_beneath = false;
    }

    /// Stores `config` and refreshes the car if it now has something better
    /// to show.
    pub fn register_screen(&mut self, config: ScreenConfig) -> BridgeResult<()> {
        let name = config.name.clone();
        let becomes_root = {
            let mut registry = self.registry.write();
            registry.register(config)?;
            registry.select_root() == Some(name.as_str())
        };

        if self.host.is_none() {
            return Ok(());
        }
        if self.showing_placeholder && becomes_root {
            debug!(screen = %name, "root registered while placeholder is showing");
            self.refresh_current_screen();
        } else if self.stack.top() == Some(name.as_str()) {
            self.refresh_current_screen();
        }
        Ok(())
    }

    pub fn navigate_to_screen(&mut self, name: &str, params: &Value) -> BridgeResult<()> {
        if !self.registry.read().contains(name) {
            return Err(BridgeError::NotFound(name.to_string()));
        }
        if self.host.is_none() {
            return Err(BridgeError::HostUnavailable(format!(
                "cannot navigate to '{name}' without a car session"
            )));
        }

        self.present(name, params, Placement::Push);
        if self.showing_placeholder {
            self.showing_placeholder = false;
            self.placeholder_beneath = true;
        }
        self.stack.push(name, params.clone());
        debug!(screen = name, depth = self.stack.len(), "pushed screen");
        self.events.emit(BridgeEvent::ScreenChanged(Some(name.to_string())));
        Ok(())
    }

    /// Replaces the template of `name` and re-renders it if visible.
    /// Returns whether the update was applied.
    pub fn update_screen(&mut self, name: &str, template: TemplateConfig) -> BridgeResult<bool> {
        if !self.registry.read().contains(name) {
            return Err(BridgeError::NotFound(name.to_string()));
        }
        if self.host.is_none() || self.stack.top() != Some(name) {
            debug!(screen = name, current = ?self.stack.top(), "update ignored; screen not visible");
            return Ok(false);
        }

        self.registry.write().replace_template(name, template);
        self.rerender_top();
        Ok(true)
    }

    pub fn pop_screen(&mut self) {
        let Some(host) = self.host.as_mut() else {
            return;
        };
        let Some(top) = self.stack.pop().map(str::to_string) else {
            debug!("pop ignored at root");
            return;
        };

        host.pop();
        self.events.emit(BridgeEvent::ScreenChanged(Some(top)));
    }

    pub fn pop_to_root(&mut self) {
        let Some(host) = self.host.as_mut() else {
            return;
        };
        let removed = self.stack.pop_to_root();
        for _ in 0..removed {
            host.pop();
        }

        if let Some(root) = self.stack.root() {
            debug!(removed, root, "popped to root");
            self.events
                .emit(BridgeEvent::ScreenChanged(Some(root.to_string())));
        }
    }

    /// Asks the host to close the car UI. The stack is left alone until the
    /// host disconnects.
    pub fn finish_session(&mut self) -> BridgeResult<()> {
        let host = self
            .host
            .as_mut()
            .ok_or_else(|| BridgeError::HostUnavailable("no car session to finish".to_string()))?;
        info!("finishing car session");
        host.finish();
        Ok(())
    }

    /// Swaps the placeholder for the registered root, or re-renders the
    /// current screen in place.
    ///
    /// The host cannot drop its own root, so the real root is pushed over the
    /// placeholder and the host stack stays one frame deeper than ours.
    pub fn refresh_current_screen(&mut self) {
        if self.host.is_none() {
            return;
        }

        if self.showing_placeholder {
            let root = self.registry.read().select_root().map(str::to_string);
            let Some(root) = root else {
                return;
            };
            info!(root = %root, "replacing placeholder with root screen");
            self.present(&root, &Value::Null, Placement::Push);
            self.stack.push(root.clone(), Value::Null);
            self.showing_placeholder = false;
            self.placeholder_beneath = true;
            self.events.emit(BridgeEvent::ScreenChanged(Some(root)));
            return;
        }

        self.rerender_top();
    }

    /// Re-renders the visible screen in place with the params it was pushed with.
    fn rerender_top(&mut self) {
        if let Some(top) = self.stack.top_entry().cloned() {
            self.present(&top.name, &top.params, Placement::ReplaceTop);
        }
    }

    /// `onSessionEnded` pairs with a prior `onSessionStarted`, never more.
    fn end_if_started(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Connecting;
            self.events.emit(BridgeEvent::SessionEnded);
        }
    }

    fn mark_started(&mut self) {
        if self.state == SessionState::Active {
            return;
        }
        info!(policy = ?self.config.connection_policy, "car session started");
        self.state = SessionState::Active;
        self.events.emit(BridgeEvent::SessionStarted);
    }

    /// Renders `name` from the registry and hands it to the host. Render
    /// failures become an `Error: ...` message screen.
    fn present(&mut self, name: &str, params: &Value, placement: Placement) {
        let registry = self.registry.read();
        let Some(host) = self.host.as_mut() else {
            return;
        };

        let template = match registry.lookup(name) {
            Some(config) => match host.render(name, &config.template, params) {
                Ok(template) => template,
                Err(err) => {
                    warn!(screen = name, %err, "render failed; showing error screen");
                    host.placeholder(&format!("Error: {}", err.message))
                }
            },
            None => {
                warn!(screen = name, "screen vanished from registry before render");
                host.placeholder(&format!("Error: screen '{name}' not found"))
            }
        };

        match placement {
            Placement::Root => host.set_root(template),
            Placement::Push => host.push(template),
            Placement::ReplaceTop => host.replace_top(template),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Placement {
    Root,
    Push,
    ReplaceTop,
}
