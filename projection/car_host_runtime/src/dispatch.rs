//! Application-facing API and the UI-affinity thread behind it.
//!
//! [`CarProjection`] is the context object an application owns. Every call
//! that touches the session is queued onto a single thread that owns the
//! [`SessionController`] and the host, and resolves once that thread has run
//! it. [`HostLink`] is the platform's handle into the same queue.

use crate::config::BridgeConfig;
use crate::correlator::CallbackCorrelator;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{
    BridgeEvent, EventBridge, EventPayload, EventSink, SCREEN_CHANGED, SESSION_ENDED,
    SESSION_STARTED, Subscription, USER_INTERACTION, UserInteractionData, parse_user_interaction,
    screen_name_from,
};
use crate::host::CarHost;
use crate::media::{MediaEvent, MediaItem, MediaSessionState, PlaybackState};
use crate::registry::ScreenRegistry;
use crate::session::SessionController;
use crate::template::{ScreenConfig, TemplateConfig};
use futures::channel::oneshot;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use tracing::{debug, error, info};

type Command<H> = Box<dyn FnOnce(&mut SessionController<H>) + Send>;

struct UiThread<H: CarHost> {
    tx: Sender<Command<H>>,
}

impl<H: CarHost> Clone for UiThread<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<H: CarHost> UiThread<H> {
    fn spawn(mut session: SessionController<H>) -> Self {
        let (tx, rx) = mpsc::channel::<Command<H>>();

        let spawned = thread::Builder::new()
            .name("projection-ui".into())
            .spawn(move || {
                for command in rx {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| command(&mut session)));
                    if result.is_err() {
                        error!("session command panicked; UI thread continues");
                    }
                }
                debug!("UI thread exiting");
            });
        if let Err(err) = spawned {
            error!("failed to spawn UI thread: {err}");
        }

        Self { tx }
    }

    fn post(&self, command: impl FnOnce(&mut SessionController<H>) + Send + 'static) -> bool {
        let queued = self.tx.send(Box::new(command)).is_ok();
        if !queued {
            error!("UI thread is gone; host signal dropped");
        }
        queued
    }

    async fn call<R: Send + 'static>(
        &self,
        command: impl FnOnce(&mut SessionController<H>) -> R + Send + 'static,
    ) -> BridgeResult<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |session| {
                let _ = reply_tx.send(command(session));
            }))
            .map_err(|_| BridgeError::BridgeUnavailable)?;

        reply_rx.await.map_err(|_| BridgeError::BridgeUnavailable)
    }
}

pub struct CarProjection<H: CarHost> {
    ui: UiThread<H>,
    correlator: Arc<CallbackCorrelator>,
    bridge: EventBridge,
    media: Arc<Mutex<MediaSessionState>>,
}

impl<H: CarHost> CarProjection<H> {
    pub fn new(config: BridgeConfig) -> Self {
        let correlator = Arc::new(CallbackCorrelator::new());
        let bridge = EventBridge::spawn(correlator.clone(), config.outbound_queue_cap);
        let registry = Arc::new(RwLock::new(ScreenRegistry::new()));
        let session = SessionController::new(config, registry, bridge.sink());

        Self {
            ui: UiThread::spawn(session),
            correlator,
            bridge,
            media: Arc::new(Mutex::new(MediaSessionState::default())),
        }
    }

    /// Registers a screen. Press handlers stay on this side, keyed by the ids
    /// written into the wire copy.
    pub async fn register_screen(&self, config: ScreenConfig) -> BridgeResult<()> {
        config.validate()?;
        let (stripped, callbacks) = CallbackCorrelator::prepare(&config);
        let wire = stripped.to_wire()?;

        self.register_screen_wire(wire).await?;
        self.correlator.store(&config.name, callbacks);
        Ok(())
    }

    /// Registers an already-encoded screen config. No handlers are attached.
    pub async fn register_screen_wire(&self, wire: String) -> BridgeResult<()> {
        self.ui
            .call(move |session| {
                let config = ScreenConfig::from_wire(&wire)?;
                session.register_screen(config)
            })
            .await?
    }

    /// Shows the registered root if the car is still on the placeholder.
    pub async fn start_session(&self) -> BridgeResult<()> {
        info!("application ready for car session");
        self.ui
            .call(|session| {
                if session.showing_placeholder() {
                    session.refresh_current_screen();
                }
            })
            .await
    }

    pub async fn navigate_to_screen(&self, name: &str, params: Option<Value>) -> BridgeResult<()> {
        let name = name.to_string();
        let params = params.unwrap_or(Value::Null);
        self.ui
            .call(move |session| session.navigate_to_screen(&name, &params))
            .await?
    }

    /// Replaces the template of `name`; only re-renders when it is the
    /// visible screen. Handlers are swapped only if the update applied.
    pub async fn update_screen(&self, name: &str, template: TemplateConfig) -> BridgeResult<()> {
        let (stripped, callbacks) =
            CallbackCorrelator::prepare(&ScreenConfig::new(name, template));
        let wire = serde_json::to_string(&stripped.template)?;

        let screen = name.to_string();
        let applied = self
            .ui
            .call(move |session| {
                let template: TemplateConfig = serde_json::from_str(&wire)?;
                session.update_screen(&screen, template)
            })
            .await??;

        if applied {
            self.correlator.store(name, callbacks);
        }
        Ok(())
    }

    pub async fn get_current_screen(&self) -> Option<String> {
        self.ui
            .call(|session| session.current_screen())
            .await
            .ok()
            .flatten()
    }

    pub async fn is_connected(&self) -> bool {
        self.ui
            .call(|session| session.is_connected())
            .await
            .unwrap_or(false)
    }

    pub async fn finish_session(&self) -> BridgeResult<()> {
        self.ui.call(|session| session.finish_session()).await?
    }

    pub async fn pop_screen(&self) -> BridgeResult<()> {
        self.ui.call(|session| session.pop_screen()).await
    }

    pub async fn pop_to_root(&self) -> BridgeResult<()> {
        self.ui.call(|session| session.pop_to_root()).await
    }

    pub fn add_session_started_listener(
        &self,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.bridge.add_listener(SESSION_STARTED, move |_| listener())
    }

    pub fn add_session_ended_listener(
        &self,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.bridge.add_listener(SESSION_ENDED, move |_| listener())
    }

    pub fn add_screen_changed_listener(
        &self,
        listener: impl Fn(Option<String>) + Send + Sync + 'static,
    ) -> Subscription {
        self.bridge
            .add_listener(SCREEN_CHANGED, move |payload| listener(screen_name_from(payload)))
    }

    /// Observes taps after the matching press handler has run.
    pub fn add_user_interaction_listener(
        &self,
        listener: impl Fn(UserInteractionData) + Send + Sync + 'static,
    ) -> Subscription {
        self.bridge.add_listener(USER_INTERACTION, move |payload| {
            if let Some(interaction) = parse_user_interaction(payload) {
                listener(interaction);
            }
        })
    }

    /// Raw listener for any event name, including the media transport events.
    pub fn add_listener(
        &self,
        event: &str,
        listener: impl Fn(&EventPayload) + Send + Sync + 'static,
    ) -> Subscription {
        self.bridge.add_listener(event, listener)
    }

    pub fn configure_media_session(&self, package_name: &str, service_name: &str) {
        self.media.lock().configure(package_name, service_name);
    }

    pub fn update_playback_state(&self, playback: PlaybackState) {
        self.media.lock().update_playback(playback);
    }

    pub fn set_media_browse_tree(&self, raw: &str) -> BridgeResult<()> {
        self.media.lock().set_browse_tree(raw)
    }

    /// Waits until every event emitted so far has reached its listeners.
    pub fn flush_events(&self) -> bool {
        self.bridge.flush()
    }

    pub fn host_link(&self) -> HostLink<H> {
        HostLink {
            ui: self.ui.clone(),
            events: self.bridge.sink(),
            media: self.media.clone(),
        }
    }
}

/// Platform-side entry points. Cloneable and callable from any thread; every
/// signal is queued and returns without waiting.
pub struct HostLink<H: CarHost> {
    ui: UiThread<H>,
    events: EventSink,
    media: Arc<Mutex<MediaSessionState>>,
}

impl<H: CarHost> Clone for HostLink<H> {
    fn clone(&self) -> Self {
        Self {
            ui: self.ui.clone(),
            events: self.events.clone(),
            media: self.media.clone(),
        }
    }
}

impl<H: CarHost> HostLink<H> {
    pub fn create_root_screen(&self, host: H) -> bool {
        self.ui.post(move |session| session.create_root_screen(host))
    }

    pub fn session_started(&self) -> bool {
        self.ui.post(|session| session.session_started())
    }

    pub fn session_stopped(&self) -> bool {
        self.ui.post(|session| session.session_stopped())
    }

    pub fn disconnected(&self) -> bool {
        self.ui.post(|session| session.disconnect())
    }

    /// Back pressed on the car; handled like [`CarProjection::pop_screen`].
    pub fn back(&self) -> bool {
        self.ui.post(|session| session.pop_screen())
    }

    pub fn emit_interaction(&self, payload: EventPayload) {
        self.events.emit(BridgeEvent::UserInteraction(payload));
    }

    pub fn media(&self, event: MediaEvent) {
        self.events.emit(BridgeEvent::Media(event));
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.media.lock().playback().clone()
    }

    pub fn load_media_children(&self, parent_id: &str) -> Vec<MediaItem> {
        self.media.lock().load_children(parent_id)
    }

    /// Resolves once every signal queued before it has been handled.
    pub async fn sync(&self) -> BridgeResult<()> {
        self.ui.call(|_| ()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_host::ModelHost;
    use crate::template::{Action, ListTemplate, MessageTemplate, Row};
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn refreshable(message: &str, action: Action) -> TemplateConfig {
        TemplateConfig::MessageTemplate(MessageTemplate {
            title: "Hello".into(),
            message: message.into(),
            header_action: Some(action),
            ..MessageTemplate::default()
        })
    }

    /// A projection whose UI thread has already gone away.
    fn detached() -> CarProjection<ModelHost> {
        let (tx, rx) = mpsc::channel::<Command<ModelHost>>();
        drop(rx);
        let correlator = Arc::new(CallbackCorrelator::new());
        CarProjection {
            ui: UiThread { tx },
            bridge: EventBridge::spawn(correlator.clone(), 8),
            correlator,
            media: Arc::new(Mutex::new(MediaSessionState::default())),
        }
    }

    #[test]
    fn dead_ui_thread_rejects_commands_and_defaults_queries() {
        let projection = detached();

        assert_eq!(block_on(projection.get_current_screen()), None);
        assert!(!block_on(projection.is_connected()));

        let (count, handler) = counter();
        let err = block_on(projection.register_screen(ScreenConfig::new(
            "root",
            TemplateConfig::ListTemplate(ListTemplate {
                items: vec![Row::new("A").on_press(handler)],
                ..ListTemplate::default()
            }),
        )))
        .expect_err("dead");
        assert_eq!(err.code(), "BRIDGE_UNAVAILABLE");
        assert_eq!(projection.correlator.available_ids("root"), None);

        let err = block_on(projection.navigate_to_screen("root", None)).expect_err("dead");
        assert_eq!(err, BridgeError::BridgeUnavailable);
        assert!(!projection.host_link().session_started());

        projection.host_link().emit_interaction(
            serde_json::json!({"action": "rowPress", "screen": "root", "id": "root_item_0"})
                .as_object()
                .cloned()
                .expect("object"),
        );
        assert!(projection.flush_events());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_registration_rejects_before_queueing() {
        let projection = CarProjection::<ModelHost>::new(BridgeConfig::default());
        let err = block_on(projection.register_screen(ScreenConfig::new(
            " ",
            TemplateConfig::message("t", "m"),
        )))
        .expect_err("blank name");
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn malformed_wire_registration_is_a_wire_error() {
        let projection = CarProjection::<ModelHost>::new(BridgeConfig::default());
        let err = block_on(projection.register_screen_wire("{not json".into())).expect_err("wire");
        assert_eq!(err.code(), "WIRE_FORMAT");
    }

    #[test]
    fn update_keeps_old_handlers_when_not_applied() {
        let projection = CarProjection::<ModelHost>::new(BridgeConfig::default());
        let (old_count, old_handler) = counter();
        let (new_count, new_handler) = counter();

        block_on(projection.register_screen(ScreenConfig::new(
            "root",
            TemplateConfig::ListTemplate(ListTemplate {
                items: vec![Row::new("A").on_press(old_handler)],
                ..ListTemplate::default()
            }),
        )))
        .expect("register");

        // No host yet, so nothing is visible and the update is skipped.
        block_on(projection.update_screen(
            "root",
            TemplateConfig::ListTemplate(ListTemplate {
                items: vec![Row::new("B").on_press(new_handler)],
                ..ListTemplate::default()
            }),
        ))
        .expect("update");

        let link = projection.host_link();
        link.emit_interaction(
            serde_json::json!({"action": "rowPress", "screen": "root", "id": "root_item_0"})
                .as_object()
                .cloned()
                .expect("object"),
        );
        assert!(projection.flush_events());
        assert_eq!(old_count.load(Ordering::SeqCst), 1);
        assert_eq!(new_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn applied_update_swaps_handlers() {
        let projection = CarProjection::<ModelHost>::new(BridgeConfig::default());
        let (old_count, old_handler) = counter();
        let (new_count, new_handler) = counter();

        block_on(projection.register_screen(ScreenConfig::new(
            "root",
            refreshable("world", Action::new("Refresh").on_press(old_handler)),
        )))
        .expect("register");

        let (host, view, _log) = ModelHost::recording();
        let link = projection.host_link();
        link.create_root_screen(host);
        block_on(link.sync()).expect("sync");

        block_on(projection.update_screen(
            "root",
            refreshable("again", Action::new("Refresh").on_press(new_handler)),
        ))
        .expect("update");

        let tap = view.tap("root_headerAction").expect("action visible");
        link.emit_interaction(tap);
        assert!(projection.flush_events());
        assert_eq!(old_count.load(Ordering::SeqCst), 0);
        assert_eq!(new_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn media_events_reach_listeners_and_state_reads_back() {
        let projection = CarProjection::<ModelHost>::new(BridgeConfig::default());
        let positions = Arc::new(Mutex::new(Vec::new()));
        let seen = positions.clone();
        let _subscription = projection.add_listener("onMediaSeekTo", move |payload| {
            seen.lock().push(payload["position"].clone());
        });

        let link = projection.host_link();
        link.media(MediaEvent::SeekTo { position: 1_500 });
        assert!(projection.flush_events());
        assert_eq!(*positions.lock(), vec![serde_json::json!(1_500)]);

        projection
            .set_media_browse_tree(r#"{"__ROOT__":[{"id":"a","title":"A","playable":true}]}"#)
            .expect("tree");
        assert_eq!(link.load_media_children("__ROOT__").len(), 1);
    }
}
