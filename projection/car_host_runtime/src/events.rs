//! Host-to-application event delivery.
//!
//! Every event is flattened to a key/value map and queued to a single bridge
//! thread, even when emitted from that thread, so listeners always observe
//! events in emission order. Queueing never blocks the emitter. `onUserInteraction` is additionally routed back
//! to the press handler parked in the [`CallbackCorrelator`].

use crate::correlator::CallbackCorrelator;
use crate::media::MediaEvent;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, error, warn};

pub const SESSION_STARTED: &str = "onSessionStarted";
pub const SESSION_ENDED: &str = "onSessionEnded";
pub const SCREEN_CHANGED: &str = "onScreenChanged";
pub const USER_INTERACTION: &str = "onUserInteraction";

pub type EventPayload = Map<String, Value>;
type Listener = Arc<dyn Fn(&EventPayload) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    SessionStarted,
    SessionEnded,
    ScreenChanged(Option<String>),
    UserInteraction(EventPayload),
    Media(MediaEvent),
}

impl BridgeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted => SESSION_STARTED,
            Self::SessionEnded => SESSION_ENDED,
            Self::ScreenChanged(_) => SCREEN_CHANGED,
            Self::UserInteraction(_) => USER_INTERACTION,
            Self::Media(media) => media.event_name(),
        }
    }

    /// Flat payload; a bare value travels as `{"value": ...}`.
    pub fn payload(&self) -> EventPayload {
        match self {
            Self::SessionStarted | Self::SessionEnded | Self::ScreenChanged(None) => Map::new(),
            Self::ScreenChanged(Some(screen)) => {
                let mut payload = Map::new();
                payload.insert("value".into(), json!(screen));
                payload
            }
            Self::UserInteraction(payload) => payload.clone(),
            Self::Media(media) => media.payload(),
        }
    }

    /// Only media transport events may be shed under backpressure.
    fn is_droppable(&self) -> bool {
        matches!(self, Self::Media(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionAction {
    RowPress,
    ActionPress,
}

impl InteractionAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "rowPress" => Some(Self::RowPress),
            "actionPress" => Some(Self::ActionPress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInteractionData {
    pub action: InteractionAction,
    pub screen: String,
    pub data: EventPayload,
}

impl UserInteractionData {
    pub fn element_id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }
}

/// Normalises both the flat shape `{action, screen, id, ..}` and the legacy
/// wrapped shape `{data: {action, screen, ..}}`.
pub fn parse_user_interaction(event: &EventPayload) -> Option<UserInteractionData> {
    let raw = if event.get("action").is_some() && event.get("screen").is_some() {
        event
    } else {
        event.get("data").and_then(Value::as_object)?
    };

    let action = InteractionAction::parse(raw.get("action")?.as_str()?)?;
    let screen = raw.get("screen")?.as_str()?.to_string();

    let id = raw
        .get("id")
        .or_else(|| raw.get("data").and_then(|data| data.get("id")))
        .cloned();

    let mut data = Map::new();
    if let Some(id) = id {
        data.insert("id".into(), id);
    }
    for (key, value) in raw {
        if key != "action" && key != "screen" && key != "id" {
            data.insert(key.clone(), value.clone());
        }
    }

    Some(UserInteractionData {
        action,
        screen,
        data,
    })
}

/// Screen name from an `onScreenChanged` payload.
pub fn screen_name_from(payload: &EventPayload) -> Option<String> {
    payload
        .get("value")
        .or_else(|| payload.get("screenName"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(u64, Listener)>>>,
}

impl ListenerRegistry {
    fn add(self: &Arc<Self>, event: &str, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, listener));

        Subscription {
            registry: Arc::downgrade(self),
            event: event.to_string(),
            id,
        }
    }

    fn remove(&self, event: &str, id: u64) {
        if let Some(listeners) = self.listeners.write().get_mut(event) {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    fn snapshot(&self, event: &str) -> Vec<Listener> {
        self.listeners
            .read()
            .get(event)
            .map(|listeners| listeners.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }
}

/// Handle for one installed listener. Dropping it leaves the listener in place.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn remove(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event, self.id);
        }
    }
}

enum Delivery {
    Event {
        name: &'static str,
        payload: EventPayload,
    },
    Flush(SyncSender<()>),
}

#[derive(Default)]
struct QueueState {
    deliveries: VecDeque<Delivery>,
    senders: usize,
    closed: bool,
}

/// Ordered delivery queue shared by every [`EventSink`] and the bridge thread.
/// Pushing never blocks, so listeners may emit without deadlocking the bridge.
#[derive(Default)]
struct DeliveryQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl DeliveryQueue {
    fn push(&self, delivery: Delivery) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.deliveries.push_back(delivery);
        self.ready.notify_one();
        true
    }

    fn len(&self) -> usize {
        self.state.lock().deliveries.len()
    }

    /// Next delivery, or `None` once every sink is gone and the queue drained.
    fn next(&self) -> Option<Delivery> {
        let mut state = self.state.lock();
        loop {
            if let Some(delivery) = state.deliveries.pop_front() {
                return Some(delivery);
            }
            if state.senders == 0 {
                state.closed = true;
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.deliveries.clear();
    }
}

/// Cloneable emitting end of the bridge, safe to use from any thread.
///
/// Session, screen and interaction events are always queued. Media transport
/// events are dropped while the backlog is at capacity.
pub struct EventSink {
    queue: Arc<DeliveryQueue>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

impl EventSink {
    fn attach(queue: Arc<DeliveryQueue>, capacity: usize) -> Self {
        queue.state.lock().senders += 1;
        Self {
            queue,
            dropped: Arc::new(AtomicU64::new(0)),
            capacity,
        }
    }

    pub fn emit(&self, event: BridgeEvent) {
        let name = event.name();
        if event.is_droppable() && self.queue.len() >= self.capacity {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped.is_power_of_two() {
                warn!(
                    capacity = self.capacity,
                    dropped, "bridge queue full; dropped media event(s)"
                );
            }
            return;
        }

        let delivery = Delivery::Event {
            name,
            payload: event.payload(),
        };
        if self.queue.push(delivery) {
            debug!(event = name, "event queued");
        } else {
            error!(event = name, "event bridge is gone; event dropped");
        }
    }

    /// Blocks until every event queued before this call has been delivered.
    /// Must not be called from a listener.
    pub fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if !self.queue.push(Delivery::Flush(ack_tx)) {
            return false;
        }
        ack_rx.recv().is_ok()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Clone for EventSink {
    fn clone(&self) -> Self {
        self.queue.state.lock().senders += 1;
        Self {
            queue: self.queue.clone(),
            dropped: self.dropped.clone(),
            capacity: self.capacity,
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        let mut state = self.queue.state.lock();
        state.senders = state.senders.saturating_sub(1);
        if state.senders == 0 {
            self.queue.ready.notify_all();
        }
    }
}

pub struct EventBridge {
    sink: EventSink,
    listeners: Arc<ListenerRegistry>,
}

impl EventBridge {
    pub fn spawn(correlator: Arc<CallbackCorrelator>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let queue = Arc::new(DeliveryQueue::default());
        let listeners = Arc::new(ListenerRegistry::default());
        let loop_queue = queue.clone();
        let loop_listeners = listeners.clone();

        let spawned = thread::Builder::new()
            .name("projection-bridge".into())
            .spawn(move || delivery_loop(&loop_queue, &loop_listeners, &correlator));
        if let Err(err) = spawned {
            error!("failed to spawn bridge thread: {err}");
            queue.close();
        }

        Self {
            sink: EventSink::attach(queue, capacity),
            listeners,
        }
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn add_listener(
        &self,
        event: &str,
        listener: impl Fn(&EventPayload) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(event, Arc::new(listener))
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.count(event)
    }

    pub fn flush(&self) -> bool {
        self.sink.flush()
    }
}

fn delivery_loop(
    queue: &DeliveryQueue,
    listeners: &ListenerRegistry,
    correlator: &CallbackCorrelator,
) {
    while let Some(delivery) = queue.next() {
        match delivery {
            Delivery::Event { name, payload } => {
                if name == USER_INTERACTION {
                    route_interaction(correlator, &payload);
                }
                for listener in listeners.snapshot(name) {
                    invoke_guarded(name, || listener(&payload));
                }
            }
            Delivery::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    debug!("bridge thread exiting");
}

/// Resolves the tapped element back to its press handler and runs it.
fn route_interaction(correlator: &CallbackCorrelator, payload: &EventPayload) {
    let Some(interaction) = parse_user_interaction(payload) else {
        warn!(?payload, "could not parse user interaction event");
        return;
    };

    let Some(element_id) = interaction.element_id() else {
        warn!(screen = %interaction.screen, "user interaction without element id");
        return;
    };

    match correlator.resolve(&interaction.screen, element_id) {
        Some(handler) => {
            debug!(screen = %interaction.screen, element_id, "running press handler");
            invoke_guarded(USER_INTERACTION, || handler.call());
        }
        None => match correlator.available_ids(&interaction.screen) {
            Some(available) => warn!(
                screen = %interaction.screen,
                element_id,
                ?available,
                "no press handler for element"
            ),
            None => warn!(
                screen = %interaction.screen,
                screens = ?correlator.screens(),
                "no press handlers registered for screen"
            ),
        },
    }
}

fn invoke_guarded(event: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(event, "application callback panicked; bridge continues");
    }
}
