mod protocol;

use crate::protocol::{
    BridgeEnvelope, HeadUnitEnvelope, error_envelope, event_envelope, ready_envelope,
    reader_loop, template_envelope, writer_loop,
};
use car_host_runtime::events::{SCREEN_CHANGED, SESSION_ENDED, SESSION_STARTED, USER_INTERACTION};
use car_host_runtime::model_host::{HostView, ModelHost};
use car_host_runtime::{
    BridgeConfig, BridgeError, BridgeResult, CarProjection, ConnectionPolicy, HostLink,
    MediaEvent, ScreenConfig, Subscription,
};
use clap::{Parser, ValueEnum};
use futures::executor::block_on;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated car head unit: reads head-unit frames on stdin and writes
/// rendered templates and bridge events as frames on stdout.
#[derive(Debug, Parser)]
#[command(name = "car_host", version)]
struct Args {
    /// JSON array of screen configs registered before the first frame.
    #[arg(long)]
    screens: Option<PathBuf>,

    /// Session id stamped on every outbound frame.
    #[arg(long, default_value = "S1")]
    sid: String,

    /// When the session starts reporting as connected.
    #[arg(long, value_enum, default_value_t = PolicyArg::OnStart)]
    policy: PolicyArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    OnStart,
    OnCreate,
}

impl From<PolicyArg> for ConnectionPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::OnStart => ConnectionPolicy::OnStart,
            PolicyArg::OnCreate => ConnectionPolicy::OnCreate,
        }
    }
}

fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(err) = run(args) {
        error!("car_host fatal error: {err}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries frames.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::from_env().with_policy(args.policy.into());
    let queue_cap = config.outbound_queue_cap;
    let projection = CarProjection::<ModelHost>::new(config);
    let (tx, rx) = mpsc::sync_channel(queue_cap);
    let outbound = Outbound {
        tx: tx.clone(),
        sid: args.sid.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
        capacity: queue_cap,
    };

    let subscriptions = forward_events(&projection, &outbound);

    if let Some(path) = &args.screens {
        register_screens(&projection, path)?;
    }

    let writer_handle = thread::spawn(move || {
        let result = writer_loop(rx);
        if let Err(err) = &result {
            error!("writer loop terminated with error: {err}");
        }
        result
    });

    tx.send(ready_envelope(&args.sid))
        .map_err(|_| "failed to queue ready envelope")?;
    info!(sid = %args.sid, policy = ?args.policy, "head unit ready");

    let mut head_unit = HeadUnit {
        link: projection.host_link(),
        projection,
        outbound,
        view: None,
    };

    let stdin = io::stdin();
    let read_result = reader_loop(stdin.lock(), |decoded| match decoded {
        Ok(envelope) => head_unit.handle(envelope),
        Err(err) => head_unit.report(&BridgeError::from(err)),
    });

    if let Err(err) = &read_result {
        error!("reader loop terminated with error: {err}");
    }

    if head_unit.view.is_some() {
        head_unit.link.disconnected();
    }
    let _ = block_on(head_unit.link.sync());
    head_unit.projection.flush_events();

    for subscription in subscriptions {
        subscription.remove();
    }
    drop(head_unit);
    drop(tx);

    if writer_handle.is_finished() {
        match writer_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("writer thread returned error: {err}"),
            Err(err) => error!("writer thread join failed: {err:?}"),
        }
    } else {
        warn!("writer thread still active during shutdown; skipping join");
    }

    Ok(read_result?)
}

#[derive(Clone)]
struct Outbound {
    tx: SyncSender<BridgeEnvelope>,
    sid: String,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

impl Outbound {
    /// Event frames are best effort; a full queue drops them.
    fn send_event(&self, envelope: BridgeEnvelope) {
        match self.tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(_envelope)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped.is_power_of_two() {
                    warn!(
                        capacity = self.capacity,
                        dropped, "outbound queue full; dropped event frame(s)"
                    );
                }
            }
            Err(TrySendError::Disconnected(_envelope)) => {
                error!("failed to queue event frame");
            }
        }
    }

    /// Template, state and error frames are never dropped; a full queue
    /// blocks the caller until the writer catches up.
    fn send_control(&self, envelope: BridgeEnvelope) {
        let envelope = match self.tx.try_send(envelope) {
            Ok(()) => return,
            Err(TrySendError::Full(envelope)) => envelope,
            Err(TrySendError::Disconnected(_envelope)) => {
                error!("failed to enqueue control frame");
                return;
            }
        };

        warn!(
            capacity = self.capacity,
            "outbound queue full; waiting to enqueue control frame"
        );
        if self.tx.send(envelope).is_err() {
            error!("failed to enqueue control frame");
        }
    }
}

fn forward_events(projection: &CarProjection<ModelHost>, outbound: &Outbound) -> Vec<Subscription> {
    [SESSION_STARTED, SESSION_ENDED, SCREEN_CHANGED, USER_INTERACTION]
        .into_iter()
        .chain(MediaEvent::EVENT_NAMES)
        .map(|name| {
            let outbound = outbound.clone();
            projection.add_listener(name, move |payload| {
                outbound.send_event(event_envelope(&outbound.sid, name, payload));
            })
        })
        .collect()
}

fn register_screens(projection: &CarProjection<ModelHost>, path: &Path) -> BridgeResult<()> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| BridgeError::InvalidArgument(format!("{}: {err}", path.display())))?;
    let screens: Vec<Value> = serde_json::from_str(&raw)?;

    for value in screens {
        let config = ScreenConfig::from_value(value)?;
        debug!(screen = %config.name, kind = config.template.kind(), "registering screen");
        block_on(projection.register_screen(config))?;
    }
    info!(path = %path.display(), "screens registered");
    Ok(())
}

struct HeadUnit {
    projection: CarProjection<ModelHost>,
    link: HostLink<ModelHost>,
    outbound: Outbound,
    view: Option<HostView>,
}

impl HeadUnit {
    fn handle(&mut self, envelope: HeadUnitEnvelope) {
        debug!(?envelope, "head unit frame");
        let result = match envelope {
            HeadUnitEnvelope::Connect => {
                self.connect();
                Ok(())
            }
            HeadUnitEnvelope::Start => {
                self.link.session_started();
                Ok(())
            }
            HeadUnitEnvelope::Stop => {
                self.link.session_stopped();
                Ok(())
            }
            HeadUnitEnvelope::Disconnect => {
                self.view = None;
                self.link.disconnected();
                Ok(())
            }
            HeadUnitEnvelope::Tap { screen, id } => self.tap(screen.as_deref(), &id),
            HeadUnitEnvelope::Back => {
                self.link.back();
                Ok(())
            }
            HeadUnitEnvelope::Media { event } => {
                self.link.media(event);
                Ok(())
            }
            HeadUnitEnvelope::Navigate { screen, params } => {
                block_on(self.projection.navigate_to_screen(&screen, params))
            }
            HeadUnitEnvelope::Register { config } => ScreenConfig::from_value(config)
                .and_then(|config| block_on(self.projection.register_screen(config))),
            HeadUnitEnvelope::Update { screen, template } => {
                block_on(self.projection.update_screen(&screen, template))
            }
            HeadUnitEnvelope::Pop => block_on(self.projection.pop_screen()),
            HeadUnitEnvelope::PopToRoot => block_on(self.projection.pop_to_root()),
            HeadUnitEnvelope::Finish => block_on(self.projection.finish_session()),
            HeadUnitEnvelope::State => {
                self.send_state();
                Ok(())
            }
        };

        if let Err(err) = result {
            self.report(&err);
        }
    }

    fn connect(&mut self) {
        let outbound = self.outbound.clone();
        let (host, view) = ModelHost::new(move |op| {
            outbound.send_control(template_envelope(&outbound.sid, op));
        });
        self.view = Some(view);
        self.link.create_root_screen(host);
    }

    fn tap(&self, screen: Option<&str>, element_id: &str) -> BridgeResult<()> {
        let view = self
            .view
            .as_ref()
            .ok_or_else(|| BridgeError::HostUnavailable("tap without a connected head unit".into()))?;

        // The tap must land on whatever is on screen once queued commands settle.
        block_on(self.link.sync())?;
        let payload = view.tap(element_id).ok_or_else(|| {
            BridgeError::InvalidArgument(format!("'{element_id}' is not tappable on screen"))
        })?;

        if let Some(expected) = screen {
            if payload.get("screen").and_then(Value::as_str) != Some(expected) {
                return Err(BridgeError::InvalidArgument(format!(
                    "'{element_id}' is not on screen '{expected}'"
                )));
            }
        }

        self.link.emit_interaction(payload);
        Ok(())
    }

    fn send_state(&self) {
        let current = block_on(self.projection.get_current_screen());
        let connected = block_on(self.projection.is_connected());
        self.outbound.send_control(BridgeEnvelope::State {
            sid: self.outbound.sid.clone(),
            current,
            connected,
        });
    }

    fn report(&self, err: &BridgeError) {
        warn!(code = err.code(), "{err}");
        self.outbound
            .send_control(error_envelope(&self.outbound.sid, err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound(capacity: usize) -> (Outbound, mpsc::Receiver<BridgeEnvelope>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let outbound = Outbound {
            tx,
            sid: "S1".into(),
            dropped: Arc::new(AtomicU64::new(0)),
            capacity,
        };
        (outbound, rx)
    }

    fn state(current: &str) -> BridgeEnvelope {
        BridgeEnvelope::State {
            sid: "S1".into(),
            current: Some(current.into()),
            connected: true,
        }
    }

    fn current_of(envelope: BridgeEnvelope) -> Option<String> {
        match envelope {
            BridgeEnvelope::State { current, .. } => current,
            _ => None,
        }
    }

    #[test]
    fn control_frame_is_queued_before_send_control_returns() {
        let (outbound, rx) = outbound(1);
        outbound.send_event(state("first"));

        let sender = outbound.clone();
        let handle = thread::spawn(move || {
            sender.send_control(state("second"));
            sender.send_event(state("third"));
        });

        assert_eq!(current_of(rx.recv().expect("first")).as_deref(), Some("first"));
        handle.join().expect("sender thread");
        drop(outbound);

        let rest: Vec<_> = rx.iter().filter_map(current_of).collect();
        assert_eq!(rest, vec!["second".to_string()]);
    }

    #[test]
    fn full_queue_drops_event_frames() {
        let (outbound, _rx) = outbound(1);
        outbound.send_event(state("a"));
        outbound.send_event(state("b"));
        outbound.send_event(state("c"));
        assert_eq!(outbound.dropped.load(Ordering::Relaxed), 2);
    }
}
