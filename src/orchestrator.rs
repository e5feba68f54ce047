use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::classifier::{classify_batch, Classification};
use crate::config::AppConfig;
use crate::consumer::FeedConsumer;
use crate::error::ConsumerError;
use crate::events::{epoch_ms, ConnectionSignal, FeedEvent};
use crate::ntp::ClockProbe;
use crate::timing::{LifecyclePhaseTimestamps, LifecycleTimingTracker};
use crate::transport::HubTransport;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One running event loop. The loop returns the receiver when it ends, so
/// the next session can pick up where it left off; the shutdown channel
/// releases a loop that has no disconnected event to drain.
struct Session {
    handle: JoinHandle<mpsc::UnboundedReceiver<FeedEvent>>,
    shutdown: oneshot::Sender<()>,
}

/// Wires the consumer's domain events to the classifier and the lifecycle
/// timing tracker, and exposes the bootstrap/start/stop surface to the host
/// process.
///
/// Each `start()` arms an event loop for that session; the loop ends once it
/// has processed a disconnected status, whether that disconnect was requested
/// or unsolicited, and the orchestrator can then be started again.
pub struct Orchestrator {
    consumer: Arc<FeedConsumer>,
    tracker: Arc<Mutex<LifecycleTimingTracker>>,
    probe: Option<Arc<dyn ClockProbe>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<FeedEvent>>>,
    session: Mutex<Option<Session>>,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn HubTransport>,
        probe: Option<Arc<dyn ClockProbe>>,
    ) -> Self {
        let (consumer, events) = FeedConsumer::new(&config.feed, transport);

        Self {
            consumer: Arc::new(consumer),
            tracker: Arc::new(Mutex::new(LifecycleTimingTracker::new())),
            probe,
            events: Mutex::new(Some(events)),
            session: Mutex::new(None),
        }
    }

    /// Wind down any previous session's loop and take back the receiver, so
    /// the next session keeps its diagnostics.
    async fn reclaim_events(&self) {
        if let Some(session) = lock(&self.session).take() {
            let _ = session.shutdown.send(());
            if let Ok(events) = session.handle.await {
                *lock(&self.events) = Some(events);
            }
        }
    }

    pub fn consumer(&self) -> &FeedConsumer {
        &self.consumer
    }

    /// Snapshot of the tracker's phase timestamps.
    pub fn phases(&self) -> LifecyclePhaseTimestamps {
        *lock(&self.tracker).phases()
    }

    /// Reserved for pre-flight checks.
    pub async fn bootstrap(&self) -> Result<(), ConsumerError> {
        info!("bootstrapping");
        Ok(())
    }

    pub async fn start(&self) -> Result<(), ConsumerError> {
        info!("starting");

        if let Some(probe) = &self.probe {
            info!("probing network time");
            match probe.estimate().await {
                Ok(skew) => info!(
                    server = %skew.server,
                    offset_ms = skew.offset_ms,
                    local_ms = epoch_ms(),
                    "initial clock-skew estimate"
                ),
                // diagnostics only, the feed does not depend on it
                Err(err) => warn!(error = %err, "clock-skew probe failed"),
            }
        }

        self.reclaim_events().await;
        if let Some(events) = lock(&self.events).take() {
            let tracker = self.tracker.clone();
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            *lock(&self.session) = Some(Session {
                handle: tokio::spawn(event_loop(events, tracker, shutdown_rx)),
                shutdown: shutdown_tx,
            });
        }

        info!("starting consumer");
        self.consumer.start().await
    }

    pub async fn stop(&self) -> Result<(), ConsumerError> {
        info!("stopping");

        let result = self.consumer.stop().await;

        if let Some(session) = lock(&self.session).take() {
            if matches!(&result, Err(ConsumerError::InvalidState { .. })) {
                // nothing was emitted for the loop to drain on
                let _ = session.shutdown.send(());
            }
            // the disconnected event (or the shutdown signal) ends the loop;
            // the disconnect is tracked before the reset, and the receiver
            // comes back for the next session
            if let Ok(events) = session.handle.await {
                *lock(&self.events) = Some(events);
            }
        }

        lock(&self.tracker).reset();
        result
    }
}

async fn event_loop(
    mut events: mpsc::UnboundedReceiver<FeedEvent>,
    tracker: Arc<Mutex<LifecycleTimingTracker>>,
    mut shutdown: oneshot::Receiver<()>,
) -> mpsc::UnboundedReceiver<FeedEvent> {
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = &mut shutdown => {
                debug!("event loop released without a disconnect");
                break;
            }
        };

        let disconnected = matches!(
            &event,
            FeedEvent::ConnectionStatusChanged { change, .. }
                if change.status == ConnectionSignal::Disconnected
        );

        dispatch(&mut lock(&tracker), event);

        if disconnected {
            debug!("event loop finished after disconnect");
            break;
        }
    }
    events
}

/// Route one domain event into the timing tracker. Public so external
/// compositions and tests can drive the same logic without a live transport.
pub fn dispatch(tracker: &mut LifecycleTimingTracker, event: FeedEvent) {
    match event {
        FeedEvent::Data { channel, payload } => {
            let updates = payload.as_array().map(Vec::len);
            info!(%channel, ?updates, "received update batch");

            let now = epoch_ms();
            let outcome = match classify_batch(&payload) {
                Classification::Snapshot => tracker.track_first_snapshot(now),
                Classification::Incremental => tracker.track_first_incremental(now),
                // empty batch: snapshot likely complete, may repeat
                Classification::EmptyBatch => tracker.track_last_snapshot(now),
                Classification::Invalid => {
                    error!(%channel, %payload, "invalid first element of update batch");
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                warn!(%channel, error = %err, "dropped update batch timing");
            }
        }
        FeedEvent::Heartbeat { channel, payload } => {
            debug!(%channel, %payload, "received heartbeat");
            match payload.as_i64() {
                Some(ts) => {
                    if let Err(err) = tracker.track_heartbeat(ts) {
                        warn!(%channel, error = %err, "dropped heartbeat timing");
                    }
                }
                None => warn!(%channel, %payload, "malformed heartbeat payload"),
            }
        }
        FeedEvent::ConnectionStatusChanged { channel, change } => match change.status {
            ConnectionSignal::Connected => {
                info!(%channel, ?change, "connection status has changed");
                if let Err(err) = tracker.track_connected(change.timestamp) {
                    warn!(%channel, error = %err, "dropped connect timing");
                }
            }
            ConnectionSignal::Disconnected => {
                warn!(%channel, ?change, "connection status has changed");
                if let Err(err) = tracker.track_disconnected(change.timestamp) {
                    warn!(%channel, error = %err, "dropped disconnect timing");
                }
            }
        },
    }
}
