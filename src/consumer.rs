use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use uuid::Uuid;

use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::error::ConsumerError;
use crate::events::{epoch_ms, ConnectionSignal, ConnectionStatusChange, FeedEvent};
use crate::transport::HubTransport;

/// Remote-call name the provider invokes with an update batch.
pub const HUB_TARGET_UPDATE: &str = "OnUpdate";
/// Remote-call name the provider invokes with a heartbeat timestamp.
pub const HUB_TARGET_HEARTBEAT: &str = "OnHeartbeat";

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Closed set of consumer states. `start()` is accepted only from `Stopped`
/// and `stop()` only from `Started`; every other transition fails with
/// [`ConsumerError::InvalidState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerState::Stopped => write!(f, "stopped"),
            ConsumerState::Starting => write!(f, "starting"),
            ConsumerState::Started => write!(f, "started"),
            ConsumerState::Stopping => write!(f, "stopping"),
        }
    }
}

struct Gate {
    state: ConsumerState,
    connection_id: Option<String>,
}

struct Shared {
    id: Uuid,
    channel: String,
    transport: Arc<dyn HubTransport>,
    events_tx: mpsc::UnboundedSender<FeedEvent>,
    gate: Mutex<Gate>,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tear-down shared by the explicit stop path and the unsolicited-close
    /// path. The winner of the gate transition performs the side effects, so
    /// exactly one disconnected event is emitted per physical disconnection
    /// no matter which path runs cleanup first.
    fn cleanup(&self) {
        let connection_id = {
            let mut gate = self.gate();
            if gate.state == ConsumerState::Stopped {
                return;
            }
            gate.state = ConsumerState::Stopped;
            gate.connection_id.take()
        };

        self.transport.unregister_handler(HUB_TARGET_UPDATE);
        self.transport.unregister_handler(HUB_TARGET_HEARTBEAT);

        let change = ConnectionStatusChange {
            status: ConnectionSignal::Disconnected,
            connection_id,
            timestamp: epoch_ms(),
        };
        info!(id = %self.id, channel = %self.channel, ?change, "disconnected from feed");
        let _ = self.events_tx.send(FeedEvent::ConnectionStatusChanged {
            channel: self.channel.clone(),
            change,
        });
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Owns the hub connection handle and translates raw transport notifications
/// into domain events on an unbounded channel.
///
/// One instance covers one connection lifecycle at a time. `start()` must
/// fully resolve before a symmetric `stop()` is accepted; preempting an
/// in-flight start is unsupported. Reconnecting/reconnected transport
/// notifications are logged only — the domain model deliberately has no
/// degraded state, which is a documented limitation.
pub struct FeedConsumer {
    url: String,
    shared: Arc<Shared>,
}

impl FeedConsumer {
    pub fn new(
        config: &FeedConfig,
        transport: Arc<dyn HubTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            channel: config.channel.clone(),
            transport,
            events_tx,
            gate: Mutex::new(Gate {
                state: ConsumerState::Stopped,
                connection_id: None,
            }),
        });

        let consumer = Self {
            url: config.connection_url(),
            shared,
        };
        consumer.install_transport_hooks();

        (consumer, events_rx)
    }

    pub fn state(&self) -> ConsumerState {
        self.shared.gate().state
    }

    pub fn connection_id(&self) -> Option<String> {
        self.shared.gate().connection_id.clone()
    }

    /// Open the transport connection. Valid only from `Stopped`; on success
    /// the consumer is `Started` and a connected status event has been
    /// emitted; on failure the state reverts to `Stopped`.
    pub async fn start(&self) -> Result<(), ConsumerError> {
        {
            let mut gate = self.shared.gate();
            if gate.state != ConsumerState::Stopped {
                return Err(ConsumerError::InvalidState {
                    operation: "start",
                    actual: gate.state,
                });
            }
            gate.state = ConsumerState::Starting;
        }

        self.register_handlers();

        match self.shared.transport.connect(&self.url).await {
            Ok(connection_id) => {
                let change = {
                    let mut gate = self.shared.gate();
                    gate.state = ConsumerState::Started;
                    gate.connection_id = Some(connection_id.clone());
                    ConnectionStatusChange {
                        status: ConnectionSignal::Connected,
                        connection_id: Some(connection_id),
                        timestamp: epoch_ms(),
                    }
                };

                info!(
                    id = %self.shared.id,
                    channel = %self.shared.channel,
                    connection_id = change.connection_id.as_deref().unwrap_or(""),
                    "connected to feed"
                );
                let _ = self
                    .shared
                    .events_tx
                    .send(FeedEvent::ConnectionStatusChanged {
                        channel: self.shared.channel.clone(),
                        change,
                    });
                Ok(())
            }
            Err(err) => {
                self.shared.transport.unregister_handler(HUB_TARGET_UPDATE);
                self.shared
                    .transport
                    .unregister_handler(HUB_TARGET_HEARTBEAT);
                self.shared.gate().state = ConsumerState::Stopped;

                error!(id = %self.shared.id, error = %err, "failed to start consumer");
                Err(ConsumerError::StartFailure(err))
            }
        }
    }

    /// Close the transport connection. Valid only from `Started`. Cleanup
    /// runs unconditionally; a close failure is rethrown afterwards.
    pub async fn stop(&self) -> Result<(), ConsumerError> {
        {
            let mut gate = self.shared.gate();
            if gate.state != ConsumerState::Started {
                return Err(ConsumerError::InvalidState {
                    operation: "stop",
                    actual: gate.state,
                });
            }
            gate.state = ConsumerState::Stopping;
        }

        let close_result = self.shared.transport.disconnect().await;
        self.shared.cleanup();

        close_result.map_err(ConsumerError::StopFailure)
    }

    fn register_handlers(&self) {
        let shared = self.shared.clone();
        self.shared.transport.register_handler(
            HUB_TARGET_UPDATE,
            Arc::new(move |payload| {
                let updates = payload.as_array().map(Vec::len);
                debug!(id = %shared.id, ?updates, "invocation {HUB_TARGET_UPDATE}");
                let _ = shared.events_tx.send(FeedEvent::Data {
                    channel: shared.channel.clone(),
                    payload,
                });
            }),
        );

        let shared = self.shared.clone();
        self.shared.transport.register_handler(
            HUB_TARGET_HEARTBEAT,
            Arc::new(move |payload| {
                debug!(id = %shared.id, %payload, "invocation {HUB_TARGET_HEARTBEAT}");
                let _ = shared.events_tx.send(FeedEvent::Heartbeat {
                    channel: shared.channel.clone(),
                    payload,
                });
            }),
        );
    }

    fn install_transport_hooks(&self) {
        // Weak references: the transport keeps the hooks for its own
        // lifetime, and a strong Shared reference here would cycle with
        // Shared's transport handle.
        let weak = Arc::downgrade(&self.shared);
        self.shared.transport.on_close(Arc::new(move |error| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match error {
                Some(err) => {
                    error!(id = %shared.id, error = %err, "transport unexpectedly disconnected");
                    shared.cleanup();
                }
                // requested close: the stop path owns the cleanup
                None => debug!(id = %shared.id, "transport closed"),
            }
        }));

        let weak = Arc::downgrade(&self.shared);
        self.shared.transport.on_reconnecting(Arc::new(move |reason| {
            if let Some(shared) = weak.upgrade() {
                warn!(id = %shared.id, ?reason, "transport fired reconnecting event");
            }
        }));

        let weak = Arc::downgrade(&self.shared);
        self.shared
            .transport
            .on_reconnected(Arc::new(move |connection_id| {
                if let Some(shared) = weak.upgrade() {
                    warn!(id = %shared.id, ?connection_id, "transport fired reconnected event");
                }
            }));
    }
}
