//! SignalR-style JSON hub client over a websocket, implementing the
//! [`HubTransport`] capability.
//!
//! Speaks the json hub protocol directly over the websocket (skipping the
//! HTTP negotiate step): a handshake record, then record-separator-delimited
//! frames carrying invocations, pings and the close message. Keep-alive and
//! handshake timeouts live here, not in the consumers of the trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::{
    CloseHandler, HubTransport, InvocationHandler, ReconnectedHandler, ReconnectingHandler,
};

/// ASCII record separator terminating every hub protocol frame.
const RECORD_SEPARATOR: char = '\u{1e}';

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const MSG_INVOCATION: u8 = 1;
const MSG_PING: u8 = 6;
const MSG_CLOSE: u8 = 7;

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct HandshakeRequest {
    protocol: &'static str,
    version: u8,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HubMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<String>,
}

/// Convert the feed's https connection URL into its websocket form.
fn hub_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Drain the first complete record-separator-terminated frame out of
/// `buffer`, if there is one.
fn split_first_frame(buffer: &mut String) -> Option<String> {
    let end = buffer.find(RECORD_SEPARATOR)?;
    let mut frame: String = buffer.drain(..=end).collect();
    frame.pop();
    Some(frame)
}

/// Drain every complete frame out of `buffer`, leaving any trailing partial
/// frame in place.
fn split_frames(buffer: &mut String) -> Vec<String> {
    let mut frames = Vec::new();
    while let Some(frame) = split_first_frame(buffer) {
        frames.push(frame);
    }
    frames
}

fn frame(payload: impl Into<String>) -> Message {
    let mut text = payload.into();
    text.push(RECORD_SEPARATOR);
    Message::Text(text)
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct Active {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    handlers: Mutex<HashMap<String, InvocationHandler>>,
    close_handlers: Mutex<Vec<CloseHandler>>,
    reconnecting_handlers: Mutex<Vec<ReconnectingHandler>>,
    reconnected_handlers: Mutex<Vec<ReconnectedHandler>>,
    active: Mutex<Option<Active>>,
    /// Set by `disconnect()` so the reader can tell a requested close from an
    /// unsolicited one.
    closing: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn dispatch(&self, message: HubMessage) -> Option<TransportError> {
        match message.kind {
            MSG_INVOCATION => {
                let Some(target) = message.target else {
                    warn!("invocation without a target");
                    return None;
                };
                let handler = lock(&self.handlers).get(&target).cloned();
                match handler {
                    Some(handler) => {
                        let argument = message
                            .arguments
                            .and_then(|mut args| {
                                if args.is_empty() {
                                    None
                                } else {
                                    Some(args.remove(0))
                                }
                            })
                            .unwrap_or(Value::Null);
                        handler(argument);
                    }
                    None => debug!(%target, "invocation for unregistered target"),
                }
                None
            }
            // both sides ping independently, no reply expected
            MSG_PING => None,
            MSG_CLOSE => Some(TransportError::Closed(
                message
                    .error
                    .unwrap_or_else(|| "server requested close".to_string()),
            )),
            kind => {
                debug!(kind, "ignoring hub message");
                None
            }
        }
    }

    /// Runs exactly once per connection, when the websocket stream ends.
    fn handle_stream_end(&self, error: Option<TransportError>) {
        let requested = self.closing.swap(false, Ordering::SeqCst);
        // the reader may outlive a disconnect() that already took the slot
        drop(lock(&self.active).take());

        let error = if requested {
            None
        } else {
            Some(error.unwrap_or_else(|| {
                TransportError::Closed("connection stream ended".to_string())
            }))
        };

        let handlers = lock(&self.close_handlers).clone();
        for handler in handlers {
            handler(error.as_ref());
        }
    }
}

/// Hub transport over `tokio-tungstenite`.
///
/// Connection ids are generated locally: the json hub protocol only assigns
/// server-side ids through the negotiate step, which this client skips.
#[derive(Default)]
pub struct SignalrTransport {
    inner: Arc<Inner>,
}

impl SignalrTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HubTransport for SignalrTransport {
    async fn connect(&self, url: &str) -> Result<String, TransportError> {
        if lock(&self.inner.active).is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let ws_url = hub_url(url);
        let (ws, _response) = connect_async(ws_url).await?;
        let (mut sink, mut stream) = ws.split();

        let handshake = serde_json::to_string(&HandshakeRequest {
            protocol: "json",
            version: 1,
        })
        .map_err(|err| TransportError::Handshake(err.to_string()))?;
        sink.send(frame(handshake)).await?;

        // the handshake response is the first frame; anything the server
        // coalesced after it stays in `buffer` and is replayed by the reader
        // task before it awaits the socket
        let mut buffer = String::new();
        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(chunk))) => {
                        buffer.push_str(&chunk);
                        if let Some(reply) = split_first_frame(&mut buffer) {
                            return Ok(reply);
                        }
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(TransportError::Websocket(err)),
                    None => {
                        return Err(TransportError::Closed(
                            "connection closed during handshake".to_string(),
                        ))
                    }
                }
            }
        })
        .await
        .map_err(|_| TransportError::Handshake("handshake timed out".to_string()))??;

        let response: HandshakeResponse = serde_json::from_str(&reply)
            .map_err(|err| TransportError::Handshake(err.to_string()))?;
        if let Some(error) = response.error {
            return Err(TransportError::Handshake(error));
        }

        self.inner.closing.store(false, Ordering::SeqCst);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            let mut keep_alive = tokio::time::interval(KEEP_ALIVE_INTERVAL);
            keep_alive.tick().await;
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => match outgoing {
                        Some(message) => {
                            let is_close = matches!(message, Message::Close(_));
                            if sink.send(message).await.is_err() || is_close {
                                break;
                            }
                        }
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    _ = keep_alive.tick() => {
                        if sink.send(frame(format!("{{\"type\":{MSG_PING}}}"))).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let inner = self.inner.clone();
        let reader = tokio::spawn(async move {
            let mut close_error: Option<TransportError> = None;
            // the first pass drains whatever the server coalesced with the
            // handshake response before awaiting the socket
            'read: loop {
                for raw in split_frames(&mut buffer) {
                    match serde_json::from_str::<HubMessage>(&raw) {
                        Ok(message) => {
                            if let Some(err) = inner.dispatch(message) {
                                close_error = Some(err);
                                break 'read;
                            }
                        }
                        Err(err) => warn!(error = %err, %raw, "undecodable hub frame"),
                    }
                }
                match stream.next().await {
                    Some(Ok(Message::Text(chunk))) => buffer.push_str(&chunk),
                    Some(Ok(Message::Close(close_frame))) => {
                        debug!(?close_frame, "websocket close frame");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        close_error = Some(TransportError::Websocket(err));
                        break;
                    }
                    None => break,
                }
            }
            inner.handle_stream_end(close_error);
        });

        let connection_id = Uuid::new_v4().to_string();
        *lock(&self.inner.active) = Some(Active {
            outbound: out_tx,
            reader,
            writer,
        });

        Ok(connection_id)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(active) = lock(&self.inner.active).take() else {
            return Err(TransportError::NotConnected);
        };
        self.inner.closing.store(true, Ordering::SeqCst);

        // polite hub close, then the websocket close frame
        let _ = active.outbound.send(frame(format!("{{\"type\":{MSG_CLOSE}}}")));
        let _ = active.outbound.send(Message::Close(None));

        if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, active.reader)
            .await
            .is_err()
        {
            warn!("reader did not drain in time");
        }
        let _ = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, active.writer).await;

        Ok(())
    }

    fn register_handler(&self, target: &str, handler: InvocationHandler) {
        lock(&self.inner.handlers).insert(target.to_string(), handler);
    }

    fn unregister_handler(&self, target: &str) {
        lock(&self.inner.handlers).remove(target);
    }

    fn on_close(&self, handler: CloseHandler) {
        lock(&self.inner.close_handlers).push(handler);
    }

    fn on_reconnecting(&self, handler: ReconnectingHandler) {
        lock(&self.inner.reconnecting_handlers).push(handler);
    }

    fn on_reconnected(&self, handler: ReconnectedHandler) {
        lock(&self.inner.reconnected_handlers).push(handler);
    }
}
