use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::TransportError;

/// Callback invoked with the first argument of a named remote call.
pub type InvocationHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Callback invoked when the transport connection closes. Carries the error
/// for unsolicited closures, `None` for an application-requested close.
pub type CloseHandler = Arc<dyn Fn(Option<&TransportError>) + Send + Sync>;

/// Callback invoked on a reconnecting notification, with the trigger reason.
pub type ReconnectingHandler = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Callback invoked on a reconnected notification, with the new connection id.
pub type ReconnectedHandler = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Capability boundary over the bidirectional hub transport.
///
/// Any push channel that can open a connection, close it, dispatch named
/// remote-call invocations to registered handlers, and report close /
/// reconnect notifications satisfies this shape. Reconnect policy, keep-alive
/// and timeouts belong to the implementation behind this trait, not to its
/// consumers.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Open the connection and return its connection id. Suspends the caller
    /// until the transport confirms the connection.
    async fn connect(&self, url: &str) -> Result<String, TransportError>;

    /// Close the connection. Suspends the caller until the close completes.
    async fn disconnect(&self) -> Result<(), TransportError>;

    fn register_handler(&self, target: &str, handler: InvocationHandler);

    fn unregister_handler(&self, target: &str);

    fn on_close(&self, handler: CloseHandler);

    fn on_reconnecting(&self, handler: ReconnectingHandler);

    fn on_reconnected(&self, handler: ReconnectedHandler);
}
