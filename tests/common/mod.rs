#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use feedpulse::error::TransportError;
use feedpulse::transport::{
    CloseHandler, HubTransport, InvocationHandler, ReconnectedHandler, ReconnectingHandler,
};
use feedpulse::FeedConfig;

pub fn feed_config() -> FeedConfig {
    FeedConfig {
        domain: "feed.example.com".to_string(),
        channel: "live".to_string(),
        api_key: "secret".to_string(),
    }
}

/// In-memory hub transport for driving the consumer from tests.
#[derive(Default)]
pub struct MockTransport {
    pub fail_connect: AtomicBool,
    pub fail_disconnect: AtomicBool,
    /// When set, `disconnect()` fires the close handlers with an error before
    /// returning, emulating an unsolicited close notification racing an
    /// application-issued stop.
    pub close_during_disconnect: AtomicBool,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    handlers: Mutex<HashMap<String, InvocationHandler>>,
    close_handlers: Mutex<Vec<CloseHandler>>,
    reconnecting_handlers: Mutex<Vec<ReconnectingHandler>>,
    reconnected_handlers: Mutex<Vec<ReconnectedHandler>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drive an inbound remote-call invocation.
    pub fn invoke(&self, target: &str, payload: Value) {
        let handler = self.handlers.lock().unwrap().get(target).cloned();
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    pub fn has_handler(&self, target: &str) -> bool {
        self.handlers.lock().unwrap().contains_key(target)
    }

    pub fn fire_close(&self, error: Option<TransportError>) {
        let handlers = self.close_handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(error.as_ref());
        }
    }

    pub fn fire_reconnecting(&self, reason: Option<String>) {
        let handlers = self.reconnecting_handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(reason.clone());
        }
    }

    pub fn fire_reconnected(&self, connection_id: Option<String>) {
        let handlers = self.reconnected_handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(connection_id.clone());
        }
    }
}

#[async_trait]
impl HubTransport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<String, TransportError> {
        let attempt = self.connect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Closed("mock connect refused".to_string()));
        }
        Ok(format!("conn-{attempt}"))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.close_during_disconnect.load(Ordering::SeqCst) {
            self.fire_close(Some(TransportError::Closed(
                "mock transport dropped".to_string(),
            )));
        }
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(TransportError::Closed("mock close failed".to_string()));
        }
        Ok(())
    }

    fn register_handler(&self, target: &str, handler: InvocationHandler) {
        self.handlers
            .lock()
            .unwrap()
            .insert(target.to_string(), handler);
    }

    fn unregister_handler(&self, target: &str) {
        self.handlers.lock().unwrap().remove(target);
    }

    fn on_close(&self, handler: CloseHandler) {
        self.close_handlers.lock().unwrap().push(handler);
    }

    fn on_reconnecting(&self, handler: ReconnectingHandler) {
        self.reconnecting_handlers.lock().unwrap().push(handler);
    }

    fn on_reconnected(&self, handler: ReconnectedHandler) {
        self.reconnected_handlers.lock().unwrap().push(handler);
    }
}
