//! Shared harness for bridge integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use webext_bridge::{
    ContentRelay, Error, PortHandle, RelayConfig, Result, Runtime, RuntimePort, WindowChannel,
    WindowMessage,
};

pub const PAGE: &str = "https://bookmarks.example";

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "webext_bridge=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// MockRuntime
// ============================================================================

/// In-memory background process.
///
/// Records every `send_message` call. Replies `{success:true, echo}` unless
/// configured to fail; a numeric `delayMs` field in the message delays the
/// reply.
#[derive(Default)]
pub struct MockRuntime {
    calls: Mutex<Vec<Value>>,
    failure: Option<String>,
    refuse_port: bool,
    ports: Mutex<Vec<PortHandle>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `send_message` fails with `text`.
    pub fn failing(text: &str) -> Self {
        Self {
            failure: Some(text.to_string()),
            ..Self::default()
        }
    }

    /// `connect` fails.
    pub fn without_port() -> Self {
        Self {
            refuse_port: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Takes the background end of the most recent port.
    pub fn take_port(&self) -> Option<PortHandle> {
        self.ports.lock().pop()
    }

    /// Polls until at least `n` calls were recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..2000 {
            if self.call_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} runtime calls, saw {:?}", self.calls());
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn send_message(&self, message: Value) -> Result<Value> {
        self.calls.lock().push(message.clone());

        if let Some(delay) = message.get("delayMs").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match &self.failure {
            Some(text) => Err(Error::runtime(text.clone())),
            None => Ok(json!({ "success": true, "echo": message })),
        }
    }

    fn connect(&self, name: &str) -> Result<RuntimePort> {
        if self.refuse_port {
            return Err(Error::port_unavailable(name, "Could not establish connection"));
        }
        let (handle, port) = RuntimePort::pair(name);
        self.ports.lock().push(handle);
        Ok(port)
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A page channel with a running relay.
pub struct Harness {
    pub channel: WindowChannel,
    pub relay: ContentRelay,
    pub runtime: Arc<MockRuntime>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MockRuntime::new(), RelayConfig::new())
    }

    pub fn with(runtime: MockRuntime, config: RelayConfig) -> Self {
        init_tracing();

        let channel = WindowChannel::new(PAGE);
        let runtime = Arc::new(runtime);
        let relay = ContentRelay::builder()
            .channel(channel.clone())
            .shared_runtime(runtime.clone())
            .config(config)
            .build()
            .expect("build relay");

        Self {
            channel,
            relay,
            runtime,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.relay.shutdown();
    }
}

// ============================================================================
// Channel helpers
// ============================================================================

/// Receives until a message tagged with `source` arrives.
pub async fn next_from(rx: &mut broadcast::Receiver<WindowMessage>, source: &str) -> Value {
    loop {
        let message = rx.recv().await.expect("window channel closed");
        if message.data["source"] == source {
            return message.data;
        }
    }
}

/// Lets spawned tasks run, then returns everything queued on `rx`.
pub async fn settle(rx: &mut broadcast::Receiver<WindowMessage>) -> Vec<Value> {
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut seen = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(message) => seen.push(message.data),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return seen,
        }
    }
}

/// Messages in `seen` tagged with `source`.
pub fn from_source<'a>(seen: &'a [Value], source: &str) -> Vec<&'a Value> {
    seen.iter().filter(|m| m["source"] == source).collect()
}
