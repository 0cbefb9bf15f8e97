//! Bookmark sync demonstration.
//!
//! Demonstrates:
//! - Relay startup against an in-memory background
//! - Page bridge injection and availability check
//! - Request/reply through the relay (save, list)
//! - Background-initiated sync with page acknowledgment
//! - Background connectivity probe
//!
//! Usage:
//!   cargo run --example bookmark_sync
//!   cargo run --example bookmark_sync -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use webext_bridge::{
    ContentRelay, Error, PageBridge, PageClient, PortHandle, Result, Runtime, RuntimePort,
    WindowChannel,
};

// ============================================================================
// Constants
// ============================================================================

const PAGE_URL: &str = "https://bookmarks.example/app";

// ============================================================================
// Background
// ============================================================================

/// In-memory extension background holding the bookmark store.
#[derive(Default)]
struct BookmarkBackground {
    bookmarks: Mutex<Vec<Value>>,
    synced: Mutex<Option<Value>>,
    port: Mutex<Option<PortHandle>>,
}

impl BookmarkBackground {
    /// Pushes a notification to the relay over the open port.
    fn notify(&self, event: &str, data: Value) -> Result<()> {
        let port = self.port.lock();
        let port = port.as_ref().ok_or(Error::ConnectionClosed)?;
        port.post(json!({ "action": "notifyWebApp", "event": event, "data": data }))
    }
}

#[async_trait]
impl Runtime for BookmarkBackground {
    async fn send_message(&self, message: Value) -> Result<Value> {
        match message["action"].as_str() {
            Some("saveBookmark") => {
                let mut bookmarks = self.bookmarks.lock();
                bookmarks.push(message["bookmark"].clone());
                Ok(json!({ "success": true, "count": bookmarks.len() }))
            }
            Some("getBookmarks") => {
                Ok(json!({ "success": true, "bookmarks": *self.bookmarks.lock() }))
            }
            Some("syncComplete") => {
                *self.synced.lock() = Some(message["data"].clone());
                Ok(json!({ "success": true }))
            }
            _ => Err(Error::runtime(
                "Could not establish connection. Receiving end does not exist.",
            )),
        }
    }

    fn connect(&self, name: &str) -> Result<RuntimePort> {
        let (handle, port) = RuntimePort::pair(name);
        *self.port.lock() = Some(handle);
        Ok(port)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|arg| arg == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "webext_bridge=trace"
    } else {
        "webext_bridge=debug"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    println!("=== Bookmark Sync ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    println!("[Setup] Starting relay for {PAGE_URL}...");

    let channel = WindowChannel::new(PAGE_URL);
    let background = Arc::new(BookmarkBackground::default());

    let relay = ContentRelay::builder()
        .channel(channel.clone())
        .shared_runtime(background.clone())
        .build()?;
    println!("        ✓ Relay started (origin={})", relay.origin());

    let bridge = PageBridge::new(channel.clone())?;
    bridge.inject();
    let ready = bridge.wait_ready(Duration::from_secs(1)).await?;
    println!("        ✓ Bridge injected (ready at {ready})");

    let client = PageClient::new(channel)?;
    let available = client.check_availability(Duration::from_millis(500)).await;
    println!("        ✓ Extension available: {available}\n");

    // ========================================================================
    // Requests
    // ========================================================================

    println!("[Requests] Saving bookmarks...");
    for url in ["https://www.rust-lang.org", "https://docs.rs", "https://crates.io"] {
        let reply = client
            .request(json!({ "action": "saveBookmark", "bookmark": { "url": url } }))
            .await?;
        println!("        ✓ Saved {url} (count={})", reply["count"]);
    }

    let reply = client.request(json!({ "action": "getBookmarks" })).await?;
    println!("        ✓ Listed {}\n", reply["bookmarks"]);

    let reply = client.request(json!({ "action": "exportBookmarks" })).await?;
    println!("[Requests] Unsupported action answered with: {reply}\n");

    // ========================================================================
    // Sync
    // ========================================================================

    println!("[Sync] Background requests a sync...");

    let mut events = client.events();
    background.notify("syncRequested", json!({ "reason": "startup" }))?;

    let event = events
        .recv()
        .await
        .map_err(|e| Error::protocol(e.to_string()))?;
    println!("        ✓ Page received '{}'", event.event);

    let count = client
        .request(json!({ "action": "getBookmarks" }))
        .await?["bookmarks"]
        .as_array()
        .map_or(0, Vec::len);
    bridge.sync_complete(json!({ "count": count }));

    for _ in 0..50 {
        if background.synced.lock().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!(
        "        ✓ Background got syncComplete: {}\n",
        background.synced.lock().clone().unwrap_or(Value::Null)
    );

    // ========================================================================
    // Connection Test
    // ========================================================================

    println!("[Probe] Background tests the page connection...");
    let reply = relay
        .handle_runtime_message(json!({ "action": "testConnection" }))
        .await;
    println!("        ✓ Probe result: {}\n", reply.unwrap_or(Value::Null));

    relay.shutdown();
    println!("=== Done ===");
    Ok(())
}
