//! End-to-end tests: page client and bridge talking to a relay backed by an
//! in-memory background.

mod common;

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use webext_bridge::{
    PageBridge, PageClient, PageMessage, RelayConfig, UnacknowledgedSync, WindowChannel,
};

use common::{Harness, MockRuntime, PAGE, from_source, next_from, settle};

// ============================================================================
// Request forwarding
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_correlate() {
    let harness = Harness::new();
    let client = PageClient::new(harness.channel.clone()).expect("client");

    let delays = [300u64, 100, 200, 0];
    let requests = delays.iter().enumerate().map(|(n, delay)| {
        let client = client.clone();
        async move {
            client
                .request(json!({ "action": "getBookmarks", "n": n, "delayMs": delay }))
                .await
        }
    });

    let responses = join_all(requests).await;

    for (n, response) in responses.into_iter().enumerate() {
        let response = assert_ok!(response);
        assert_eq!(response["echo"]["n"], n);
    }
    assert_eq!(harness.runtime.call_count(), delays.len());
    assert_eq!(harness.relay.pending_count(), 0);
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_payload_forwarded_untouched() {
    let harness = Harness::new();
    let mut rx = harness.channel.subscribe();

    let payload = json!({ "action": "saveBookmark", "bookmark": { "url": "https://rust-lang.org", "tags": ["lang"] } });
    harness
        .channel
        .post(json!({ "source": "webapp", "requestId": 7, "payload": payload.clone() }));

    let reply = next_from(&mut rx, "extension").await;
    assert_eq!(reply["requestId"], 7);
    assert_eq!(harness.runtime.calls(), vec![payload]);
}

#[tokio::test(start_paused = true)]
async fn test_forwarding_failure_replies_with_error_text() {
    let text = "Could not establish connection. Receiving end does not exist.";
    let harness = Harness::with(MockRuntime::failing(text), RelayConfig::new());
    let client = PageClient::new(harness.channel.clone()).expect("client");

    let response = assert_ok!(client.request(json!({ "action": "getBookmarks" })).await);

    assert_eq!(response, json!({ "success": false, "error": text }));
    assert_eq!(harness.relay.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failure_reply_keeps_request_id() {
    let harness = Harness::with(
        MockRuntime::failing("Extension context invalidated."),
        RelayConfig::new(),
    );
    let mut rx = harness.channel.subscribe();

    harness
        .channel
        .post(json!({ "source": "webapp", "requestId": "req-42", "payload": {} }));

    let reply = next_from(&mut rx, "extension").await;
    assert_eq!(
        reply,
        json!({
            "source": "extension",
            "requestId": "req-42",
            "response": { "success": false, "error": "Extension context invalidated." }
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_request_id_gets_two_replies() {
    let harness = Harness::new();
    let mut rx = harness.channel.subscribe();

    for _ in 0..2 {
        harness
            .channel
            .post(json!({ "source": "webapp", "requestId": "dup", "payload": { "delayMs": 10 } }));
    }

    let seen = settle(&mut rx).await;
    let replies = from_source(&seen, "extension");
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r["requestId"] == "dup"));
    assert_eq!(harness.relay.pending_count(), 0);
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_foreign_origin_ignored() {
    let harness = Harness::new();
    let mut rx = harness.channel.subscribe();

    harness.channel.post_from(
        "https://evil.example",
        json!({ "source": "webapp", "requestId": "x", "payload": { "action": "getBookmarks" } }),
    );
    harness.channel.post_from(
        "https://evil.example",
        json!({ "source": "webapp", "type": "availabilityCheck" }),
    );

    let seen = settle(&mut rx).await;
    assert!(from_source(&seen, "extension").is_empty());
    assert_eq!(harness.runtime.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_denylisted_source_ignored() {
    let config = RelayConfig::new().with_denied_source("bookmark-inspector");
    let harness = Harness::with(MockRuntime::new(), config);
    let mut rx = harness.channel.subscribe();

    harness.channel.post(
        json!({ "source": "react-devtools-content-script", "requestId": "a", "payload": {} }),
    );
    harness
        .channel
        .post(json!({ "source": "bookmark-inspector", "requestId": "b", "payload": {} }));
    harness
        .channel
        .post(json!({ "requestId": "c", "payload": {} }));

    let seen = settle(&mut rx).await;
    assert!(from_source(&seen, "extension").is_empty());
    assert_eq!(harness.runtime.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_messages_ignored() {
    let harness = Harness::new();
    let mut rx = harness.channel.subscribe();

    harness.channel.post(json!("not an object"));
    harness.channel.post(json!({ "source": "webapp" }));
    harness
        .channel
        .post(json!({ "source": "webapp", "type": "exportBookmarks" }));

    let seen = settle(&mut rx).await;
    assert!(from_source(&seen, "extension").is_empty());
    assert_eq!(harness.runtime.call_count(), 0);
}

// ============================================================================
// Availability
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_availability_answered_locally() {
    let harness = Harness::new();
    let mut rx = harness.channel.subscribe();

    harness.channel.post(PageMessage::AvailabilityCheck.to_value());

    let answer = next_from(&mut rx, "extension").await;
    assert_eq!(answer["type"], "availabilityResponse");
    assert_eq!(answer["available"], true);
    assert!(answer["timestamp"].as_u64().is_some());
    assert_eq!(harness.runtime.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_self_test_answered_locally() {
    let harness = Harness::new();
    let mut rx = harness.channel.subscribe();

    harness.channel.post(PageMessage::SelfTest.to_value());

    let answer = next_from(&mut rx, "extension").await;
    assert_eq!(answer["type"], "availabilityResponse");
    assert_eq!(harness.runtime.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_client_sees_extension() {
    let harness = Harness::new();
    let client = PageClient::new(harness.channel.clone()).expect("client");

    assert!(client.check_availability(Duration::from_millis(500)).await);
    assert_eq!(harness.runtime.call_count(), 0);
}

// ============================================================================
// Connection test
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_probe_responsive_with_bridge() {
    let harness = Harness::new();
    let bridge = PageBridge::new(harness.channel.clone()).expect("bridge");
    bridge.inject();

    let result = harness
        .relay
        .handle_runtime_message(json!({ "action": "testConnection" }))
        .await;

    assert_eq!(result, Some(json!({ "success": true, "responsive": true })));
    assert_eq!(harness.relay.active_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_probe_unresponsive_without_bridge() {
    let harness = Harness::new();
    let started = Instant::now();

    let result = harness.relay.handle_connection_test().await;

    assert_eq!(result, json!({ "success": true, "responsive": false }));
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(harness.relay.active_listeners(), 0);

    // A straggling answer after the deadline changes nothing.
    let mut rx = harness.channel.subscribe();
    harness.channel.post(
        PageMessage::ConnectionTestResponse {
            data: json!({ "responsive": true }),
        }
        .to_value(),
    );
    let seen = settle(&mut rx).await;

    assert!(from_source(&seen, "extension").is_empty());
    assert_eq!(harness.relay.active_listeners(), 0);
    assert_eq!(harness.runtime.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_connection_test_leaves_no_listener() {
    let harness = Harness::new();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        harness.relay.handle_connection_test(),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.relay.active_listeners(), 0);

    // A later answer finds nothing to satisfy and a new test still works.
    let bridge = PageBridge::new(harness.channel.clone()).expect("bridge");
    bridge.inject();
    let result = harness.relay.handle_connection_test().await;
    assert_eq!(result["responsive"], true);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_probes_each_resolve() {
    let harness = Harness::new();
    let bridge = PageBridge::new(harness.channel.clone()).expect("bridge");
    bridge.inject();

    let (a, b) = tokio::join!(
        harness.relay.handle_connection_test(),
        harness.relay.handle_connection_test()
    );

    assert_eq!(a["responsive"], true);
    assert_eq!(b["responsive"], true);
    assert_eq!(harness.relay.active_listeners(), 0);
}

// ============================================================================
// Sync acknowledgment
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sync_acknowledged_once() -> anyhow::Result<()> {
    let harness = Harness::new();
    let bridge = PageBridge::new(harness.channel.clone())?;
    let mut rx = harness.channel.subscribe();

    let reply = harness
        .relay
        .handle_runtime_message(json!({ "action": "notifyWebApp", "event": "syncRequested", "data": { "full": true } }))
        .await;
    assert_eq!(reply, Some(json!({ "success": true })));
    assert_eq!(harness.relay.pending_syncs(), 1);

    let event = next_from(&mut rx, "extension").await;
    assert_eq!(event["event"], "syncRequested");
    assert_eq!(event["data"], json!({ "full": true }));

    bridge.sync_complete(json!({ "count": 5 }));
    harness.runtime.wait_for_calls(1).await;

    bridge.sync_complete(json!({ "count": 6 }));
    settle(&mut rx).await;

    assert_eq!(
        harness.runtime.calls(),
        vec![json!({ "action": "syncComplete", "data": { "count": 5 } })]
    );
    assert_eq!(harness.relay.pending_syncs(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_sync_dropped_by_default() {
    let config = RelayConfig::new().with_sync_timeout(Duration::from_secs(1));
    let harness = Harness::with(MockRuntime::new(), config);

    harness
        .relay
        .handle_notify_web_app("syncRequested", json!({}));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(harness.runtime.call_count(), 0);
    assert_eq!(harness.relay.pending_syncs(), 0);

    // A late acknowledgment is not forwarded either.
    let mut rx = harness.channel.subscribe();
    harness.channel.post(
        PageMessage::SyncComplete {
            data: json!({ "count": 1 }),
        }
        .to_value(),
    );
    settle(&mut rx).await;
    assert_eq!(harness.runtime.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_sync_notifies_when_configured() {
    let config = RelayConfig::new()
        .with_sync_timeout(Duration::from_secs(1))
        .with_unacknowledged_sync(UnacknowledgedSync::Notify);
    let harness = Harness::with(MockRuntime::new(), config);

    harness
        .relay
        .handle_notify_web_app("syncRequested", json!({}));
    harness.runtime.wait_for_calls(1).await;

    assert_eq!(
        harness.runtime.calls(),
        vec![json!({ "action": "syncTimeout", "timeoutMs": 1000 })]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_does_not_report_sync_timeout() {
    let config = RelayConfig::new().with_unacknowledged_sync(UnacknowledgedSync::Notify);
    let harness = Harness::with(MockRuntime::new(), config);

    harness
        .relay
        .handle_notify_web_app("syncRequested", json!({}));
    assert_eq!(harness.relay.pending_syncs(), 1);

    harness.relay.shutdown();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(harness.runtime.call_count(), 0);
    assert_eq!(harness.relay.pending_syncs(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_other_events_arm_nothing() {
    let harness = Harness::new();
    let client = PageClient::new(harness.channel.clone()).expect("client");
    let mut events = client.events();

    harness
        .relay
        .handle_notify_web_app("bookmarksUpdated", json!({ "count": 2 }));

    let event = assert_ok!(events.recv().await);
    assert_eq!(event.event, "bookmarksUpdated");
    assert_eq!(event.data, json!({ "count": 2 }));
    assert_eq!(harness.relay.active_listeners(), 0);
}

// ============================================================================
// Background port
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_port_notification_reaches_page() {
    let harness = Harness::new();
    let client = PageClient::new(harness.channel.clone()).expect("client");
    let mut events = client.events();

    let port = harness.runtime.take_port().expect("port");
    assert_eq!(port.name(), "content-script");
    assert_ok!(port.post(json!({ "action": "notifyWebApp", "event": "bookmarksUpdated", "data": { "count": 9 } })));

    let event = assert_ok!(events.recv().await);
    assert_eq!(event.event, "bookmarksUpdated");
    assert_eq!(event.data["count"], 9);
}

#[tokio::test(start_paused = true)]
async fn test_port_disconnect_is_detected() {
    let harness = Harness::new();
    assert!(harness.relay.is_port_connected());

    harness.runtime.take_port().expect("port").disconnect();

    for _ in 0..20 {
        if !harness.relay.is_port_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!harness.relay.is_port_connected());

    // Request forwarding does not depend on the port.
    let client = PageClient::new(harness.channel.clone()).expect("client");
    assert_ok!(client.request(json!({ "action": "getBookmarks" })).await);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_without_port() {
    let harness = Harness::with(MockRuntime::without_port(), RelayConfig::new());
    assert!(!harness.relay.is_port_connected());

    let client = PageClient::new(harness.channel.clone()).expect("client");
    assert_ok!(client.request(json!({ "action": "getBookmarks" })).await);
}

// ============================================================================
// Page bridge
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_injection_is_idempotent() {
    let channel = WindowChannel::new(PAGE);
    let bridge = PageBridge::new(channel.clone()).expect("bridge");

    bridge.inject();
    bridge.inject();
    assert!(bridge.is_available());

    let mut rx = channel.subscribe();
    channel.post(json!({ "source": "extension", "event": "connectionTest", "data": {} }));

    let seen = settle(&mut rx).await;
    let answers: Vec<_> = from_source(&seen, "webapp")
        .into_iter()
        .filter(|m| m["type"] == "connectionTestResponse")
        .collect();
    assert_eq!(answers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready_after_inject() {
    let channel = WindowChannel::new(PAGE);
    let bridge = PageBridge::new(channel).expect("bridge");

    let waiter = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.wait_ready(Duration::from_secs(5)).await }
    });
    tokio::task::yield_now().await;
    bridge.inject();

    let timestamp = assert_ok!(waiter.await.expect("join"));
    assert_eq!(Some(timestamp), bridge.ready_timestamp());
}

#[tokio::test(start_paused = true)]
async fn test_request_without_relay_times_out() {
    let channel = WindowChannel::new(PAGE);
    let client = PageClient::new(channel).expect("client");

    let result = client
        .request_with_timeout(json!({ "action": "getBookmarks" }), Duration::from_secs(1))
        .await;

    let err = assert_err!(result);
    assert!(err.is_timeout());
}
