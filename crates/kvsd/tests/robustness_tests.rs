//! Robustness tests for the server.
//!
//! These tests check that bad input, churn and slow consumers affect only
//! the session that causes them.

mod common;

use std::time::Duration;

use common::{TestServer, RESPONSE_TIMEOUT};
use kvsd::config::ServerConfig;
use tokio::time::{timeout, Instant};

// ============================================================================
// Malformed Input
// ============================================================================

#[tokio::test]
async fn test_malformed_lines_ignored() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    for line in [
        "garbage",
        "Put",
        "Put:onlykey",
        "Get",
        "Update:k:old",
        "put:lower:case",
        ":::",
        "Frobnicate:k:v",
    ] {
        client.send_line(line).await;
    }

    // Nothing came back and the session still works
    client.put("k", "v").await;
    assert_eq!(client.get_values("k").await, vec!["v"]);
    assert_eq!(server.active().await, 1);
    assert_eq!(server.dropped().await, 0);
}

#[tokio::test]
async fn test_empty_lines_ignored() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send_raw(b"\n\n   \n\r\n").await;
    client.put("k", "v").await;

    assert_eq!(client.get_values("k").await, vec!["v"]);
}

#[tokio::test]
async fn test_invalid_utf8_does_not_break_session() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send_raw(b"Put:bin:\xff\xfeok\n\xc3\x28\n").await;
    client.put("k", "v").await;

    assert_eq!(client.get_values("bin").await.len(), 1);
    assert_eq!(client.get_values("k").await, vec!["v"]);
}

#[tokio::test]
async fn test_oversized_line_discarded() {
    let config = ServerConfig {
        max_line_length: 128,
        ..Default::default()
    };
    let server = TestServer::spawn_with_config(config).await;
    let mut client = server.connect().await;

    let huge = format!("Put:big:{}", "x".repeat(4096));
    client.send_line(&huge).await;
    client.put("small", "fits").await;

    assert!(client.get_all("big").await.is_empty());
    assert_eq!(client.get_values("small").await, vec!["fits"]);
    assert_eq!(server.dropped().await, 0);
}

#[tokio::test]
async fn test_client_continues_after_errors() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    for i in 0..10 {
        client.send_line("not a request").await;
        client.put("k", &i.to_string()).await;
    }

    assert_eq!(client.get_values("k").await.len(), 10);
}

// ============================================================================
// Connection Churn
// ============================================================================

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn().await;

    const N: usize = 20;
    for _ in 0..N {
        let client = server.connect().await;
        drop(client);
    }

    server.wait_for_dropped(N).await;
    assert_eq!(server.active().await, 0);
}

#[tokio::test]
async fn test_many_concurrent_connections() {
    let server = TestServer::spawn().await;

    const N: usize = 25;
    let mut clients = Vec::with_capacity(N);
    for _ in 0..N {
        clients.push(server.connect().await);
    }
    server.wait_for_active(N).await;

    let tasks: Vec<_> = clients
        .into_iter()
        .enumerate()
        .map(|(i, mut client)| {
            tokio::spawn(async move {
                let key = format!("key-{i}");
                for j in 0..10 {
                    client.put(&key, &j.to_string()).await;
                }
                let values = client.get_values(&key).await;
                assert_eq!(values.len(), 10);
                client
            })
        })
        .collect();

    let mut clients = Vec::with_capacity(N);
    for task in tasks {
        clients.push(task.await.unwrap());
    }
    assert_eq!(server.active().await, N);

    drop(clients);
    server.wait_for_active(0).await;
    assert_eq!(server.dropped().await, N);
}

#[tokio::test]
async fn test_disconnect_with_pending_output() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    server.wait_for_active(1).await;

    for i in 0..100 {
        client.put("k", &i.to_string()).await;
    }
    // Ask for output and leave without reading it
    client.send_line("Get:k").await;
    drop(client);

    server.wait_for_dropped(1).await;
    assert_eq!(server.active().await, 0);

    let mut other = server.connect().await;
    assert_eq!(other.get_values("k").await.len(), 100);
}

// ============================================================================
// Slow Consumers
// ============================================================================

#[tokio::test]
async fn test_slow_consumer_does_not_stall_others() {
    let server = TestServer::spawn().await;
    let mut slow = server.connect().await;
    let mut fast = server.connect().await;
    server.wait_for_active(2).await;

    // Enough output to fill the socket buffers and the 500-line mailbox
    let padding = "p".repeat(200);
    for i in 0..1000 {
        slow.put("flood", &format!("{i}-{padding}")).await;
    }
    for _ in 0..20 {
        slow.send_line("Get:flood").await;
    }

    let start = Instant::now();
    let result = timeout(Duration::from_secs(2), async {
        fast.put("user", "alice").await;
        fast.get_values("user").await
    })
    .await
    .expect("fast client answered while slow client is saturated");

    assert_eq!(result, vec!["alice"]);
    assert!(start.elapsed() < RESPONSE_TIMEOUT);

    // The slow client is still registered; it is only losing output
    assert_eq!(server.active().await, 2);
    drop(slow);
    server.wait_for_active(1).await;
}
