//! Webhook delivery contract: signed bodies, retry accounting, and the
//! management surface's view of the delivery log.

mod common;

use common::harness::{TEST_SIGNING_KEY, spawn_test_server, wait_until};
use common::http_client::TestClient;
use lifeline::events::FailoverOutcome;
use lifeline::model::InstanceId;
use lifeline::notify::{Notification, sign_body};

async fn run_simulated_failover(server: &common::harness::TestServer, client: &TestClient) {
    let instance = InstanceId::from("i-1");
    server.seed_host_slot("host-a", "slot-1");
    let (status, _) = client
        .register_instance("i-1", "host-a", "slot-1", 4, true)
        .await;
    assert_eq!(status, 201);

    let (status, _) = client.post("/v1/instances/i-1/simulate", None).await;
    assert_eq!(status, 202);

    wait_until(
        || {
            server
                .log
                .events_for(&instance)
                .iter()
                .any(|e| e.outcome == Some(FailoverOutcome::Completed))
        },
        "failover to complete",
    )
    .await;
}

#[tokio::test]
async fn test_every_delivery_carries_a_verifiable_signature() {
    let server = spawn_test_server().await.unwrap();
    let client = TestClient::new(server.url());

    run_simulated_failover(&server, &client).await;
    wait_until(
        || {
            server
                .transport
                .deliveries()
                .iter()
                .filter_map(|d| serde_json::from_slice::<Notification>(&d.body).ok())
                .any(|n| n.event == "failover.completed")
        },
        "completed notification",
    )
    .await;

    let deliveries = server.transport.deliveries();
    assert!(!deliveries.is_empty());
    for delivery in &deliveries {
        assert_eq!(
            delivery.signature,
            sign_body(TEST_SIGNING_KEY, &delivery.body),
            "signature must match the canonical body"
        );
    }
}

#[tokio::test]
async fn test_phase_notifications_arrive_in_workflow_order() {
    let server = spawn_test_server().await.unwrap();
    let client = TestClient::new(server.url());

    run_simulated_failover(&server, &client).await;
    wait_until(
        || {
            server
                .transport
                .deliveries()
                .iter()
                .filter_map(|d| serde_json::from_slice::<Notification>(&d.body).ok())
                .any(|n| n.event == "failover.completed")
        },
        "completed notification",
    )
    .await;

    let events: Vec<String> = server
        .transport
        .deliveries()
        .iter()
        .filter_map(|d| serde_json::from_slice::<Notification>(&d.body).ok())
        .map(|n| n.event)
        .collect();

    let position = |name: &str| {
        events
            .iter()
            .position(|e| e == name)
            .unwrap_or_else(|| panic!("missing {name} in {events:?}"))
    };
    assert!(position("failover.degraded") < position("failover.activating"));
    assert!(position("failover.activating") < position("failover.active_on_standby"));
    assert!(position("failover.active_on_standby") < position("failover.completed"));
}

#[tokio::test]
async fn test_transient_delivery_failure_is_retried_and_logged() {
    let server = spawn_test_server().await.unwrap();
    let client = TestClient::new(server.url());

    // First attempt of the first notification fails; the retry succeeds.
    server.transport.fail_next(1);
    run_simulated_failover(&server, &client).await;

    wait_until(
        || {
            server
                .notifier
                .records()
                .recent(usize::MAX)
                .iter()
                .any(|r| r.attempts.len() == 2)
        },
        "retried delivery record",
    )
    .await;

    let retried = server
        .notifier
        .records()
        .recent(usize::MAX)
        .into_iter()
        .find(|r| r.attempts.len() == 2)
        .unwrap();
    assert_eq!(retried.attempts[0].backoff_ms, 0);
    assert!(retried.attempts[0].error.is_some());
    assert!(retried.attempts[1].backoff_ms > 0);

    // The management surface exposes the same records.
    let (status, body) = client.get("/v1/notifications").await;
    assert_eq!(status, 200);
    let listed = body.as_array().unwrap();
    assert!(
        listed
            .iter()
            .any(|r| r["attempts"].as_array().unwrap().len() == 2)
    );
}
