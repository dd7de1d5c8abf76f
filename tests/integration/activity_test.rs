//! Activity stream tests.

use std::time::Duration;

use quirrel_entity::EnqueueRequest;

use crate::helpers::{self, CaptureServer, TestApp};

/// Drain everything currently available on a receiver.
async fn drain(rx: &mut tokio::sync::broadcast::Receiver<String>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(wire) = rx.try_recv() {
        events.push(serde_json::from_str(&wire).unwrap());
    }
    events
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    let tenant = helpers::tenant();
    let mut rx = app.activity.subscribe(&tenant).await;

    app.start_worker(TestApp::worker_config());
    // A short delay keeps the job unclaimed until the `scheduled`
    // event is on the stream.
    app.producer
        .enqueue(
            &tenant,
            &endpoint.url(),
            EnqueueRequest {
                id: Some("observed".to_string()),
                body: "payload".to_string(),
                delay: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 1
        })
        .await
    );
    // Give the completion event time to land.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = drain(&mut rx).await;
    let kinds: Vec<&str> = events
        .iter()
        .map(|event| event[0].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["scheduled", "started", "completed"]);

    // The scheduled event carries the full job; later ones a reference.
    assert_eq!(events[0][1]["id"], "observed");
    assert_eq!(events[1][1]["id"], "observed");
    assert!(events[1][1]["endpoint"].as_str().is_some());
}

#[tokio::test]
async fn test_subscriber_loss_loses_no_job_state() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    let tenant = helpers::tenant();

    // Subscribe and immediately drop the receiver.
    let rx = app.activity.subscribe(&tenant).await;
    drop(rx);

    app.start_worker(TestApp::worker_config());
    app.producer
        .enqueue(
            &tenant,
            &endpoint.url(),
            EnqueueRequest {
                id: Some("unobserved".to_string()),
                body: "payload".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Delivery proceeds as if nothing happened.
    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 1
        })
        .await
    );
}
