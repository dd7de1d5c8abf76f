//! Delivery pipeline tests: dispatch, repetition, retries, incidents,
//! exclusivity.

use std::time::Duration;

use quirrel_entity::{EnqueueRequest, RepeatRequest};
use quirrel_store::JobStore;
use quirrel_worker::signing::verify_hmac;

use crate::helpers::{self, CaptureServer, TestApp};

fn request(id: &str, body: &str) -> EnqueueRequest {
    EnqueueRequest {
        id: Some(id.to_string()),
        body: body.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_delivers_signed_payload_and_deletes_job() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    app.start_worker(TestApp::worker_config());
    let tenant = helpers::tenant();

    app.producer
        .enqueue(&tenant, &endpoint.url(), request("j1", "hello world"))
        .await
        .unwrap();

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 1
        })
        .await,
        "job was never delivered"
    );

    let hits = endpoint.hits().await;
    assert_eq!(hits[0].body, "hello world");

    // Signed with the fallback secret: the tenant has no token.
    let signature = hits[0].signature.as_deref().expect("signature header");
    assert!(verify_hmac("quirrel", b"hello world", signature));

    let meta = hits[0].meta.as_ref().expect("meta header");
    assert_eq!(meta["id"], "j1");
    assert_eq!(meta["count"], 1);
    assert_eq!(meta["exclusive"], false);
    assert!(meta["nextRepetition"].is_null());

    // One-shot job is gone after success.
    assert!(
        helpers::wait_until(Duration::from_secs(2), || async {
            app.producer
                .find_by_id(&tenant, &endpoint.url(), "j1")
                .await
                .unwrap()
                .is_none()
        })
        .await
    );
}

#[tokio::test]
async fn test_tenant_token_signs_payload() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    let tenant = helpers::tenant();
    app.store.put_token("tenant-secret", &tenant).await.unwrap();
    app.start_worker(TestApp::worker_config());

    app.producer
        .enqueue(&tenant, &endpoint.url(), request("j1", "payload"))
        .await
        .unwrap();

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 1
        })
        .await
    );

    let hits = endpoint.hits().await;
    let signature = hits[0].signature.as_deref().unwrap();
    assert!(verify_hmac("tenant-secret", b"payload", signature));
    assert!(!verify_hmac("quirrel", b"payload", signature));
}

#[tokio::test]
async fn test_repeat_bound_executes_exactly_times() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    app.start_worker(TestApp::worker_config());
    let tenant = helpers::tenant();

    app.producer
        .enqueue(
            &tenant,
            &endpoint.url(),
            EnqueueRequest {
                repeat: Some(RepeatRequest {
                    every: Some(40),
                    times: Some(3),
                    ..Default::default()
                }),
                ..request("rep", "tick")
            },
        )
        .await
        .unwrap();

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 3
        })
        .await,
        "repetitions never completed"
    );

    // The job is deleted after the third execution...
    assert!(
        helpers::wait_until(Duration::from_secs(2), || async {
            app.producer
                .find_by_id(&tenant, &endpoint.url(), "rep")
                .await
                .unwrap()
                .is_none()
        })
        .await
    );

    // ...and a settling period produces no fourth delivery.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(endpoint.hit_count().await, 3);
}

#[tokio::test]
async fn test_retry_exhaustion_attempts_and_single_incident() {
    let endpoint = CaptureServer::with_status(500).await;
    let incidents = CaptureServer::ok().await;

    let mut app = TestApp::new();
    let mut config = TestApp::worker_config();
    config.incident_receiver = Some(helpers::incident_receiver(&incidents));
    app.start_worker(config);
    let tenant = helpers::tenant();

    app.producer
        .enqueue(
            &tenant,
            &endpoint.url(),
            EnqueueRequest {
                retry: vec![10, 50, 100],
                ..request("flaky", "doomed")
            },
        )
        .await
        .unwrap();

    // 1 initial attempt + 3 retries.
    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 4
        })
        .await,
        "retries never exhausted"
    );

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            incidents.hit_count().await >= 1
        })
        .await,
        "incident never forwarded"
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(endpoint.hit_count().await, 4, "more attempts than retry plan allows");
    assert_eq!(incidents.hit_count().await, 1, "expected exactly one incident");

    let report: serde_json::Value =
        serde_json::from_str(&incidents.hits().await[0].body).unwrap();
    assert_eq!(report["type"], "incident");
    assert_eq!(report["job"]["id"], "flaky");
    assert_eq!(report["incident"]["status"], 500);

    assert!(app
        .producer
        .find_by_id(&tenant, &endpoint.url(), "flaky")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_404_terminates_repetition() {
    let endpoint = CaptureServer::with_status(404).await;
    let incidents = CaptureServer::ok().await;

    let mut app = TestApp::new();
    let mut config = TestApp::worker_config();
    config.incident_receiver = Some(helpers::incident_receiver(&incidents));
    app.start_worker(config);
    let tenant = helpers::tenant();

    app.producer
        .enqueue(
            &tenant,
            &endpoint.url(),
            EnqueueRequest {
                repeat: Some(RepeatRequest {
                    every: Some(30),
                    times: Some(10),
                    ..Default::default()
                }),
                ..request("rep404", "tick")
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

    // The single 404 ends the repetition even with executions left.
    assert!(
        helpers::wait_until(Duration::from_secs(2), || async {
            app.producer
                .find_by_id(&tenant, &endpoint.url(), "rep404")
                .await
                .unwrap()
                .is_none()
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(endpoint.hit_count().await, 1);
    assert_eq!(incidents.hit_count().await, 1);
}

#[tokio::test]
async fn test_exclusive_jobs_never_overlap() {
    let endpoint = CaptureServer::slow(Duration::from_millis(100)).await;
    let mut app = TestApp::new();
    app.start_worker(TestApp::worker_config());
    let tenant = helpers::tenant();

    for i in 0..3 {
        app.producer
            .enqueue(
                &tenant,
                &endpoint.url(),
                EnqueueRequest {
                    exclusive: true,
                    ..request(&format!("ex{i}"), "serial")
                },
            )
            .await
            .unwrap();
    }

    assert!(
        helpers::wait_until(Duration::from_secs(10), || async {
            endpoint.hit_count().await >= 3
        })
        .await,
        "exclusive jobs never all ran"
    );

    let mut hits = endpoint.hits().await;
    hits.sort_by_key(|hit| hit.started);
    for window in hits.windows(2) {
        assert!(
            window[1].started >= window[0].finished,
            "exclusive executions overlapped"
        );
    }
}

#[tokio::test]
async fn test_non_exclusive_jobs_run_concurrently() {
    let endpoint = CaptureServer::slow(Duration::from_millis(150)).await;
    let mut app = TestApp::new();
    app.start_worker(TestApp::worker_config());
    let tenant = helpers::tenant();

    for i in 0..3 {
        app.producer
            .enqueue(&tenant, &endpoint.url(), request(&format!("par{i}"), "parallel"))
            .await
            .unwrap();
    }

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 3
        })
        .await
    );

    let mut hits = endpoint.hits().await;
    hits.sort_by_key(|hit| hit.started);
    // At least one pair overlapped: claimed in one batch, dispatched
    // on separate tasks.
    let overlapped = hits
        .windows(2)
        .any(|window| window[1].started < window[0].finished);
    assert!(overlapped, "parallel dispatches were serialized");
}

#[tokio::test]
async fn test_invoke_forces_immediate_delivery() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    app.start_worker(TestApp::worker_config());
    let tenant = helpers::tenant();

    app.producer
        .enqueue(
            &tenant,
            &endpoint.url(),
            EnqueueRequest {
                delay: Some(3_600_000),
                ..request("later", "early bird")
            },
        )
        .await
        .unwrap();

    // Not due for an hour: nothing delivered.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(endpoint.hit_count().await, 0);

    app.producer
        .invoke(&tenant, &endpoint.url(), "later")
        .await
        .unwrap()
        .expect("job exists");

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 1
        })
        .await,
        "invoked job was not delivered"
    );
    assert_eq!(endpoint.hits().await[0].body, "early bird");
}

#[tokio::test]
async fn test_delete_cancels_pending_job() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    app.start_worker(TestApp::worker_config());
    let tenant = helpers::tenant();

    app.producer
        .enqueue(
            &tenant,
            &endpoint.url(),
            EnqueueRequest {
                delay: Some(500),
                ..request("doomed", "never sent")
            },
        )
        .await
        .unwrap();

    let removed = app
        .producer
        .delete(&tenant, &endpoint.url(), "doomed")
        .await
        .unwrap();
    assert!(removed.is_some());

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(endpoint.hit_count().await, 0);
}

#[tokio::test]
async fn test_successful_dispatch_meters_usage() {
    let endpoint = CaptureServer::ok().await;
    let mut app = TestApp::new();
    app.start_worker(TestApp::worker_config());
    let tenant = helpers::tenant();

    app.producer
        .enqueue(&tenant, &endpoint.url(), request("m1", "a"))
        .await
        .unwrap();
    app.producer
        .enqueue(&tenant, &endpoint.url(), request("m2", "b"))
        .await
        .unwrap();

    assert!(
        helpers::wait_until(Duration::from_secs(5), || async {
            endpoint.hit_count().await >= 2
        })
        .await
    );

    let usage = app.store.read_and_reset_usage().await.unwrap();
    assert_eq!(usage, vec![(tenant, 2)]);
}
