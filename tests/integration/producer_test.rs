//! Producer API tests: wire round-trips and pagination.

use quirrel_entity::{EnqueueRequest, JobDto, RepeatRequest};

use crate::helpers::{self, TestApp};

const ENDPOINT: &str = "https://example.com/hooks/work";

#[tokio::test]
async fn test_job_dto_round_trips_through_enqueue() {
    let app = TestApp::new();
    let tenant = helpers::tenant();

    let job = app
        .producer
        .enqueue(
            &tenant,
            ENDPOINT,
            EnqueueRequest {
                id: Some("round".to_string()),
                body: "payload".to_string(),
                exclusive: true,
                retry: vec![100, 200],
                repeat: Some(RepeatRequest {
                    cron: Some("0 0 12 * * *".to_string()),
                    cron_timezone: Some("Europe/Berlin".to_string()),
                    times: Some(9),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Serialize the read shape and feed it back in, unchanged.
    let dto = JobDto::from_job(&job);
    let wire = serde_json::to_string(&dto).unwrap();
    let resubmit: EnqueueRequest = serde_json::from_str(&wire).unwrap();

    let second_endpoint = "https://example.com/hooks/copy";
    let copy = app
        .producer
        .enqueue(&tenant, second_endpoint, resubmit)
        .await
        .unwrap();

    assert_eq!(copy.id, job.id);
    assert_eq!(copy.payload, job.payload);
    assert_eq!(copy.exclusive, job.exclusive);
    assert_eq!(copy.retry, job.retry);
    assert_eq!(copy.schedule, job.schedule);
    // The cron engine recomputes the due time strictly after the
    // submitted base, so the copy is due no earlier than the original.
    assert!(copy.run_at >= job.run_at);
}

#[tokio::test]
async fn test_scan_pages_whole_queue_without_duplicates() {
    let app = TestApp::new();
    let tenant = helpers::tenant();

    for i in 0..7 {
        app.producer
            .enqueue(
                &tenant,
                ENDPOINT,
                EnqueueRequest {
                    id: Some(format!("job-{i}")),
                    body: format!("body {i}"),
                    delay: Some(60_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let mut collected = Vec::new();
    let mut cursor = 0;
    loop {
        let page = app
            .producer
            .scan(&tenant, ENDPOINT, cursor, Some(3))
            .await
            .unwrap();
        collected.extend(page.items.iter().map(|job| job.id.clone()));
        match page.next_cursor() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    collected.sort();
    let expected: Vec<String> = (0..7).map(|i| format!("job-{i}")).collect();
    assert_eq!(collected, expected);
}

#[tokio::test]
async fn test_scan_tenant_spans_endpoints() {
    let app = TestApp::new();
    let tenant = helpers::tenant();

    app.producer
        .enqueue(
            &tenant,
            ENDPOINT,
            EnqueueRequest {
                id: Some("a".to_string()),
                body: "a".to_string(),
                delay: Some(60_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    app.producer
        .enqueue(
            &tenant,
            "https://example.com/hooks/other",
            EnqueueRequest {
                id: Some("b".to_string()),
                body: "b".to_string(),
                delay: Some(60_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut seen = Vec::new();
    let mut cursor = 0;
    loop {
        let page = app
            .producer
            .scan_tenant(&tenant, cursor, Some(10))
            .await
            .unwrap();
        seen.extend(page.items.iter().map(|job| job.id.clone()));
        match page.next_cursor() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    seen.sort();
    assert_eq!(seen, vec!["a", "b"]);
}

#[tokio::test]
async fn test_delete_distinguishes_not_found() {
    let app = TestApp::new();
    let tenant = helpers::tenant();

    app.producer
        .enqueue(
            &tenant,
            ENDPOINT,
            EnqueueRequest {
                id: Some("once".to_string()),
                body: "x".to_string(),
                delay: Some(60_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(app
        .producer
        .delete(&tenant, ENDPOINT, "once")
        .await
        .unwrap()
        .is_some());
    assert!(app
        .producer
        .delete(&tenant, ENDPOINT, "once")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_tenants_do_not_share_queues() {
    let app = TestApp::new();
    let t1 = quirrel_core::types::TenantId::new("tenant-one");
    let t2 = quirrel_core::types::TenantId::new("tenant-two");

    app.producer
        .enqueue(
            &t1,
            ENDPOINT,
            EnqueueRequest {
                id: Some("shared-id".to_string()),
                body: "belongs to one".to_string(),
                delay: Some(60_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Same id and endpoint, different tenant: a distinct queue.
    assert!(app
        .producer
        .find_by_id(&t2, ENDPOINT, "shared-id")
        .await
        .unwrap()
        .is_none());

    let own = app
        .producer
        .enqueue(
            &t2,
            ENDPOINT,
            EnqueueRequest {
                id: Some("shared-id".to_string()),
                body: "belongs to two".to_string(),
                delay: Some(60_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(own.payload, "belongs to two");

    let one = app
        .producer
        .find_by_id(&t1, ENDPOINT, "shared-id")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one.payload, "belongs to one");
}
