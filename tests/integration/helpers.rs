//! Shared test fixtures.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tokio::sync::{watch, Mutex};

use quirrel_core::config::producer::ProducerConfig;
use quirrel_core::config::signing::SigningConfig;
use quirrel_core::config::worker::{IncidentReceiverConfig, WorkerConfig};
use quirrel_core::types::TenantId;
use quirrel_producer::Producer;
use quirrel_realtime::ActivityPublisher;
use quirrel_store::memory::MemoryJobStore;
use quirrel_store::JobStore;
use quirrel_worker::{DeliveryWorker, Dispatcher, IncidentReporter, PayloadSigner};

/// One request the capture endpoint received.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Raw request body.
    pub body: String,
    /// `x-quirrel-signature` header, if present.
    pub signature: Option<String>,
    /// Parsed `x-quirrel-meta` header, if present.
    pub meta: Option<serde_json::Value>,
    /// When the handler started.
    pub started: Instant,
    /// When the handler finished.
    pub finished: Instant,
}

struct CaptureState {
    hits: Mutex<Vec<Hit>>,
    /// Scripted response statuses, consumed front to back; empty →
    /// `default_status`.
    script: Mutex<VecDeque<u16>>,
    default_status: u16,
    /// Artificial handler latency, for overlap detection.
    delay: Duration,
}

/// A local HTTP listener standing in for a remote job endpoint (or the
/// incident receiver).
pub struct CaptureServer {
    addr: SocketAddr,
    state: Arc<CaptureState>,
}

impl CaptureServer {
    /// Start a server that always answers `status`.
    pub async fn with_status(status: u16) -> Self {
        Self::start(status, Vec::new(), Duration::ZERO).await
    }

    /// Start a server that answers 200.
    pub async fn ok() -> Self {
        Self::with_status(200).await
    }

    /// Start a server that answers 200 after holding each request for
    /// `delay`.
    pub async fn slow(delay: Duration) -> Self {
        Self::start(200, Vec::new(), delay).await
    }

    /// Start a server that plays `script` front to back, then falls
    /// back to `default_status`.
    pub async fn scripted(default_status: u16, script: Vec<u16>) -> Self {
        Self::start(default_status, script, Duration::ZERO).await
    }

    async fn start(default_status: u16, script: Vec<u16>, delay: Duration) -> Self {
        let state = Arc::new(CaptureState {
            hits: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            default_status,
            delay,
        });

        let app = Router::new()
            .route("/hook", post(capture_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// The endpoint URL jobs should be enqueued against.
    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    /// Snapshot of everything received so far.
    pub async fn hits(&self) -> Vec<Hit> {
        self.state.hits.lock().await.clone()
    }

    /// Number of requests received so far.
    pub async fn hit_count(&self) -> usize {
        self.state.hits.lock().await.len()
    }
}

async fn capture_handler(
    State(state): State<Arc<CaptureState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let started = Instant::now();
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let hit = Hit {
        body: String::from_utf8_lossy(&body).into_owned(),
        signature: headers
            .get("x-quirrel-signature")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        meta: headers
            .get("x-quirrel-meta")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| serde_json::from_str(v).ok()),
        started,
        finished: Instant::now(),
    };
    state.hits.lock().await.push(hit);

    let status = state
        .script
        .lock()
        .await
        .pop_front()
        .unwrap_or(state.default_status);
    (StatusCode::from_u16(status).unwrap(), String::new())
}

/// Producer + worker wired against one in-memory store.
pub struct TestApp {
    pub store: Arc<dyn JobStore>,
    pub producer: Producer,
    pub activity: Arc<ActivityPublisher>,
    shutdown: Option<watch::Sender<bool>>,
}

impl TestApp {
    /// Create an app with no worker running.
    pub fn new() -> Self {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let activity = Arc::new(ActivityPublisher::new(64));
        let producer = Producer::new(
            Arc::clone(&store),
            Arc::clone(&activity),
            ProducerConfig::default(),
        );
        Self {
            store,
            producer,
            activity,
            shutdown: None,
        }
    }

    /// Test worker configuration: fast polls, small batches.
    pub fn worker_config() -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            concurrency: 16,
            poll_interval_ms: 20,
            claim_batch_size: 100,
            request_timeout_seconds: 5,
            lease_seconds: 60,
            ssrf_guard: false,
            incident_receiver: None,
        }
    }

    /// Start a delivery worker; shut down on drop.
    pub fn start_worker(&mut self, config: WorkerConfig) {
        let signer = PayloadSigner::from_config(&SigningConfig::default()).unwrap();
        let dispatcher = Dispatcher::new(Arc::clone(&self.store), signer, &config).unwrap();

        let mut worker = DeliveryWorker::new(
            Arc::clone(&self.store),
            dispatcher,
            Arc::clone(&self.activity),
            config.clone(),
        );
        if let Some(receiver) = &config.incident_receiver {
            worker = worker.with_incidents(IncidentReporter::new(receiver).unwrap());
        }

        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);
        tokio::spawn(async move {
            worker.run(rx).await;
        });
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(shutdown) = &self.shutdown {
            let _ = shutdown.send(true);
        }
    }
}

/// The tenant used by most tests.
pub fn tenant() -> TenantId {
    TenantId::new("test-tenant")
}

/// Incident receiver config pointing at a capture server.
pub fn incident_receiver(server: &CaptureServer) -> IncidentReceiverConfig {
    IncidentReceiverConfig {
        endpoint: server.url(),
        passphrase: "incident-pass".to_string(),
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
