//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use checkout_telemetry::config::ServiceConfig;
use checkout_telemetry::lifecycle::{Service, Shutdown, StartupError};
use checkout_telemetry::Telemetry;

pub const INTAKE_PATH: &str = "/intake/v2/events";

type StatusFn = dyn Fn(usize) -> u16 + Send + Sync;

#[derive(Clone)]
struct CollectorState {
    status_for: Arc<StatusFn>,
    calls: Arc<AtomicUsize>,
    accepted: Arc<Mutex<Vec<String>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
}

/// A mock telemetry collector. The response status of the n-th call
/// (0-based) is chosen by the function given to [`start_collector`]; only
/// payloads answered with 2xx are kept.
pub struct MockCollector {
    pub addr: SocketAddr,
    state: CollectorState,
}

impl MockCollector {
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, INTAKE_PATH)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<String> {
        self.state.accepted.lock().unwrap().clone()
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.state.auth_headers.lock().unwrap().clone()
    }

    /// Every accepted event in arrival order, metadata lines removed.
    pub fn events(&self) -> Vec<Value> {
        self.payloads()
            .iter()
            .flat_map(|payload| {
                payload
                    .lines()
                    .skip(1)
                    .map(|line| serde_json::from_str::<Value>(line).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Accepted events of one kind (`log`, `error`, `transaction`), unwrapped.
    pub fn events_of(&self, kind: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|mut event| event.get_mut(kind).map(Value::take))
            .collect()
    }
}

async fn intake(State(state): State<CollectorState>, headers: HeaderMap, body: String) -> StatusCode {
    let call = state.calls.fetch_add(1, Ordering::SeqCst);
    state.auth_headers.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    );

    let status = StatusCode::from_u16((state.status_for)(call)).unwrap();
    if status.is_success() {
        state.accepted.lock().unwrap().push(body);
    }
    status
}

/// Start a programmable collector on an ephemeral port.
pub async fn start_collector<F>(status_for: F) -> MockCollector
where
    F: Fn(usize) -> u16 + Send + Sync + 'static,
{
    let state = CollectorState {
        status_for: Arc::new(status_for),
        calls: Arc::new(AtomicUsize::new(0)),
        accepted: Arc::new(Mutex::new(Vec::new())),
        auth_headers: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route(INTAKE_PATH, post(intake))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockCollector { addr, state }
}

/// A collector that accepts everything.
pub async fn start_accepting_collector() -> MockCollector {
    start_collector(|_| 200).await
}

/// Service settings suited to tests: ephemeral port, fast batching and retries.
pub fn test_config(collector_url: Option<String>) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.metrics_enabled = false;
    config.telemetry.collector_url = collector_url;
    config.telemetry.service_name = "checkout-test".into();
    config.telemetry.environment = "test".into();
    config.telemetry.batch_max_wait_ms = 20;
    config.telemetry.retry.base_delay_ms = 10;
    config.telemetry.retry.max_delay_ms = 50;
    config.telemetry.shutdown_deadline_ms = 3_000;
    config
}

/// A service running in the background.
pub struct RunningService {
    pub addr: SocketAddr,
    pub telemetry: Telemetry,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), StartupError>>,
}

impl RunningService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the server and wait for the telemetry flush.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("service did not stop")
            .unwrap()
            .unwrap();
    }
}

pub async fn start_service(config: ServiceConfig) -> RunningService {
    let service = Service::build(&config).unwrap();
    let telemetry = service.telemetry().clone();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let task = tokio::spawn(service.run(listener, rx));

    RunningService {
        addr,
        telemetry,
        shutdown,
        task,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
