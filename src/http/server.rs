//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, tracing, timeout, correlation)
//! - Serve until the shutdown signal fires

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::http::checkout::checkout;
use crate::http::middleware::correlation_middleware;
use crate::http::status::{healthz, telemetry_stats};
use crate::telemetry::Telemetry;

/// Application state injected into handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub telemetry: Telemetry,
}

/// HTTP server for the checkout service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ListenerConfig, telemetry: Telemetry) -> Self {
        let router = Self::build_router(config, AppState { telemetry });
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Only business routes run under the correlation middleware, so probes
    /// and stats scrapes do not produce transactions.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        let traced = Router::new()
            .route("/checkout", post(checkout))
            .route_layer(middleware::from_fn_with_state(
                state.telemetry.clone(),
                correlation_middleware,
            ));

        Router::new()
            .merge(traced)
            .route("/healthz", get(healthz))
            .route("/telemetry/stats", get(telemetry_stats))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` fires, then drain
    /// in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server shutting down");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::telemetry::{FieldValue, Level, OverflowPolicy, ShipperQueue, TelemetryEvent};

    fn server() -> (HttpServer, Arc<ShipperQueue<TelemetryEvent>>) {
        let queue = Arc::new(ShipperQueue::new(256, OverflowPolicy::DropOldest));
        let telemetry = Telemetry::detached("checkout", Level::Debug, queue.clone());
        (HttpServer::new(&ListenerConfig::default(), telemetry), queue)
    }

    fn checkout_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/checkout")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_checkout_example() {
        let (server, queue) = server();
        let response = server
            .router()
            .oneshot(checkout_request(
                r#"{"username":"7","email":"7@email.domain","cost_spend":7,"item_count":1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("traceparent"));

        let body = json_body(response).await;
        assert_eq!(body["billing_amount"], 7.0);
        assert_eq!(body["username"], "7");
        assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());

        let events = queue.drain_up_to(usize::MAX);
        let transaction = events
            .iter()
            .find_map(|e| match e {
                TelemetryEvent::Transaction(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(transaction.name, "POST /checkout");
        assert_eq!(transaction.result, "HTTP 2xx");

        // Every event of the request shares one transaction.
        let ids: std::collections::HashSet<_> = events
            .iter()
            .map(|e| e.correlation().transaction_id().to_owned())
            .collect();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_cost_is_bad_request() {
        let (server, queue) = server();
        let response = server
            .router()
            .oneshot(checkout_request(r#"{"username":"7","item_count":1}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("cost_spend"));

        let events = queue.drain_up_to(usize::MAX);
        assert!(events.iter().any(|e| matches!(
            e,
            TelemetryEvent::Error(err) if err.error_kind == "InvalidPurchase"
        )));

        let record = events
            .iter()
            .find_map(|e| match e {
                TelemetryEvent::Log(r) if r.level == Level::Error => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(record.message, "Billing failed");
        assert_eq!(record.fields["username"], FieldValue::Str("7".into()));
        assert_eq!(record.fields["item_count"], FieldValue::Int(1));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let (server, _queue) = server();
        for body in ["{not json", r#"{"cost_spend":1,"item_count":1}"#] {
            let response = server.router().oneshot(checkout_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
    }

    #[tokio::test]
    async fn test_traceparent_is_continued() {
        let (server, _queue) = server();
        let mut request = checkout_request(r#"{"username":"a","cost_spend":2.5,"item_count":2}"#);
        request.headers_mut().insert(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".parse().unwrap(),
        );

        let response = server.router().oneshot(request).await.unwrap();
        let header = response.headers()["traceparent"].to_str().unwrap().to_owned();
        assert!(header.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));
        assert_eq!(json_body(response).await["billing_amount"], 5.0);
    }

    #[tokio::test]
    async fn test_status_endpoints_do_not_record_transactions() {
        let (server, queue) = server();
        let response = server
            .router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");

        let response = server
            .router()
            .oneshot(Request::get("/telemetry/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["queue_capacity"], 256);
        assert!(queue.is_empty());
    }
}
