//! Throttling middleware.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

use super::identifier::client_identifier;
use crate::ratelimit::{Decision, EndpointClassifier, RateLimiter};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// Shared state for the throttling middleware.
#[derive(Clone)]
pub struct ThrottleState {
    limiter: Arc<RateLimiter>,
    classifier: Arc<EndpointClassifier>,
    enabled: bool,
}

impl ThrottleState {
    pub fn new(limiter: Arc<RateLimiter>, classifier: Arc<EndpointClassifier>) -> Self {
        Self {
            limiter,
            classifier,
            enabled: true,
        }
    }

    /// Turn throttling off entirely; every request passes through untouched.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// JSON body of a rejected request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: &'static str,
    message: &'static str,
    retry_after: u64,
}

/// Wrap every route of `router` with the throttling middleware.
pub fn protect(router: Router, state: ThrottleState) -> Router {
    router.layer(middleware::from_fn_with_state(state, throttle))
}

fn is_exempt(path: &str) -> bool {
    path == "/health" || path.starts_with("/health/")
}

/// Classify the request, check its caller's quota and either reject it with
/// `429 Too Many Requests` or run the inner handler and annotate its response.
///
/// Storage problems never surface here: the limiter answers with an allowed
/// decision when it cannot read its counters.
#[instrument(skip_all, fields(endpoint = %request.uri().path()))]
pub async fn throttle(
    State(state): State<ThrottleState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !state.enabled || is_exempt(path) {
        return next.run(request).await;
    }

    let policy = state.classifier.classify(path).to_string();
    let identifier = client_identifier(request.headers());

    trace!(policy = %policy, identifier = %identifier, "Checking request quota");

    let decision = state.limiter.check_limit(&identifier, &policy).await;

    if !decision.allowed {
        let retry_after = decision.retry_after_secs(state.limiter.now_ms());
        debug!(
            policy = %policy,
            limit = decision.limit,
            retry_after = retry_after,
            "Request throttled"
        );
        return rejection(&decision, retry_after);
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

fn rejection(decision: &Decision, retry_after: u64) -> Response {
    let body = RejectionBody {
        error: "Too many requests",
        message: "Rate limit exceeded. Please try again later.",
        retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    apply_headers(headers, decision);
    headers.insert(RETRY_AFTER_HEADER, HeaderValue::from(retry_after));
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::ratelimit::{
        CounterRecord, CounterStore, EndpointRule, ManualClock, PolicyCatalog, PolicyConfig,
    };
    use crate::store::BoundedMemoryCounterStore;
    use async_trait::async_trait;
    use axum::{body::Body, routing::get};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    const START: i64 = 1_700_000_000_000;

    fn test_catalog() -> PolicyCatalog {
        let mut configs = HashMap::new();
        configs.insert("auth".to_string(), PolicyConfig::new(2, 60));
        configs.insert("public".to_string(), PolicyConfig::new(100, 60));
        PolicyCatalog::from_config(&configs).unwrap()
    }

    fn test_state(store: Arc<dyn CounterStore>, clock: Arc<ManualClock>) -> ThrottleState {
        let catalog = test_catalog();
        let classifier =
            EndpointClassifier::new(&[EndpointRule::new("/api/auth/*", "auth")], &catalog)
                .unwrap();
        let limiter = RateLimiter::new(store, catalog).with_clock(clock);
        ThrottleState::new(Arc::new(limiter), Arc::new(classifier))
    }

    fn test_app(state: ThrottleState, hits: Arc<AtomicUsize>) -> Router {
        let router = Router::new()
            .route(
                "/api/auth/login",
                get(move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        "welcome"
                    }
                }),
            )
            .route("/api/things", get(|| async { "things" }))
            .route("/health", get(|| async { "ok" }));
        protect(router, state)
    }

    fn request(path: &str, ip: &str) -> Request {
        Request::builder()
            .uri(path)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn header<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers()[name].to_str().unwrap()
    }

    fn memory_app() -> (Router, Arc<ManualClock>, Arc<AtomicUsize>) {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(BoundedMemoryCounterStore::new(100).with_clock(clock.clone()));
        let hits = Arc::new(AtomicUsize::new(0));
        let app = test_app(test_state(store, clock.clone()), hits.clone());
        (app, clock, hits)
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<CounterRecord>, StoreError> {
            Err(StoreError::Timeout(Duration::from_millis(250)))
        }

        async fn set(
            &self,
            _key: &str,
            _record: CounterRecord,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".into()))
        }

        async fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn test_allowed_response_carries_headers() {
        let (app, _clock, hits) = memory_app();

        let response = app.oneshot(request("/api/auth/login", "1.2.3.4")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), "2");
        assert_eq!(header(&response, "x-ratelimit-remaining"), "1");
        assert_eq!(
            header(&response, "x-ratelimit-reset"),
            (START + 60_000).to_string()
        );
        assert!(response.headers().get("retry-after").is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_over_limit_is_rejected_without_running_handler() {
        let (app, clock, hits) = memory_app();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("/api/auth/login", "1.2.3.4"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        clock.advance_ms(15_500);
        let response = app
            .clone()
            .oneshot(request("/api/auth/login", "1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(header(&response, "x-ratelimit-limit"), "2");
        assert_eq!(header(&response, "x-ratelimit-remaining"), "0");
        assert_eq!(
            header(&response, "x-ratelimit-reset"),
            (START + 60_000).to_string()
        );
        assert_eq!(header(&response, "retry-after"), "45");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": "Too many requests",
                "message": "Rate limit exceeded. Please try again later.",
                "retryAfter": 45
            })
        );
    }

    #[tokio::test]
    async fn test_callers_do_not_interfere() {
        let (app, _clock, _hits) = memory_app();

        for _ in 0..3 {
            app.clone()
                .oneshot(request("/api/auth/login", "1.2.3.4"))
                .await
                .unwrap();
        }

        let response = app.oneshot(request("/api/auth/login", "5.6.7.8")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-remaining"), "1");
    }

    #[tokio::test]
    async fn test_unmatched_path_uses_default_policy() {
        let (app, _clock, _hits) = memory_app();

        let response = app.oneshot(request("/api/things", "1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), "100");
        assert_eq!(header(&response, "x-ratelimit-remaining"), "99");
    }

    #[tokio::test]
    async fn test_health_is_not_throttled() {
        let (app, _clock, _hits) = memory_app();

        let response = app.oneshot(request("/health", "1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_storage_outage_fails_open() {
        let clock = Arc::new(ManualClock::new(START));
        let hits = Arc::new(AtomicUsize::new(0));
        let app = test_app(test_state(Arc::new(BrokenStore), clock), hits.clone());

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request("/api/auth/login", "1.2.3.4"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_disabled_passes_everything() {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(BoundedMemoryCounterStore::new(100).with_clock(clock.clone()));
        let hits = Arc::new(AtomicUsize::new(0));
        let app = test_app(test_state(store, clock).enabled(false), hits.clone());

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request("/api/auth/login", "1.2.3.4"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn test_anonymous_callers_share_a_counter() {
        let (app, _clock, _hits) = memory_app();

        let anonymous = || {
            Request::builder()
                .uri("/api/auth/login")
                .body(Body::empty())
                .unwrap()
        };

        app.clone().oneshot(anonymous()).await.unwrap();
        app.clone().oneshot(anonymous()).await.unwrap();
        let response = app.oneshot(anonymous()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
