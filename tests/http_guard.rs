use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use futures::future::join_all;
use ingress_guard::http::{router, GuardState, TOO_MANY_REQUESTS_BODY};
use ingress_guard::ratelimit::{LimiterSettings, ManualClock, RateLimiter};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn setup(max_requests: u64) -> (Router, Arc<RateLimiter>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let settings = LimiterSettings {
        max_requests_per_window: max_requests,
        ..Default::default()
    };
    let limiter = Arc::new(RateLimiter::with_clock(settings, clock.clone()));
    let app = router(GuardState::new(limiter.clone(), true));
    (app, limiter, clock)
}

fn check_from(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("peer addr");
    let mut builder = Request::builder()
        .method("GET")
        .uri("/check")
        .extension(ConnectInfo(addr));
    if let Some(value) = forwarded_for {
        builder = builder.header("x-forwarded-for", value);
    }
    builder.body(Body::empty()).expect("request")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn check_admits_until_threshold_then_rejects() {
    let (app, limiter, _clock) = setup(3);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(check_from("10.0.0.1:4000", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = app
        .clone()
        .oneshot(check_from("10.0.0.1:4000", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get(header::RETRY_AFTER).expect("retry-after"),
        "600"
    );
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .expect("content-type")
        .to_str()
        .expect("ascii")
        .starts_with("text/plain"));
    assert_eq!(body_string(response).await, TOO_MANY_REQUESTS_BODY);

    assert_eq!(limiter.blocks_issued(), 1);
}

#[tokio::test]
async fn forwarded_for_identity_is_used() {
    let (app, limiter, _clock) = setup(1);

    let response = app
        .clone()
        .oneshot(check_from("10.0.0.1:4000", Some("203.0.113.5, 10.0.0.1")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(limiter.request_count("203.0.113.5"), Some(1));
    assert_eq!(limiter.request_count("10.0.0.1"), None);

    // Same proxy peer, different original client.
    let response = app
        .clone()
        .oneshot(check_from("10.0.0.1:4000", Some("203.0.113.6")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn blocked_client_does_not_affect_others() {
    let (app, _limiter, _clock) = setup(1);

    app.clone()
        .oneshot(check_from("10.0.0.1:4000", None))
        .await
        .expect("response");
    let blocked = app
        .clone()
        .oneshot(check_from("10.0.0.1:4001", None))
        .await
        .expect("response");
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app
        .clone()
        .oneshot(check_from("10.0.0.2:4000", None))
        .await
        .expect("response");
    assert_eq!(other.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn block_lifts_after_expiration_and_reset() {
    let (app, limiter, clock) = setup(1);

    app.clone()
        .oneshot(check_from("10.0.0.1:4000", None))
        .await
        .expect("response");
    let response = app
        .clone()
        .oneshot(check_from("10.0.0.1:4000", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    limiter.reset();
    clock.advance(Duration::from_secs(599));
    let response = app
        .clone()
        .oneshot(check_from("10.0.0.1:4000", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get(header::RETRY_AFTER).expect("retry-after"),
        "1"
    );

    clock.advance(Duration::from_secs(1));
    let response = app
        .clone()
        .oneshot(check_from("10.0.0.1:4000", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_paths_are_rate_limited() {
    let (app, limiter, _clock) = setup(1);

    let request = Request::builder()
        .uri("/bookings")
        .extension(ConnectInfo("10.0.0.1:4000".parse::<SocketAddr>().unwrap()))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(limiter.request_count("10.0.0.1"), Some(1));

    let request = Request::builder()
        .uri("/bookings")
        .extension(ConnectInfo("10.0.0.1:4000".parse::<SocketAddr>().unwrap()))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn missing_connect_info_uses_unknown_identity() {
    let (app, limiter, _clock) = setup(5);

    let request = Request::builder()
        .uri("/check")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(limiter.request_count("unknown"), Some(1));
}

fn get_from(uri: &str, peer: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .extension(ConnectInfo(peer.parse::<SocketAddr>().expect("peer addr")))
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn health_is_exempt_but_stats_is_limited() {
    let (app, limiter, _clock) = setup(1);

    for _ in 0..3 {
        app.clone()
            .oneshot(check_from("10.0.0.1:4000", None))
            .await
            .expect("response");
    }

    let response = app
        .clone()
        .oneshot(get_from("/healthz", "10.0.0.1:4000"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");

    // A blocked client cannot read the stats either.
    let response = app
        .clone()
        .oneshot(get_from("/stats", "10.0.0.1:4000"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app
        .clone()
        .oneshot(get_from("/stats", "10.0.0.2:4000"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = serde_json::from_str(&body_string(response).await).expect("json");
    assert_eq!(json["tracked_identities"], 2);
    assert_eq!(json["active_blocks"], 1);
    assert_eq!(json["blocks_issued"], 1);
    assert_eq!(json["max_requests_per_window"], 1);

    // One admitted plus one tripping request; later ones hit an active block.
    assert_eq!(limiter.request_count("10.0.0.1"), Some(2));
    assert_eq!(limiter.request_count("10.0.0.2"), Some(1));

    // The stats request used up the second client's budget.
    let response = app
        .clone()
        .oneshot(get_from("/stats", "10.0.0.2:4000"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_admit_exactly_the_budget() {
    let (app, limiter, _clock) = setup(60);

    let responses = join_all((0..61).map(|_| {
        let app = app.clone();
        tokio::spawn(async move {
            app.oneshot(check_from("10.0.0.9:5000", None))
                .await
                .expect("response")
                .status()
        })
    }))
    .await;

    let statuses: Vec<StatusCode> = responses
        .into_iter()
        .map(|joined| joined.expect("task"))
        .collect();
    let admitted = statuses
        .iter()
        .filter(|s| **s == StatusCode::NO_CONTENT)
        .count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();

    assert_eq!(admitted, 60);
    assert_eq!(rejected, 1);
    assert_eq!(limiter.blocks_issued(), 1);
}
