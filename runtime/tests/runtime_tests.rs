use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use lifecycle::{BoxError, ComponentOptions};
use metrics_exporter_prometheus::PrometheusBuilder;
use service_runtime::server::serve;
use service_runtime::{HttpError, Runtime, RuntimeError, RuntimeOptions};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn get_path(router: &Router, path: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn hello() -> &'static str {
    "hello"
}

/// Component whose check fails with "down" while `healthy` is false.
fn toggled(healthy: Arc<AtomicBool>) -> ComponentOptions {
    ComponentOptions::new()
        .with_startup(|_| async { Ok::<(), BoxError>(()) })
        .with_check(move |_| {
            let healthy = healthy.clone();
            async move {
                if healthy.load(Ordering::SeqCst) {
                    Ok::<(), BoxError>(())
                } else {
                    Err("down".into())
                }
            }
        })
        .with_shutdown(|_| async { Ok::<(), BoxError>(()) })
}

async fn wait_for(counter: &AtomicUsize, value: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counter.load(Ordering::SeqCst) != value {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn readiness_without_components_is_ok() {
    let runtime = Runtime::default();
    let router = runtime.router(Router::new());

    let (status, body) = get_path(&router, "/debug/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(runtime.cascade().failure_streak(), 0);
}

#[tokio::test]
async fn failing_check_fails_readiness_but_not_liveness() {
    let runtime = Runtime::default();
    runtime
        .component("db", toggled(Arc::new(AtomicBool::new(false))))
        .await
        .unwrap();
    runtime.startup(&CancellationToken::new()).await.unwrap();
    let router = runtime.router(Router::new());

    let (status, body) = get_path(&router, "/debug/ready").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "db: down");
    assert_eq!(runtime.cascade().failure_streak(), 1);

    let (status, body) = get_path(&router, "/debug/alive").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn probe_responses_are_not_cached() {
    let router = Runtime::default().router(Router::new());
    let response = router
        .oneshot(
            Request::builder()
                .uri("/debug/alive")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(
        headers["cache-control"],
        "no-store, no-cache, must-revalidate"
    );
}

#[tokio::test]
async fn liveness_fails_once_the_threshold_is_exceeded() {
    let runtime = Runtime::default();
    runtime
        .component("db", toggled(Arc::new(AtomicBool::new(false))))
        .await
        .unwrap();
    let router = runtime.router(Router::new());

    for _ in 0..5 {
        get_path(&router, "/debug/ready").await;
    }
    assert_eq!(get_path(&router, "/debug/alive").await.0, StatusCode::OK);

    get_path(&router, "/debug/ready").await;
    let (status, body) = get_path(&router, "/debug/alive").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "CASCADED");
}

#[tokio::test]
async fn one_successful_readiness_heals_liveness() {
    let healthy = Arc::new(AtomicBool::new(false));
    let runtime = Runtime::new(RuntimeOptions::default().with_readiness_cascade(1));
    runtime
        .component("c1", toggled(healthy.clone()))
        .await
        .unwrap();
    let router = runtime.router(Router::new());

    get_path(&router, "/debug/ready").await;
    get_path(&router, "/debug/ready").await;
    assert_eq!(
        get_path(&router, "/debug/alive").await,
        (StatusCode::INTERNAL_SERVER_ERROR, "CASCADED".to_string())
    );

    healthy.store(true, Ordering::SeqCst);
    assert_eq!(
        get_path(&router, "/debug/ready").await,
        (StatusCode::OK, "c1: OK".to_string())
    );
    assert_eq!(
        get_path(&router, "/debug/alive").await,
        (StatusCode::OK, "OK".to_string())
    );
}

#[tokio::test]
async fn disabled_cascade_keeps_liveness_up() {
    let runtime = Runtime::new(RuntimeOptions::default().with_readiness_cascade(0));
    runtime
        .component("db", toggled(Arc::new(AtomicBool::new(false))))
        .await
        .unwrap();
    let router = runtime.router(Router::new());

    for _ in 0..20 {
        get_path(&router, "/debug/ready").await;
    }
    assert_eq!(get_path(&router, "/debug/alive").await.0, StatusCode::OK);
}

#[tokio::test]
async fn readiness_wins_when_probe_paths_collide() {
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_readiness_path("/health")
            .with_liveness_path("/health"),
    );
    runtime
        .component("db", toggled(Arc::new(AtomicBool::new(false))))
        .await
        .unwrap();
    let router = runtime.router(Router::new());

    let (status, body) = get_path(&router, "/health").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "db: down");
}

// ---------------------------------------------------------------------------
// Metrics and debug routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metrics_path_requires_a_handle() {
    let router = Runtime::default().router(Router::new());
    assert_eq!(
        get_path(&router, "/debug/metrics").await.0,
        StatusCode::NOT_FOUND
    );

    let handle = PrometheusBuilder::new().build_recorder().handle();
    let router = Runtime::new(RuntimeOptions::default().with_metrics_handle(handle))
        .router(Router::new());
    assert_eq!(get_path(&router, "/debug/metrics").await.0, StatusCode::OK);
}

#[tokio::test]
async fn debug_routes_bypass_the_gate() {
    let runtime = Runtime::new(
        RuntimeOptions::default()
            .with_concurrency(1)
            .with_debug_routes(Router::new().route("/debug/pprof", get(|| async { "profile" }))),
    );
    let router = runtime.router(Router::new().route("/", get(hello)));

    // Hold the only ticket: probes and debug routes still answer.
    let _ticket = runtime.gate().acquire().await;

    let within = |path: &'static str| {
        let router = router.clone();
        async move {
            tokio::time::timeout(Duration::from_secs(1), get_path(&router, path))
                .await
                .unwrap()
        }
    };
    assert_eq!(
        within("/debug/pprof").await,
        (StatusCode::OK, "profile".to_string())
    );
    assert_eq!(within("/debug/unknown").await.0, StatusCode::NOT_FOUND);
    assert_eq!(within("/debug/alive").await.0, StatusCode::OK);
    assert_eq!(within("/debug/ready").await.0, StatusCode::OK);

    let blocked = tokio::time::timeout(Duration::from_millis(50), get_path(&router, "/")).await;
    assert!(blocked.is_err(), "application requests wait for a ticket");
}

// ---------------------------------------------------------------------------
// Application requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn application_routes_are_served() {
    let router = Runtime::default().router(Router::new().route("/", get(hello)));

    assert_eq!(
        get_path(&router, "/").await,
        (StatusCode::OK, "hello".to_string())
    );
    assert_eq!(get_path(&router, "/missing").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gate_serializes_handlers_at_capacity_one() {
    let entered = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Semaphore::new(0));

    let handler = {
        let entered = entered.clone();
        let release = release.clone();
        move || {
            let entered = entered.clone();
            let release = release.clone();
            async move {
                entered.fetch_add(1, Ordering::SeqCst);
                release.acquire().await.unwrap().forget();
                "done"
            }
        }
    };

    let runtime = Runtime::new(RuntimeOptions::default().with_concurrency(1));
    let router = runtime.router(Router::new().route("/block", get(handler)));

    let first = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/block").await }
    });
    wait_for(&entered, 1).await;

    let second = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/block").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(entered.load(Ordering::SeqCst), 1, "second handler must wait");

    release.add_permits(1);
    wait_for(&entered, 2).await;
    release.add_permits(1);

    assert_eq!(first.await.unwrap().0, StatusCode::OK);
    assert_eq!(second.await.unwrap().0, StatusCode::OK);
    assert_eq!(runtime.gate().available(), Some(1));
}

async fn panics() -> &'static str {
    panic!("WWW")
}

#[tokio::test]
async fn panicking_handler_returns_500_and_releases_its_ticket() {
    let runtime = Runtime::new(RuntimeOptions::default().with_concurrency(1));
    let router = runtime.router(
        Router::new()
            .route("/panic", get(panics))
            .route("/", get(hello)),
    );

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/panic").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()["content-type"],
        "application/json; charset=utf-8"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], br#"{"message":"panic: WWW"}"#);

    assert_eq!(runtime.gate().available(), Some(1));
    assert_eq!(
        get_path(&router, "/").await,
        (StatusCode::OK, "hello".to_string())
    );
}

async fn panics_with_error() -> &'static str {
    let err: BoxError = Box::new(HttpError::new("bad input", StatusCode::BAD_REQUEST));
    std::panic::panic_any(err)
}

#[tokio::test]
async fn panicking_handler_with_an_error_answers_its_status() {
    let runtime = Runtime::new(RuntimeOptions::default().with_concurrency(1));
    let router = runtime.router(Router::new().route("/panic", get(panics_with_error)));

    let (status, body) = get_path(&router, "/panic").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"message":"bad input"}"#);
    assert_eq!(runtime.gate().available(), Some(1));
}

#[tokio::test]
async fn ticket_is_released_when_the_response_is_returned() {
    let runtime = Runtime::new(RuntimeOptions::default().with_concurrency(1));
    let router = runtime.router(Router::new().route("/", get(hello)));

    let response = router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    // Body not read yet, the ticket is already back.
    assert_eq!(runtime.gate().available(), Some(1));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"hello");
}

async fn teapot() -> Result<&'static str, HttpError> {
    Err(HttpError::new("short and stout", StatusCode::IM_A_TEAPOT))
}

#[tokio::test]
async fn http_errors_carry_their_status() {
    let router = Runtime::default().router(Router::new().route("/tea", get(teapot)));

    let (status, body) = get_path(&router, "/tea").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body, r#"{"message":"short and stout"}"#);
}

// ---------------------------------------------------------------------------
// Lifecycle and server loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn startup_is_guarded() {
    let runtime = Runtime::default();
    let token = CancellationToken::new();

    runtime.startup(&token).await.unwrap();
    assert!(matches!(
        runtime.startup(&token).await,
        Err(RuntimeError::AlreadyStarted)
    ));
    runtime.shutdown(&token).await.unwrap();
}

#[tokio::test]
async fn duplicate_component_is_rejected() {
    let runtime = Runtime::default();
    runtime
        .component("db", ComponentOptions::new())
        .await
        .unwrap();
    assert!(runtime
        .component("db", ComponentOptions::new())
        .await
        .is_err());
}

fn journaled(journal: Arc<Mutex<Vec<&'static str>>>, fail_startup: bool) -> ComponentOptions {
    let on_shutdown = journal.clone();
    ComponentOptions::new()
        .with_startup(move |_| {
            let journal = journal.clone();
            async move {
                journal.lock().unwrap().push("startup");
                if fail_startup {
                    Err::<(), BoxError>("no database".into())
                } else {
                    Ok(())
                }
            }
        })
        .with_shutdown(move |_| {
            let journal = on_shutdown.clone();
            async move {
                journal.lock().unwrap().push("shutdown");
                Ok::<(), BoxError>(())
            }
        })
}

#[tokio::test]
async fn serve_starts_and_stops_components() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let runtime = Runtime::default();
    runtime
        .component("db", journaled(journal.clone(), false))
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tx.send(()).unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        serve(runtime, Router::new(), listener, async move {
            rx.await.ok();
        }),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(*journal.lock().unwrap(), vec!["startup", "shutdown"]);
}

#[tokio::test]
async fn serve_aborts_when_startup_fails() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let runtime = Runtime::default();
    runtime
        .component("db", journaled(journal.clone(), true))
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let err = serve(runtime, Router::new(), listener, std::future::pending::<()>())
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Lifecycle(_)));
    assert_eq!(err.to_string(), "no database");
    assert_eq!(*journal.lock().unwrap(), vec!["startup"]);
}
