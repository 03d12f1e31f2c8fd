//! End-to-end server tests over real TCP connections.

use std::sync::Arc;
use std::time::Duration;

use gatehouse_config::GatehouseConfig;
use gatehouse_core::{FieldErrors, Reply, RequestContext, RequestId};
use gatehouse_middleware::handler_fn;
use gatehouse_middleware::stages::MemoryTokenStore;
use gatehouse_middleware::types::{CSRF_TOKEN_HEADER, REQUEST_ID_HEADER};
use gatehouse_server::{App, HttpClient, RouteAdder, Server, ServerConfig, ServerError, ShutdownSignal, HSTS};
use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_test::assert_ok;

const UA: &str = "gatehouse-e2e";

struct TestServer {
    base: String,
    shutdown: ShutdownSignal,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start(app: App, config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = Server::builder().config(config).app(app).build();
    let handle = tokio::spawn(server.serve(listener, shutdown.clone()));
    TestServer {
        base: format!("http://{addr}"),
        shutdown,
        handle,
    }
}

fn client(base: &str) -> HttpClient {
    let inner = reqwest::Client::builder().no_proxy().build().unwrap();
    HttpClient::from_client(inner)
        .base_url(base)
        .header(header::USER_AGENT, HeaderValue::from_static(UA))
}

struct DemoRoutes;

impl RouteAdder for DemoRoutes {
    fn add(&self, app: &mut App, _cfg: &GatehouseConfig) {
        app.handle(
            Method::GET,
            "/api",
            "/test-error",
            handler_fn(|_ctx, _req| async {
                Reply::from(FieldErrors::new("value", "field value is required"))
            }),
            Vec::new(),
        );
        app.handle(
            Method::POST,
            "/api",
            "/echo",
            handler_fn(|_ctx, req: gatehouse_middleware::Request| async move {
                let value: serde_json::Value = serde_json::from_slice(req.body()).unwrap_or_default();
                Reply::json(StatusCode::OK, value)
            }),
            Vec::new(),
        );
        app.handle(
            Method::GET,
            "/api",
            "/slow",
            handler_fn(|_ctx, _req| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Reply::json_status(StatusCode::OK)
            }),
            Vec::new(),
        );
        app.handle(
            Method::GET,
            "/api",
            "/brief",
            handler_fn(|ctx: RequestContext, _req| async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                if ctx.is_cancelled() {
                    Reply::json_status(StatusCode::SERVICE_UNAVAILABLE)
                } else {
                    Reply::json_status(StatusCode::OK)
                }
            }),
            Vec::new(),
        );
        app.handle(
            Method::GET,
            "/api",
            "/panic",
            handler_fn(|_ctx: RequestContext, _req| async { explode() }),
            Vec::new(),
        );
    }
}

fn explode() -> Reply {
    panic!("slice index starts at 9 but ends at 3")
}

fn demo_app(store: Arc<MemoryTokenStore>) -> App {
    App::from_config(&GatehouseConfig::development(), store, &[&DemoRoutes])
}

#[tokio::test]
async fn test_field_errors_over_the_wire() {
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), ServerConfig::default()).await;

    let response = assert_ok!(client(&server.base).get("/api/test-error").await);
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.headers[header::STRICT_TRANSPORT_SECURITY], HSTS);
    assert!(response.headers.contains_key(REQUEST_ID_HEADER));

    let body: serde_json::Value = response.decode().unwrap();
    assert_eq!(
        body,
        serde_json::json!([{"field": "value", "error": "field value is required"}])
    );

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_csrf_guards_unsafe_methods() {
    let store = Arc::new(MemoryTokenStore::new());
    store.issue_token(UA, "tok-e2e", Duration::from_secs(60));
    let server = start(demo_app(Arc::clone(&store)), ServerConfig::default()).await;

    let denied = assert_ok!(
        client(&server.base)
            .post("/api/echo", &serde_json::json!({"n": 1}))
            .await
    );
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    let body: serde_json::Value = denied.decode().unwrap();
    assert_eq!(
        body,
        serde_json::json!({"code": "permission_denied", "message": "The csrf token is required"})
    );

    let allowed = assert_ok!(
        client(&server.base)
            .header(CSRF_TOKEN_HEADER, HeaderValue::from_static("tok-e2e"))
            .post("/api/echo", &serde_json::json!({"n": 1}))
            .await
    );
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(&allowed.body[..], br#"{"n":1}"#);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), ServerConfig::default()).await;
    let client = client(&server.base);

    let missing = assert_ok!(client.get("/api/nope").await);
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let wrong = assert_ok!(client.post("/api/test-error", &()).await);
    assert_eq!(wrong.status, StatusCode::METHOD_NOT_ALLOWED);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), ServerConfig::default()).await;
    let id = RequestId::new().to_string();

    let response = assert_ok!(
        client(&server.base)
            .header(REQUEST_ID_HEADER, HeaderValue::from_str(&id).unwrap())
            .get("/api/test-error")
            .await
    );
    assert_eq!(response.headers[REQUEST_ID_HEADER], id.as_str());

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_dispatch_timeout_is_503() {
    let config = ServerConfig::builder()
        .write_timeout(Duration::from_millis(200))
        .build();
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), config).await;

    let response = assert_ok!(client(&server.base).get("/api/slow").await);
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_dispatch_timeout_keeps_cors_headers() {
    let mut cfg = GatehouseConfig::development();
    cfg.cors.origins = vec!["https://a.example".to_string()];
    let app = App::from_config(&cfg, Arc::new(MemoryTokenStore::new()), &[&DemoRoutes]);
    let config = ServerConfig::builder()
        .write_timeout(Duration::from_millis(200))
        .build();
    let server = start(app, config).await;

    let response = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("{}/api/slow", server.base))
        .header(header::ORIGIN, "https://a.example")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://a.example"
    );
    assert_eq!(response.headers()[header::STRICT_TRANSPORT_SECURITY], HSTS);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let config = ServerConfig::builder().max_body_bytes(16).build();
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), config).await;
    let http = reqwest::Client::builder().no_proxy().build().unwrap();

    let response = http
        .post(format!("{}/api/echo", server.base))
        .header(header::CONTENT_TYPE, "application/json")
        .body(format!("{{\"padding\":\"{}\"}}", "x".repeat(64)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()[header::STRICT_TRANSPORT_SECURITY], HSTS);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_panic_hidden_from_client() {
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), ServerConfig::default()).await;

    let response = assert_ok!(client(&server.base).get("/api/panic").await);
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(!text.contains("slice index"));
    assert!(text.contains("Internal Server Error"));

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_cors_preflight_over_the_wire() {
    let mut cfg = GatehouseConfig::development();
    cfg.cors.origins = vec!["http://localhost:3000".to_string()];
    let app = App::from_config(&cfg, Arc::new(MemoryTokenStore::new()), &[&DemoRoutes]);
    let server = start(app, ServerConfig::default()).await;

    let response = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .request(Method::OPTIONS, format!("{}/api/echo", server.base))
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_request_finish() {
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), ServerConfig::default()).await;
    let http = client(&server.base);

    let pending = tokio::spawn(async move { http.get("/api/brief").await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.shutdown.trigger();

    let response = assert_ok!(pending.await.unwrap());
    assert_eq!(response.status, StatusCode::OK);
    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let server = start(demo_app(Arc::new(MemoryTokenStore::new())), ServerConfig::default()).await;

    let response = assert_ok!(client(&server.base).get("/api/test-error").await);
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    server.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok());

    assert!(client(&server.base).get("/api/test-error").await.is_err());
}
