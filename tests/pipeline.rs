//! End-to-end tests of the request pipeline against a live mock backend.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use resilient_client::auth::{CredentialStore, MemoryCredentialStore, SessionEvent, Token};
use resilient_client::notifications::ChannelSink;
use resilient_client::{ApiClient, ApiError, ErrorKind};

mod common;
use common::{MockResponse, SeenRequest};

fn client_with_token(config: resilient_client::ClientConfig, token: &str) -> ApiClient {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_token(Token::new(token)));
    ApiClient::builder(config).credentials(store).build().unwrap()
}

#[tokio::test]
async fn test_token_and_request_id_reach_backend() {
    let seen = Arc::new(Mutex::new(Vec::<SeenRequest>::new()));
    let log = seen.clone();
    let addr = common::start_programmable_backend(move |req| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(req);
            MockResponse::new(200, r#"{"orders":[]}"#)
        }
    })
    .await;

    let client = client_with_token(common::test_config(addr), "abc");
    let body: serde_json::Value = client.get_json("/orders").await.unwrap();
    assert_eq!(body["orders"], serde_json::json!([]));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].path, "/api/orders");
    assert_eq!(seen[0].header("authorization"), Some("Bearer abc"));
    assert!(seen[0].header("x-request-id").is_some());
}

#[tokio::test]
async fn test_transient_server_errors_are_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let ids = Arc::new(Mutex::new(Vec::<String>::new()));
    let (h, log) = (hits.clone(), ids.clone());
    let addr = common::start_programmable_backend(move |req| {
        let (h, log) = (h.clone(), log.clone());
        async move {
            log.lock()
                .unwrap()
                .push(req.header("x-request-id").unwrap_or_default().to_string());
            if h.fetch_add(1, Ordering::SeqCst) < 2 {
                MockResponse::new(503, r#"{"message":"warming up"}"#)
            } else {
                MockResponse::new(200, r#"{"ok":true}"#)
            }
        }
    })
    .await;

    let client = client_with_token(common::test_config(addr), "abc");
    let response = client.get("/products").await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let ids = ids.lock().unwrap();
    assert!(ids.iter().all(|id| !id.is_empty() && id == &ids[0]), "one request ID per chain");
}

#[tokio::test]
async fn test_breaker_opens_and_recovers() {
    let hits = Arc::new(AtomicU32::new(0));
    let healthy = Arc::new(AtomicBool::new(false));
    let (h, up) = (hits.clone(), healthy.clone());
    let addr = common::start_programmable_backend(move |_| {
        let (h, up) = (h.clone(), up.clone());
        async move {
            h.fetch_add(1, Ordering::SeqCst);
            if up.load(Ordering::SeqCst) {
                MockResponse::new(200, "{}")
            } else {
                MockResponse::new(500, r#"{"message":"db down"}"#)
            }
        }
    })
    .await;

    let client = client_with_token(common::test_config(addr), "abc");

    let err = client.get("/orders").await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 500, .. }));
    assert_eq!(err.user_message(), "db down");
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let err = client.get("/orders").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    assert_eq!(hits.load(Ordering::SeqCst), 3, "rejected without a network call");

    let circuits = client.circuits();
    assert_eq!(circuits.len(), 1);
    assert_eq!(circuits[0].status, "open");

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    client.get("/orders").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(client.circuits()[0].status, "closed");
}

#[tokio::test]
async fn test_concurrent_expiry_triggers_one_refresh() {
    let refreshes = Arc::new(AtomicU32::new(0));
    let r = refreshes.clone();
    let addr = common::start_programmable_backend(move |req| {
        let r = r.clone();
        async move {
            if req.path == "/api/auth/refresh" {
                assert_eq!(req.method, "POST");
                assert!(req.header("authorization").is_none());
                r.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                return MockResponse::new(200, r#"{"accessToken":"fresh","user":{"name":"ana"}}"#);
            }
            match req.header("authorization") {
                Some("Bearer fresh") => MockResponse::new(200, r#"{"ok":true}"#),
                _ => MockResponse::new(401, r#"{"message":"jwt expired"}"#),
            }
        }
    })
    .await;

    let client = client_with_token(common::test_config(addr), "stale");

    let calls = (0..5).map(|i| {
        let client = client.clone();
        async move { client.get(&format!("/tables/{}", i)).await }
    });
    let results = futures_util::future::join_all(calls).await;

    for res in results {
        assert_eq!(res.unwrap().status().as_u16(), 200);
    }
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(client.credentials().token(), Some(Token::new("fresh")));
    assert_eq!(client.credentials().user().unwrap()["name"], "ana");
}

#[tokio::test]
async fn test_rejected_refresh_forces_logout() {
    let addr = common::start_programmable_backend(|req| async move {
        if req.path == "/api/auth/refresh" {
            MockResponse::new(401, r#"{"message":"refresh token expired"}"#)
        } else {
            MockResponse::new(401, r#"{"message":"jwt expired"}"#)
        }
    })
    .await;

    let client = client_with_token(common::test_config(addr), "stale");
    let mut events = client.subscribe_session();

    let err = client.get("/orders").await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired { .. }));
    assert!(client.credentials().token().is_none());

    let SessionEvent::Expired { redirect_to, .. } = events.recv().await.unwrap();
    assert_eq!(redirect_to, "/login");
}

#[tokio::test]
async fn test_refresh_sends_cookie_from_login() {
    let addr = common::start_programmable_backend(|req| async move {
        match req.path.as_str() {
            "/api/login" => MockResponse::new(200, r#"{"accessToken":"stale"}"#)
                .with_header("Set-Cookie", "refresh_token=r1; Path=/; HttpOnly"),
            "/api/auth/refresh" => {
                if req.header("cookie").is_some_and(|c| c.contains("refresh_token=r1")) {
                    MockResponse::new(200, r#"{"token":"fresh"}"#)
                } else {
                    MockResponse::new(401, r#"{"message":"no refresh cookie"}"#)
                }
            }
            _ => match req.header("authorization") {
                Some("Bearer fresh") => MockResponse::new(200, "{}"),
                _ => MockResponse::new(401, "{}"),
            },
        }
    })
    .await;

    let client = client_with_token(common::test_config(addr), "stale");
    client
        .post("/login", &serde_json::json!({ "email": "ana@example.com" }))
        .await
        .unwrap();

    client.get("/orders").await.unwrap();
    assert_eq!(client.credentials().token(), Some(Token::new("fresh")));
}

#[tokio::test]
async fn test_client_errors_fail_without_retry() {
    let hits = Arc::new(AtomicU32::new(0));
    let h = hits.clone();
    let addr = common::start_programmable_backend(move |_| {
        let h = h.clone();
        async move {
            h.fetch_add(1, Ordering::SeqCst);
            MockResponse::new(422, r#"{"error":{"message":"name is required"}}"#)
        }
    })
    .await;

    let client = client_with_token(common::test_config(addr), "abc");
    let err = client
        .post("/products", &serde_json::json!({ "price": 4 }))
        .await
        .unwrap_err();

    match err {
        ApiError::Client { status, message, .. } => {
            assert_eq!(status, 422);
            assert_eq!(message, "name is required");
        }
        other => panic!("expected client error, got {}", other),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let addr = common::closed_port().await;
    let mut config = common::test_config(addr);
    config.retries.max_attempts = 1;

    let client = client_with_token(config, "abc");
    let err = client.get("/orders").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_repeated_failures_are_notified_once() {
    let addr = common::start_programmable_backend(|_| async move {
        MockResponse::new(404, r#"{"message":"order not found"}"#)
    })
    .await;

    let (sink, mut notifications) = ChannelSink::new();
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_token(Token::new("abc")));
    let client = ApiClient::builder(common::test_config(addr))
        .credentials(store)
        .notification_sink(Box::new(sink))
        .build()
        .unwrap();

    for _ in 0..3 {
        assert!(client.get("/orders/77").await.is_err());
    }

    let first = notifications.recv().await.unwrap();
    assert_eq!(first.message, "order not found");
    assert_eq!(first.kind, ErrorKind::Client);
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_undecodable_body_is_notified() {
    let addr = common::start_programmable_backend(|_| async move {
        MockResponse::new(200, r#"{"orders":"not a list"}"#)
    })
    .await;

    let (sink, mut notifications) = ChannelSink::new();
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_token(Token::new("abc")));
    let client = ApiClient::builder(common::test_config(addr))
        .credentials(store)
        .notification_sink(Box::new(sink))
        .build()
        .unwrap();

    let err = client.get_json::<Vec<u32>>("/orders?page=2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);

    let note = notifications.recv().await.unwrap();
    assert_eq!(note.kind, ErrorKind::Decode);
    assert_eq!(note.target.as_str(), "GET /orders");
}

#[tokio::test]
async fn test_attempt_timeout_is_reported_with_its_limit() {
    let addr = common::start_programmable_backend(|_| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        MockResponse::new(200, "{}")
    })
    .await;

    let mut config = common::test_config(addr);
    config.retries.max_attempts = 1;
    let client = client_with_token(config, "abc");

    let request = resilient_client::RequestDescriptor::get("/reports/slow").timeout(Duration::from_millis(200));
    let err = client.send(request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.to_string().contains("no response within 200ms"), "got: {}", err);
}

#[tokio::test]
async fn test_shutdown_cancels_pending_retry() {
    let addr = common::start_programmable_backend(|_| async move { MockResponse::new(503, "{}") }).await;

    let mut config = common::test_config(addr);
    config.retries.base_delay_ms = 5_000;
    config.retries.max_delay_ms = 5_000;
    let client = client_with_token(config, "abc");

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/orders").await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.shutdown();

    let res = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("shutdown should interrupt the backoff wait")
        .unwrap();
    assert!(matches!(res, Err(ApiError::Cancelled { .. })));
}

#[tokio::test]
async fn test_session_persists_across_clients() {
    let addr = common::start_programmable_backend(|req| async move {
        if req.path == "/api/auth/refresh" {
            return MockResponse::new(200, r#"{"access_token":"persisted"}"#);
        }
        match req.header("authorization") {
            Some("Bearer persisted") => MockResponse::new(200, "{}"),
            _ => MockResponse::new(401, "{}"),
        }
    })
    .await;

    let path = std::env::temp_dir().join(format!("resilient-client-{}.json", uuid::Uuid::new_v4()));
    let mut config = common::test_config(addr);
    config.auth.credentials_path = Some(path.to_string_lossy().into_owned());

    let first = ApiClient::new(config.clone()).unwrap();
    first.get("/orders").await.unwrap();

    let second = ApiClient::new(config).unwrap();
    assert_eq!(second.credentials().token(), Some(Token::new("persisted")));

    let _ = std::fs::remove_file(path);
}
