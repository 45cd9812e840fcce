mod common;

use common::{app_for, mock_token};
use infolab_mcp::errors::ToolErrorKind;
use infolab_mcp::services::token_manager::Token;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_exchange() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = mock_token(&mut server, "tok-shared")
        .expect(1)
        .create_async()
        .await;
    let app = app_for(&server.url(), 300);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = app.token_manager.clone();
        handles.push(tokio::spawn(async move { manager.get_token().await }));
    }
    for handle in handles {
        let token = handle.await.expect("join").expect("token");
        assert_eq!(token.secret(), "tok-shared");
    }

    token_mock.assert_async().await;
    assert_eq!(app.token_manager.exchange_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_resolve_to_the_same_token() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server, "tok-refreshed").create_async().await;
    let app = app_for(&server.url(), 300);

    let (a, b, c) = tokio::join!(
        app.token_manager.refresh_token(),
        app.token_manager.refresh_token(),
        app.token_manager.refresh_token(),
    );
    let a = a.expect("a");
    assert!(a.same_as(&b.expect("b")));
    assert!(a.same_as(&c.expect("c")));
    assert!(app
        .token_manager
        .current()
        .map(|current| current.same_as(&a))
        .unwrap_or(false));
}

#[tokio::test]
async fn failed_exchange_leaves_cache_empty_and_can_be_retried() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/mcp/auth/token")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":"Invalid API key"}"#)
        .create_async()
        .await;
    let app = app_for(&server.url(), 300);

    let err = app.token_manager.get_token().await.expect_err("must fail");
    assert_eq!(err.kind, ToolErrorKind::Authentication);
    assert_eq!(err.message, "Failed to authenticate with API key: Invalid API key");
    assert!(app.token_manager.current().is_none());

    failing.remove_async().await;
    let _ok = mock_token(&mut server, "tok-after-failure").create_async().await;
    let token = app.token_manager.get_token().await.expect("retry succeeds");
    assert_eq!(token.secret(), "tok-after-failure");
    assert_eq!(app.token_manager.exchange_count(), 2);
}

#[tokio::test]
async fn cached_token_within_ttl_skips_backend_validation() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server, "tok-ttl").create_async().await;
    let validate = server
        .mock("GET", "/mcp/auth/validate")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;
    let app = app_for(&server.url(), 300);

    assert!(app.token_manager.validate_token(None).await.expect("validate"));
    assert!(app.token_manager.validate_token(None).await.expect("validate"));
    validate.assert_async().await;
}

#[tokio::test]
async fn zero_ttl_asks_backend_every_time() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server, "tok-zero").create_async().await;
    let validate = server
        .mock("GET", "/mcp/auth/validate")
        .match_header("authorization", "Bearer tok-zero")
        .with_status(200)
        .with_body(r#"{"valid":true}"#)
        .expect(2)
        .create_async()
        .await;
    let app = app_for(&server.url(), 0);

    assert!(app.token_manager.validate_token(None).await.expect("first"));
    assert!(app.token_manager.validate_token(None).await.expect("second"));
    validate.assert_async().await;
}

#[tokio::test]
async fn explicit_token_rejected_by_backend_is_invalid() {
    let mut server = mockito::Server::new_async().await;
    let _validate = server
        .mock("GET", "/mcp/auth/validate")
        .with_status(401)
        .with_body(r#"{"detail":"Token expired"}"#)
        .create_async()
        .await;
    let app = app_for(&server.url(), 300);

    let stale = Token::new("tok-stale", None);
    assert!(!app
        .token_manager
        .validate_token(Some(&stale))
        .await
        .expect("answer"));
}

#[tokio::test]
async fn validate_server_error_is_not_a_verdict() {
    let mut server = mockito::Server::new_async().await;
    let _validate = server
        .mock("GET", "/mcp/auth/validate")
        .with_status(503)
        .create_async()
        .await;
    let app = app_for(&server.url(), 300);

    let err = app
        .token_manager
        .validate_token(Some(&Token::new("tok", None)))
        .await
        .expect_err("backend down");
    assert_eq!(err.status, Some(503));
}

#[tokio::test]
async fn rejection_refresh_reuses_a_newer_token() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = mock_token(&mut server, "tok-new")
        .expect(1)
        .create_async()
        .await;
    let app = app_for(&server.url(), 300);

    let current = app.token_manager.get_token().await.expect("token");
    let stale = Token::new("tok-old", None);
    let fresh = app
        .token_manager
        .refresh_after_rejection(&stale)
        .await
        .expect("reuse");
    assert!(fresh.same_as(&current));
    token_mock.assert_async().await;
}

#[tokio::test]
async fn closed_manager_refuses_to_refresh() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = mock_token(&mut server, "tok")
        .expect(0)
        .create_async()
        .await;
    let app = app_for(&server.url(), 300);

    app.close();
    let err = app.token_manager.get_token().await.expect_err("closed");
    assert_eq!(err.kind, ToolErrorKind::Authentication);
    token_mock.assert_async().await;
}
