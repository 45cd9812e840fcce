mod common;

use common::settings_for;
use infolab_mcp::errors::ToolErrorKind;
use infolab_mcp::services::logger::Logger;
use infolab_mcp::services::request_proxy::RequestProxy;
use reqwest::Method;
use std::collections::HashMap;
use std::time::Duration;

fn proxy_for(url: &str) -> RequestProxy {
    RequestProxy::new(Logger::new("test"), &settings_for(url, 300)).expect("proxy")
}

#[tokio::test]
async fn posts_json_with_caller_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/mcp/create_course")
        .match_header("authorization", "Bearer abc")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::Json(
            serde_json::json!({"course_name": "Algebra", "course_description": "Intro"}),
        ))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":7,"course_name":"Algebra"}"#)
        .create_async()
        .await;

    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer abc".to_string());
    let body = serde_json::json!({"course_name": "Algebra", "course_description": "Intro"});
    let response = proxy_for(&server.url())
        .request(Method::POST, "/mcp/create_course", Some(&body), Some(&headers))
        .await
        .expect("response");

    assert_eq!(response, serde_json::json!({"id": 7, "course_name": "Algebra"}));
    mock.assert_async().await;
}

#[tokio::test]
async fn backend_error_message_is_kept_verbatim() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/mcp/get_persona")
        .match_query(mockito::Matcher::Any)
        .with_status(404)
        .with_body(r#"{"detail":"Persona 'algebra-101' not found"}"#)
        .create_async()
        .await;

    let err = proxy_for(&server.url())
        .request(Method::GET, "/mcp/get_persona?title=algebra-101", None, None)
        .await
        .expect_err("404");

    assert_eq!(err.kind, ToolErrorKind::Backend);
    assert_eq!(err.status, Some(404));
    assert_eq!(err.message, "Persona 'algebra-101' not found");
}

#[tokio::test]
async fn error_without_message_falls_back_to_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/broken")
        .with_status(502)
        .with_body("<html>bad gateway</html>")
        .create_async()
        .await;

    let err = proxy_for(&server.url())
        .request(Method::GET, "/broken", None, None)
        .await
        .expect_err("502");
    assert_eq!(err.message, "Backend request failed (502)");
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/mcp/refresh_persona")
        .with_status(204)
        .create_async()
        .await;

    let response = proxy_for(&server.url())
        .request(
            Method::POST,
            "/mcp/refresh_persona",
            Some(&serde_json::json!({})),
            None,
        )
        .await
        .expect("empty ok");
    assert!(response.is_null());
}

#[tokio::test]
async fn invalid_json_is_a_transport_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/weird")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let err = proxy_for(&server.url())
        .request(Method::GET, "/weird", None, None)
        .await
        .expect_err("bad body");
    assert_eq!(err.kind, ToolErrorKind::Transport);
    assert_eq!(err.status, Some(200));
}

#[tokio::test]
async fn silent_backend_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let holder = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let settings = settings_for(&format!("http://{}", addr), 300)
        .with_request_timeout(Duration::from_millis(200));
    let proxy = RequestProxy::new(Logger::new("test"), &settings).expect("proxy");
    let err = proxy
        .request(Method::GET, "/slow", None, None)
        .await
        .expect_err("timeout");

    assert_eq!(err.kind, ToolErrorKind::Transport);
    assert_eq!(err.message, "Backend request timed out after 200ms");
    holder.abort();
}

#[tokio::test]
async fn closed_proxy_refuses_requests() {
    let server = mockito::Server::new_async().await;
    let proxy = proxy_for(&server.url());
    proxy.close();
    let err = proxy
        .request(Method::GET, "/anything", None, None)
        .await
        .expect_err("closed");
    assert_eq!(err.kind, ToolErrorKind::Transport);
}
