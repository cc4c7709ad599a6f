//! Integration tests for the Telegram transport using wiremock

use epicfree::broadcast::{DeliveryTransport, FormatDirectives, ParseMode, TelegramTransport};
use epicfree::utils::error::DeliveryError;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123456:test-token";

fn transport(server: &MockServer) -> TelegramTransport {
    TelegramTransport::with_base_url(TOKEN, server.uri(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_send_text_posts_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": "1001",
            "text": "<b>Free!</b>",
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 7 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server)
        .send_text("1001", "<b>Free!</b>", &FormatDirectives::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_image_posts_photo() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendPhoto")))
        .and(body_partial_json(json!({
            "chat_id": "1001",
            "photo": "https://cdn.test/banner.png",
            "caption": "caption"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let format = FormatDirectives {
        parse_mode: ParseMode::Plain,
        disable_preview: false,
    };
    transport(&server)
        .send_image("1001", "https://cdn.test/banner.png", "caption", &format)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_blocked_user_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_text("1001", "hi", &FormatDirectives::default())
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert!(matches!(err, DeliveryError::Unreachable(ref d) if d.contains("blocked")));
}

#[tokio::test]
async fn test_forbidden_without_json_body_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_string("<html><body>403 Forbidden</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_image("1001", "https://img/x.png", "hi", &FormatDirectives::default())
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert!(matches!(err, DeliveryError::Unreachable(_)));
}

#[tokio::test]
async fn test_rate_limit_without_json_body_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_text("1001", "hi", &FormatDirectives::default())
        .await
        .unwrap_err();

    assert!(!err.is_permanent());
    assert!(matches!(
        err,
        DeliveryError::RateLimited {
            retry_after_secs: None
        }
    ));
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 5",
            "parameters": { "retry_after": 5 }
        })))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_text("1001", "hi", &FormatDirectives::default())
        .await
        .unwrap_err();

    assert!(!err.is_permanent());
    assert!(matches!(
        err,
        DeliveryError::RateLimited {
            retry_after_secs: Some(5)
        }
    ));
}

#[tokio::test]
async fn test_other_api_errors_are_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_text("1001", "hi", &FormatDirectives::default())
        .await
        .unwrap_err();

    assert!(!err.is_permanent());
    assert!(matches!(err, DeliveryError::Api { code: 400, .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let transport =
        TelegramTransport::with_base_url(TOKEN, "http://127.0.0.1:1", Duration::from_millis(500))
            .unwrap();

    let err = transport
        .send_text("1001", "hi", &FormatDirectives::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Http(_)));
    assert!(!err.is_permanent());
}
