use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tx_alert_monitor::error::SinkError;
use tx_alert_monitor::models::{Alert, Severity};
use tx_alert_monitor::notify::{
    sign_webhook, DispatchMode, Fanout, NotificationSink, TelegramSink, WebhookSink,
};

#[tokio::test]
async fn test_webhook_posts_text_message() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "msg_type": "text",
            "content": { "text": "whale moved" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "success" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = WebhookSink::new("ops-webhook", format!("{}/hook", mock_server.uri()), None);
    sink.send("whale moved").await.unwrap();
}

#[tokio::test]
async fn test_signed_webhook_carries_valid_signature() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = WebhookSink::new(
        "ops-webhook",
        format!("{}/hook", mock_server.uri()),
        Some("s3cret".to_string()),
    );
    sink.send("whale moved").await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let timestamp: i64 = body["timestamp"].as_str().unwrap().parse().unwrap();
    assert_eq!(body["sign"], json!(sign_webhook(timestamp, "s3cret").unwrap()));
}

#[tokio::test]
async fn test_webhook_nonzero_code_is_rejection() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 19021,
            "msg": "sign match fail or timestamp is not within one hour from current time"
        })))
        .mount(&mock_server)
        .await;

    let sink = WebhookSink::new("ops-webhook", mock_server.uri(), Some("wrong".to_string()));
    let error = sink.send("whale moved").await.unwrap_err();

    match error {
        SinkError::Rejected(reason) => assert!(reason.starts_with("code 19021")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_webhook_server_error_reports_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let sink = WebhookSink::new("ops-webhook", mock_server.uri(), None);
    let error = sink.send("whale moved").await.unwrap_err();

    assert!(matches!(error, SinkError::Status { status: 500, ref body } if body == "boom"));
    assert_eq!(error.to_string(), "HTTP 500: boom");
}

#[tokio::test]
async fn test_telegram_send_message() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": "-100", "text": "whale moved" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = TelegramSink::with_api_base("tg", mock_server.uri(), "123:abc", "-100");
    sink.send("whale moved").await.unwrap();
}

#[tokio::test]
async fn test_telegram_rejection_uses_description() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&mock_server)
        .await;

    let sink = TelegramSink::with_api_base("tg", mock_server.uri(), "123:abc", "-100");
    let error = sink.send("whale moved").await.unwrap_err();

    assert_eq!(error.to_string(), "Rejected by channel: Bad Request: chat not found");
}

#[tokio::test]
async fn test_telegram_unparseable_reply_reports_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&mock_server)
        .await;

    let sink = TelegramSink::with_api_base("tg", mock_server.uri(), "123:abc", "-100");
    let error = sink.send("whale moved").await.unwrap_err();

    assert!(matches!(error, SinkError::Status { status: 502, .. }));
}

#[tokio::test]
async fn test_fanout_reports_each_failing_sink() {
    let mock_server = MockServer::start().await;

    for mode in [DispatchMode::Sequential, DispatchMode::Concurrent] {
        mock_server.reset().await;
        Mock::given(method("POST"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botbad/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fanout = Fanout::new(mode)
            .with_sink(Arc::new(WebhookSink::new("healthy", format!("{}/ok", mock_server.uri()), None)))
            .with_sink(Arc::new(WebhookSink::new(
                "broken",
                format!("{}/broken", mock_server.uri()),
                None,
            )))
            .with_sink(Arc::new(TelegramSink::with_api_base("tg", mock_server.uri(), "bad", "-100")));

        let alert = Alert::new("Rule 'big-tx' triggered", "whale moved", Severity::High);
        let error = fanout.send(&alert).await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "broken: HTTP 500: boom; tg: Rejected by channel: Forbidden: bot was blocked by the user"
        );
        mock_server.verify().await;
    }
}
