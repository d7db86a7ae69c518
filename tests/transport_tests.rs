use recap::errors::SendError;
use recap::telegram::{ChatTransport, ParseMode, TelegramClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TOKEN: &str = "123456:TEST";

fn client(server: &MockServer) -> TelegramClient {
    TelegramClient::new(&server.uri(), TOKEN)
}

fn api_path(method: &str) -> String {
    format!("/bot{TOKEN}/{method}")
}

fn api_error(code: u16, description: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "ok": false,
        "error_code": code,
        "description": description
    }))
}

#[tokio::test]
async fn test_send_message_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": "-100200",
            "text": "*hello*",
            "parse_mode": "Markdown"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 777, "chat": { "id": -100200 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server)
        .send_message("-100200", "*hello*", ParseMode::Markdown)
        .await
        .unwrap();
    assert_eq!(id, "777");
}

#[tokio::test]
async fn test_plain_mode_sends_no_parse_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 1 }
        })))
        .mount(&server)
        .await;

    client(&server)
        .send_message("-1", "plain text", ParseMode::Plain)
        .await
        .unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert!(body.get("parse_mode").is_none());
    assert_eq!(body["text"], "plain text");
}

#[tokio::test]
async fn test_markup_rejection_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("editMessageText")))
        .respond_with(api_error(
            400,
            "Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 4",
        ))
        .mount(&server)
        .await;

    let err = client(&server)
        .edit_message("-1", "42", "*open", ParseMode::Markdown)
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::MarkupParse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_forbidden_is_permission_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(api_error(403, "Forbidden: bot was kicked from the supergroup chat"))
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message("-1", "hi", ParseMode::Plain)
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Permission(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unchanged_edit_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("editMessageText")))
        .and(body_partial_json(json!({ "message_id": 42 })))
        .respond_with(api_error(
            400,
            "Bad Request: message is not modified: specified new message content and reply markup are exactly the same",
        ))
        .mount(&server)
        .await;

    client(&server)
        .edit_message("-1", "42", "same text", ParseMode::Plain)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rate_limit_waits_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 0",
            "parameters": { "retry_after": 0 }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 9 }
        })))
        .mount(&server)
        .await;

    let id = client(&server)
        .send_message("-1", "hi", ParseMode::Plain)
        .await
        .unwrap();
    assert_eq!(id, "9");
}

#[tokio::test]
async fn test_server_error_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .send_message("-1", "hi", ParseMode::Plain)
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "got {err:?}");
}
