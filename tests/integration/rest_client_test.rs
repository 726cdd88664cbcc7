//! REST client tests against a wiremock server

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::assert_err;
use crate::common::{RecordingChannel, LOCAL_USER};
use webchat_sync::client::{Config, MessageBackend, RestClient};
use webchat_sync::shared::config::AppConfig;
use webchat_sync::shared::error::SyncError;
use webchat_sync::shared::messaging::{Attachment, ConversationId, MessageId};
use webchat_sync::sync::ChatSession;

fn config_for(server: &MockServer, token: Option<&str>) -> Config {
    let mut config = Config::with_builder(AppConfig::builder().server_url(server.uri())).unwrap();
    config.set_token(token.map(str::to_string));
    config
}

async fn client(server: &MockServer) -> RestClient {
    RestClient::new(config_for(server, Some("secret")))
}

fn conv(id: &str) -> ConversationId {
    ConversationId::new(id)
}

#[tokio::test]
async fn test_fetch_page_reads_messages_and_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/c1"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"id": 2, "content": "newer", "sender": 9},
                {"id": 1, "content": "older", "sender": 9}
            ],
            "lastKey": "k1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&server).await.fetch_page(&conv("c1"), None).await.unwrap();
    assert_eq!(page.messages.len(), 2);
    assert_eq!(page.next_cursor.as_deref(), Some("k1"));
}

#[tokio::test]
async fn test_fetch_page_sends_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/c1"))
        .and(query_param("lastKey", "k1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 0, "content": "first ever", "sender": 9}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&server)
        .await
        .fetch_page(&conv("c1"), Some("k1"))
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn test_send_text_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/add"))
        .and(body_partial_json(json!({
            "conversation_id": "c1",
            "sender": LOCAL_USER,
            "content": "hi",
            "type": "text"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "message": {"id": 55, "conversation_id": "c1", "sender": LOCAL_USER, "content": "hi"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let raw = client(&server)
        .await
        .send_text(&conv("c1"), LOCAL_USER, "hi")
        .await
        .unwrap();
    assert_eq!(raw.first_string(&["id"]).as_deref(), Some("55"));
}

#[tokio::test]
async fn test_send_attachment_uploads_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/sendImage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 56,
            "type": "file",
            "url": "https://cdn.test/0b7e3f2a-5d1c-4e8b-9a6f-1c2d3e4f5a6b.pdf"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let attachment = Attachment::new("Plan.pdf", "application/pdf", b"%PDF".to_vec());
    let raw = client(&server)
        .await
        .send_attachment(&conv("c1"), LOCAL_USER, &attachment)
        .await
        .unwrap();
    assert_eq!(raw.first_string(&["type"]).as_deref(), Some("file"));

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"Plan.pdf\""));
}

#[tokio::test]
async fn test_mutations_hit_message_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/messages/5/update"))
        .and(body_partial_json(json!({"content": "fixed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/messages/5/revoke"))
        .and(body_partial_json(json!({"user_id": LOCAL_USER, "conversation_id": "c1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/messages/5"))
        .and(body_partial_json(json!({"user_id": LOCAL_USER})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let id = MessageId::from(5);
    client.update_message(&id, "fixed").await.unwrap();
    client.revoke_message(&id, &conv("c1"), LOCAL_USER).await.unwrap();
    client.delete_message(&id, &conv("c1"), LOCAL_USER).await.unwrap();
}

#[tokio::test]
async fn test_error_statuses_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/userDetails/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "User not found"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/messages/1/update"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
        .mount(&server)
        .await;

    let client = client(&server).await;
    let err = client.fetch_user_detail(404).await.unwrap_err();
    assert_eq!(err, SyncError::NotFound("User not found".to_string()));

    let err = client
        .update_message(&MessageId::from(1), "x")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SyncError::Server {
            status: 500,
            message: "boom".to_string()
        }
    );
}

#[tokio::test]
async fn test_missing_token_fails_before_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = RestClient::new(config_for(&server, None));
    assert_err!(
        client.fetch_page(&conv("c1"), None).await,
        SyncError::Validation { .. }
    );
}

#[tokio::test]
async fn test_conversations_and_participants() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/user/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"conversation_id": "c1"}, {"conversation_id": "c2"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversation_id": "c1",
            "participants": ["7", "9"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/userDetails/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": 9,
            "fullname": "Lan Pham",
            "avatar": "https://cdn.test/lan.png"
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;
    assert_eq!(client.fetch_conversations(7).await.unwrap().len(), 2);
    assert_eq!(client.fetch_participants(&conv("c1")).await.unwrap(), vec![7, 9]);
    let detail = client.fetch_user_detail(9).await.unwrap();
    assert_eq!(detail.display_name, "Lan Pham");
    assert_eq!(detail.avatar.as_deref(), Some("https://cdn.test/lan.png"));
}

#[tokio::test]
async fn test_session_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/c1"))
        .and(query_param("lastKey", "k1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": 1, "content": "first", "sender": 9, "created_at": "2024-05-01T10:00:01Z"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/messages/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"id": 3, "content": "third", "sender": 9, "created_at": "2024-05-01T10:00:03Z"},
                {"id": 2, "content": "second", "sender": 9, "created_at": "2024-05-01T10:00:02Z"}
            ],
            "lastKey": "k1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/messages/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4, "conversation_id": "c1", "sender": LOCAL_USER, "content": "reply",
            "created_at": "2024-05-01T10:00:04Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(RestClient::new(config_for(&server, Some("secret"))));
    let mut session = ChatSession::new(backend, RecordingChannel::new(), LOCAL_USER, Duration::from_secs(3));
    session.open(conv("c1")).unwrap();

    assert_eq!(session.load_older().await.unwrap(), 2);
    assert_eq!(session.load_older().await.unwrap(), 1);
    assert!(!session.has_more());
    session.send_text("reply").await.unwrap();

    let contents: Vec<&str> = session.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third", "reply"]);
}
