//! Axum router configuration with middleware.
//!
//! Routes sit at the root, matching the paths the proxy client backend
//! calls. Middleware: permissive CORS and request tracing.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chats", get(handlers::chat::list_chats))
        .route(
            "/chat",
            get(handlers::chat::get_chat)
                .post(handlers::chat::create_chat)
                .patch(handlers::chat::update_chat)
                .put(handlers::chat::send_message)
                .delete(handlers::chat::delete_chat),
        )
        .route("/chat/message", delete(handlers::chat::delete_message))
        .route("/chat/cancel", post(handlers::chat::cancel_chat))
        .route("/models", get(handlers::models::list_models))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use lmchat_core::repository::ConversationRepository;
    use lmchat_infra::backend::Backend;
    use lmchat_infra::llm::LmStudioTransport;
    use lmchat_infra::sqlite::{DatabasePool, SqliteConversationRepository};
    use lmchat_types::config::ChatConfig;
    use lmchat_types::error::{RepositoryError, StreamError};

    async fn test_state(tmp: &TempDir, lm_studio: &str) -> AppState {
        let pool = DatabasePool::open_in(tmp.path()).await.unwrap();
        let backend = Backend::Local {
            store: SqliteConversationRepository::new(pool),
            llm: LmStudioTransport::new(lm_studio, Duration::from_secs(5)).unwrap(),
        };
        AppState::from_backend(backend, ChatConfig::default(), PathBuf::from(tmp.path()))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn call(state: &AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn call_json(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = call(state, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_list_and_get() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, "http://127.0.0.1:1/v1").await;

        let (status, body) = call_json(
            &state,
            json_request("POST", "/chat", json!({"name": "Notes", "model": "qwen", "temperature": 0.2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        let id = body["id"].as_i64().unwrap();

        let (status, body) = call_json(&state, empty_request("GET", "/chats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chats"], json!([{"id": id, "name": "Notes", "model": "qwen"}]));

        let (status, body) = call_json(&state, empty_request("GET", &format!("/chat?id={id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chat"]["temperature"], 0.2);
        assert_eq!(body["chat"]["top_k"], 40);
        assert_eq!(body["chat"]["messages"], json!([]));
    }

    #[tokio::test]
    async fn test_create_with_history_keeps_messages() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, "http://127.0.0.1:1/v1").await;

        let (_, body) = call_json(
            &state,
            json_request(
                "POST",
                "/chat",
                json!({
                    "name": "Imported",
                    "model": "qwen",
                    "messages": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]
                }),
            ),
        )
        .await;
        let id = body["id"].as_i64().unwrap();

        let stored = state.backend().load(id).await.unwrap();
        assert_eq!(stored.messages.len(), 2);
        let (_, body) = call_json(&state, empty_request("GET", "/chats")).await;
        assert_eq!(body["chats"][0]["name"], "Imported");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, "http://127.0.0.1:1/v1").await;

        let (status, body) = call_json(&state, empty_request("GET", "/chat?id=99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Chat not found");

        let (status, _) = call_json(&state, json_request("POST", "/chat", json!({"model": "qwen"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(&state, json_request("POST", "/chat", json!({"name": "A", "model": "qwen"}))).await;
        let (status, body) =
            call_json(&state, json_request("POST", "/chat", json!({"name": "A", "model": "qwen"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "error");

        let (status, _) = call_json(&state, empty_request("POST", "/chat/cancel?id=1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_delete_message_and_delete_chat() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, "http://127.0.0.1:1/v1").await;
        let (_, body) = call_json(
            &state,
            json_request(
                "POST",
                "/chat",
                json!({"name": "A", "model": "qwen", "messages": [
                    {"role": "user", "content": "one"},
                    {"role": "assistant", "content": "two"}
                ]}),
            ),
        )
        .await;
        let id = body["id"].as_i64().unwrap();

        let mut record = state.backend().load(id).await.unwrap();
        record.name = "Renamed".to_string();
        let (status, _) = call_json(&state, json_request("PATCH", "/chat", serde_json::to_value(&record).unwrap())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, listing) = call_json(&state, empty_request("GET", "/chats")).await;
        assert_eq!(listing["chats"][0]["name"], "Renamed");

        let (status, _) =
            call_json(&state, json_request("DELETE", "/chat/message", json!({"id": id, "index": 5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call_json(&state, json_request("DELETE", "/chat/message", json!({"id": id, "index": 0}))).await;
        assert_eq!(status, StatusCode::OK);
        let stored = state.backend().load(id).await.unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].content, "two");

        let (status, _) = call_json(&state, empty_request("DELETE", &format!("/chat?id={id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, listing) = call_json(&state, empty_request("GET", "/chats")).await;
        assert_eq!(listing["chats"], json!([]));

        let (status, _) = call_json(&state, empty_request("DELETE", &format!("/chat?id={id}"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_send_message_relays_and_persists() {
        let lm_studio = MockServer::start().await;
        let mut upstream = String::new();
        for fragment in ["Hel", "lo"] {
            upstream.push_str(&format!(
                "data: {}\n\n",
                json!({"choices": [{"index": 0, "delta": {"content": fragment}}]})
            ));
        }
        upstream.push_str("data: [DONE]\n\n");
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, "text/event-stream"))
            .mount(&lm_studio)
            .await;

        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, &format!("{}/v1", lm_studio.uri())).await;
        let (_, body) = call_json(&state, json_request("POST", "/chat", json!({"name": "A", "model": "qwen"}))).await;
        let id = body["id"].as_i64().unwrap();

        let (status, bytes) = call(
            &state,
            json_request("PUT", "/chat", json!({"id": id, "message": {"role": "user", "content": "Say hello"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let text = String::from_utf8(bytes).unwrap();
        let payloads: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .collect();
        assert_eq!(payloads.last(), Some(&"[DONE]"));
        let relayed: String = payloads[..payloads.len() - 1]
            .iter()
            .map(|p| {
                let chunk: Value = serde_json::from_str(p).unwrap();
                chunk["choices"][0]["delta"]["content"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(relayed, "Hello");

        let stored = state.backend().load(id).await.unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].content, "Say hello");
        assert_eq!(stored.messages[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_send_message_reports_upstream_error_in_band() {
        let lm_studio = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&lm_studio)
            .await;

        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, &format!("{}/v1", lm_studio.uri())).await;
        let (_, body) = call_json(&state, json_request("POST", "/chat", json!({"name": "A", "model": "qwen"}))).await;
        let id = body["id"].as_i64().unwrap();

        let (status, bytes) = call(
            &state,
            json_request("PUT", "/chat", json!({"id": id, "message": {"role": "user", "content": "hi"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(bytes).unwrap();
        let payload = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let error: Value = serde_json::from_str(payload).unwrap();
        assert!(error["error"].as_str().unwrap().starts_with("LM Studio error:"));
        assert!(state.backend().load(id).await.unwrap().messages.is_empty());
    }

    fn slow_upstream_reply() -> ResponseTemplate {
        let mut upstream = String::new();
        for fragment in ["Hel", "lo"] {
            upstream.push_str(&format!(
                "data: {}\n\n",
                json!({"choices": [{"index": 0, "delta": {"content": fragment}}]})
            ));
        }
        upstream.push_str("data: [DONE]\n\n");
        ResponseTemplate::new(200)
            .set_body_raw(upstream, "text/event-stream")
            .set_delay(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_concurrent_sends_get_one_stream_and_one_conflict() {
        let lm_studio = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(slow_upstream_reply())
            .mount(&lm_studio)
            .await;

        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, &format!("{}/v1", lm_studio.uri())).await;
        let (_, body) = call_json(&state, json_request("POST", "/chat", json!({"name": "A", "model": "qwen"}))).await;
        let id = body["id"].as_i64().unwrap();

        let send = |content: &str| {
            json_request("PUT", "/chat", json!({"id": id, "message": {"role": "user", "content": content}}))
        };
        let (first, second) = tokio::join!(call(&state, send("one")), call(&state, send("two")));

        let mut statuses = [first.0, second.0];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

        let rejected = if first.0 == StatusCode::CONFLICT { &first.1 } else { &second.1 };
        let rejected: Value = serde_json::from_slice(rejected).unwrap();
        assert_eq!(rejected["status"], "error");

        let stored = state.backend().load(id).await.unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_send_reports_store_failure_with_its_kind() {
        let lm_studio = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(slow_upstream_reply())
            .mount(&lm_studio)
            .await;

        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, &format!("{}/v1", lm_studio.uri())).await;
        let (_, body) = call_json(&state, json_request("POST", "/chat", json!({"name": "A", "model": "qwen"}))).await;
        let id = body["id"].as_i64().unwrap();

        // The reply still carries the old name when it is written back.
        let send = call(
            &state,
            json_request("PUT", "/chat", json!({"id": id, "message": {"role": "user", "content": "hi"}})),
        );
        let take_name = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            state.catalog.rename(id, "X").await.unwrap();
            state.catalog.create("A", "qwen", &Default::default()).await.unwrap();
        };
        let ((status, bytes), ()) = tokio::join!(send, take_name);
        assert_eq!(status, StatusCode::OK);

        let text = String::from_utf8(bytes).unwrap();
        let last = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .last()
            .unwrap();
        let error: Value = serde_json::from_str(last).unwrap();
        assert_eq!(error["kind"], "constraint_violation");
        assert!(!error["error"].as_str().unwrap().starts_with("LM Studio error"));

        let parsed = lmchat_core::stream::parser::parse_line(&format!("data: {last}"));
        assert!(matches!(
            parsed,
            Err(StreamError::Persistence(RepositoryError::ConstraintViolation(_)))
        ));
        assert_eq!(state.backend().load(id).await.unwrap().name, "X");
    }

    #[tokio::test]
    async fn test_send_rejects_non_user_role() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, "http://127.0.0.1:1/v1").await;
        let (_, body) = call_json(&state, json_request("POST", "/chat", json!({"name": "A", "model": "qwen"}))).await;
        let id = body["id"].as_i64().unwrap();

        let (status, _) = call(
            &state,
            json_request("PUT", "/chat", json!({"id": id, "message": {"role": "assistant", "content": "hi"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_models_lists_chat_models() {
        let lm_studio = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "qwen"}, {"id": "text-embedding-nomic"}]
            })))
            .mount(&lm_studio)
            .await;

        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, &format!("{}/v1", lm_studio.uri())).await;
        let (status, body) = call_json(&state, empty_request("GET", "/models")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "success", "models": ["qwen"]}));
    }
}
