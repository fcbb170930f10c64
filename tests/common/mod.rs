//! Common test utilities for hn-digest integration tests
//!
//! One wiremock server stands in for every remote collaborator: the story
//! search API, the item API, the chat completions backend and the Telegram
//! Bot API. Each lives under its own path prefix.

#![allow(dead_code)]

use hn_digest::Config;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bot token used in Telegram paths
pub const BOT_TOKEN: &str = "123:test";

/// Chat the digest is delivered to
pub const CHAT_ID: i64 = 4242;

/// Config pointing every endpoint at `server`, journaling into `log_dir`
pub fn config_for(server: &MockServer, log_dir: &Path) -> Config {
    let mut config = Config::default();
    config.item_store.base_url = format!("{}/v0", server.uri());
    config.item_store.search_url = format!("{}/search", server.uri());
    config.generation.base_url = format!("{}/v1", server.uri());
    config.generation.api_key = "sk-test".to_string();
    config.telegram.api_url = server.uri();
    config.telegram.bot_token = BOT_TOKEN.to_string();
    config.telegram.chat_id = CHAT_ID;
    config.fetch.story_delay = Duration::ZERO;
    config.logging.log_dir = log_dir.to_path_buf();
    config.logging.async_write = false;
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.jitter = false;
    config
}

/// Search hit for a front-page story
pub fn hit(id: i64, title: &str, comments: i64) -> Value {
    json!({
        "objectID": id.to_string(),
        "title": title,
        "url": format!("https://example.com/{id}"),
        "points": 250,
        "author": "pg",
        "created_at_i": 1_709_996_400,
        "num_comments": comments
    })
}

/// Answer the story search with `hits`
pub async fn mount_search(server: &MockServer, hits: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/search/search_by_date"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": hits })))
        .mount(server)
        .await;
}

/// Serve a story item with the given comment ids
pub async fn mount_story_item(server: &MockServer, id: i64, kids: &[i64]) {
    mount_item(
        server,
        id,
        json!({"id": id, "type": "story", "by": "pg", "kids": kids, "time": 1_709_996_400}),
    )
    .await;
}

/// Serve a comment item
pub async fn mount_comment(server: &MockServer, id: i64, author: &str, text: &str, kids: &[i64]) {
    mount_item(
        server,
        id,
        json!({"id": id, "type": "comment", "by": author, "text": text, "kids": kids}),
    )
    .await;
}

/// Serve an arbitrary item body
pub async fn mount_item(server: &MockServer, id: i64, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v0/item/{id}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Fail every lookup of item `id` with `status`
pub async fn mount_failing_item(server: &MockServer, id: i64, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/v0/item/{id}.json")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Answer every chat completion with `reply`
pub async fn mount_completion(server: &MockServer, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": reply}}]
        })))
        .mount(server)
        .await;
}

/// Accept every Telegram message
pub async fn mount_telegram(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/bot[^/]+/sendMessage$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 1}})),
        )
        .mount(server)
        .await;
}

/// Bodies of every request made to `path_suffix`, in arrival order
pub async fn requests_to(server: &MockServer, path_suffix: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path().ends_with(path_suffix))
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}

/// Item ids requested from the item API
pub async fn fetched_item_ids(server: &MockServer) -> Vec<i64> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter_map(|request| {
            request
                .url
                .path()
                .strip_prefix("/v0/item/")?
                .strip_suffix(".json")?
                .parse()
                .ok()
        })
        .collect()
}
