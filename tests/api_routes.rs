mod common;

use common::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xreply::oauth::TokenStorage;

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    }))
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let harness = Harness::new(config_for(&server));

    let (status, _, body) = harness.send(get("/health")).await;
    assert_eq!(status.as_u16(), 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_generate_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "max_tokens": 280 })))
        .respond_with(completion("Great point about lifetimes."))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(config_for(&server));
    let (status, _, body) = harness
        .send(post_json(
            "/api/twitter/generate",
            json!({ "tweetText": "  Lifetimes finally clicked  " }),
        ))
        .await;

    assert_eq!(status.as_u16(), 200);
    assert_eq!(body, json!({ "reply": "Great point about lifetimes." }));
}

#[tokio::test]
async fn test_generate_rejects_blank_text() {
    let server = MockServer::start().await;
    let harness = Harness::new(config_for(&server));

    for payload in [json!({}), json!({ "tweetText": "   " }), json!({ "tweetText": 7 })] {
        let (status, _, body) = harness
            .send(post_json("/api/twitter/generate", payload))
            .await;
        assert_eq!(status.as_u16(), 400);
        assert_eq!(
            body,
            json!({ "error": "tweetText is required and must be a non-empty string" })
        );
    }
}

#[tokio::test]
async fn test_generate_without_api_key() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    config.openai.api_key = None;
    let harness = Harness::new(config);

    let (status, _, body) = harness
        .send(post_json("/api/twitter/generate", json!({ "tweetText": "hi" })))
        .await;
    assert_eq!(status.as_u16(), 500);
    assert_eq!(body, json!({ "error": "OPENAI_API_KEY is missing" }));
}

#[tokio::test]
async fn test_post_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(header("authorization", "Bearer A1"))
        .and(body_partial_json(json!({
            "text": "Nice thread",
            "reply": { "in_reply_to_tweet_id": "123" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "id": "555", "text": "Nice thread" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(config_for(&server));
    harness.storage.save("A1", Some("R1"), 3600).unwrap();

    let (status, _, body) = harness
        .send(post_json(
            "/api/twitter/reply",
            json!({ "tweetId": " 123 ", "text": "  Nice thread " }),
        ))
        .await;
    assert_eq!(status.as_u16(), 200);
    assert_eq!(body, json!({ "success": true, "tweetId": "555" }));
}

#[tokio::test]
async fn test_post_reply_validation_and_auth() {
    let server = MockServer::start().await;
    let harness = Harness::new(config_for(&server));

    let (status, _, body) = harness
        .send(post_json("/api/twitter/reply", json!({ "text": "hi" })))
        .await;
    assert_eq!(status.as_u16(), 400);
    assert_eq!(
        body,
        json!({ "error": "tweetId is required and must be a non-empty string" })
    );

    let (status, _, body) = harness
        .send(post_json("/api/twitter/reply", json!({ "tweetId": "1", "text": "" })))
        .await;
    assert_eq!(status.as_u16(), 400);
    assert_eq!(
        body,
        json!({ "error": "text is required and must be a non-empty string" })
    );

    let (status, _, body) = harness
        .send(post_json("/api/twitter/reply", json!({ "tweetId": "1", "text": "hi" })))
        .await;
    assert_eq!(status.as_u16(), 401);
    assert_eq!(
        body,
        json!({ "error": "Not authenticated. Connect X account first." })
    );
}

#[tokio::test]
async fn test_post_reply_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(403).set_body_string("duplicate content"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(config_for(&server));
    harness.storage.save("A1", Some("R1"), 3600).unwrap();

    let (status, _, body) = harness
        .send(post_json("/api/twitter/reply", json!({ "tweetId": "1", "text": "hi" })))
        .await;
    assert_eq!(status.as_u16(), 502);
    assert_eq!(body, json!({ "error": "X API error: 403 duplicate content" }));
}

#[tokio::test]
async fn test_search_with_replies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(wiremock::matchers::query_param("max_results", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "1", "text": "first" },
                { "id": "2", "text": "second" },
                { "id": "3", "text": "third" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
        .respond_with(completion(r#"{"humorous":"lol","insightful":"hmm"}"#))
        .expect(2)
        .mount(&server)
        .await;

    let harness = Harness::new(config_for(&server));
    harness.storage.save("A1", Some("R1"), 3600).unwrap();

    let (status, _, body) = harness
        .send(post_json(
            "/api/twitter/search-with-replies",
            json!({ "query": "rust", "maxResults": 2 }),
        ))
        .await;

    assert_eq!(status.as_u16(), 200);
    assert_eq!(
        body,
        json!({
            "items": [
                { "tweet": { "id": "1", "text": "first" }, "humorous": "lol", "insightful": "hmm" },
                { "tweet": { "id": "2", "text": "second" }, "humorous": "lol", "insightful": "hmm" }
            ]
        })
    );
}

#[tokio::test]
async fn test_search_with_replies_generation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "1", "text": "first" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(r#"{"humorous":"lol"}"#))
        .mount(&server)
        .await;

    let harness = Harness::new(config_for(&server));
    harness.storage.save("A1", Some("R1"), 3600).unwrap();

    let (status, _, body) = harness
        .send(post_json(
            "/api/twitter/search-with-replies",
            json!({ "query": "rust" }),
        ))
        .await;
    assert_eq!(status.as_u16(), 502);
    assert_eq!(
        body,
        json!({ "error": "OpenAI variants missing humorous or insightful reply" })
    );
}

#[tokio::test]
async fn test_search_with_replies_requires_query() {
    let server = MockServer::start().await;
    let harness = Harness::new(config_for(&server));

    let (status, _, body) = harness
        .send(post_json("/api/twitter/search-with-replies", json!({ "query": " " })))
        .await;
    assert_eq!(status.as_u16(), 400);
    assert_eq!(
        body,
        json!({ "error": "query is required and must be a non-empty string" })
    );
}
