mod harness;

use harness::config::ConfigBuilder;
use harness::mock_provider::MockProvider;
use harness::server::TestServer;

async fn server() -> (MockProvider, TestServer) {
    let hosted = MockProvider::hosted(&["gpt-4", "gpt-3.5-turbo"]).await.unwrap();
    let config = ConfigBuilder::new()
        .with_hosted_provider("hosted", &hosted.base_url(), &[])
        .build();
    let server = TestServer::start(config).await.unwrap();
    (hosted, server)
}

#[tokio::test]
async fn suggestion_ranks_every_candidate() {
    let (_hosted, server) = server().await;

    let (status, body) = server
        .post_json(
            "/suggest",
            &serde_json::json!({
                "contentSample": "Traceback (most recent call last):\n  File \"app.py\", line 3, in <module>\nValueError: bad",
                "logType": "error",
                "hasStructuredError": true,
                "availableModelIds": ["gpt-3.5-turbo", "gpt-4"]
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "ranked");
    let ordered = body["orderedCandidates"].as_array().unwrap();
    assert_eq!(ordered.len(), 2);
    assert_eq!(body["suggestedModelId"], ordered[0]);
    assert!(["low", "medium", "high"].contains(&body["confidence"].as_str().unwrap()));
}

#[tokio::test]
async fn empty_candidate_list_is_a_structured_result() {
    let (_hosted, server) = server().await;

    let (status, body) = server
        .post_json(
            "/suggest",
            &serde_json::json!({ "contentSample": "hello", "category": "text", "availableModelIds": [] }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "no_models_available");
    assert!(body["suggestedModelId"].is_null());
}

#[tokio::test]
async fn feedback_is_accepted_and_validated() {
    let (_hosted, server) = server().await;

    let (status, _) = server
        .post_json(
            "/suggest-feedback",
            &serde_json::json!({
                "suggestedModelId": "gpt-4",
                "selectedModelId": "gpt-3.5-turbo",
                "wasAccepted": true,
                "category": "code",
                "contentLengthBucket": "s",
                "userId": "user-7"
            }),
        )
        .await;
    assert_eq!(status, 201);

    let (status, body) = server
        .post_json(
            "/suggest-feedback",
            &serde_json::json!({ "suggestedModelId": "gpt-4", "wasAccepted": true }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["type"], "validation_error");
}
