mod harness;

use harness::config::ConfigBuilder;
use harness::mock_provider::MockProvider;
use harness::server::TestServer;

#[tokio::test]
async fn startup_discovery_registers_listed_models() {
    let hosted = MockProvider::hosted(&["gpt-4", "gpt-3.5-turbo"]).await.unwrap();
    let local = MockProvider::local(&["llama2:13b", "mistral"]).await.unwrap();
    let config = ConfigBuilder::new()
        .with_hosted_provider("hosted", &hosted.base_url(), &[])
        .with_local_provider("local", &local.base_url())
        .build();

    let server = TestServer::start(config).await.unwrap();
    let (status, body) = server.get_json("/models").await;

    assert_eq!(status, 200);
    let models = body["models"].as_array().unwrap();
    let ids: Vec<&str> = models.iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["gpt-3.5-turbo", "gpt-4", "llama2:13b", "mistral"]);

    let llama = models.iter().find(|m| m["id"] == "llama2:13b").unwrap();
    assert_eq!(llama["provider"], "local_inference");
    assert_eq!(llama["providerName"], "local");
    assert_eq!(llama["status"], "unknown");
}

#[tokio::test]
async fn static_models_survive_an_unreachable_provider() {
    let hosted = MockProvider::hosted(&[]).await.unwrap();
    hosted.take_listing_down();
    let config = ConfigBuilder::new()
        .with_hosted_provider("hosted", &hosted.base_url(), &["gpt-4"])
        .build();

    let server = TestServer::start(config).await.unwrap();
    let (_, body) = server.get_json("/models").await;

    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["id"], "gpt-4");
    assert_eq!(models[0]["consecutiveProbeFailures"], 1);
}

#[tokio::test]
async fn status_reports_summary_after_traffic() {
    let hosted = MockProvider::hosted(&["gpt-4", "gpt-3.5-turbo"]).await.unwrap();
    let config = ConfigBuilder::new()
        .with_hosted_provider("hosted", &hosted.base_url(), &[])
        .build();

    let server = TestServer::start(config).await.unwrap();
    let (status, _) = server
        .post_json("/process", &serde_json::json!({ "modelId": "gpt-4", "prompt": "hello" }))
        .await;
    assert_eq!(status, 200);

    let (status, body) = server.get_json("/models/status").await;

    assert_eq!(status, 200);
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["summary"]["healthy"], 1);
    assert_eq!(body["summary"]["unknown"], 1);
    assert_eq!(body["breakers"][0]["provider"], "hosted");
    assert_eq!(body["breakers"][0]["state"], "closed");
}

#[tokio::test]
async fn benchmark_stores_a_snapshot() {
    let hosted = MockProvider::hosted(&["gpt-4"]).await.unwrap();
    let config = ConfigBuilder::new()
        .with_hosted_provider("hosted", &hosted.base_url(), &[])
        .build();

    let server = TestServer::start(config).await.unwrap();
    let (status, body) = server
        .post_json("/models/gpt-4/benchmark", &serde_json::json!({}))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["totalTokens"], 20);
    let cost = body["estimatedCost"].as_f64().unwrap();
    assert!((cost - 0.0006).abs() < 1e-9);
    assert_eq!(hosted.completions_for("gpt-4"), 1);

    let (_, models) = server.get_json("/models").await;
    assert!(models["models"][0]["lastBenchmark"].is_object());
}

#[tokio::test]
async fn benchmark_of_failing_model_is_bad_gateway() {
    let hosted = MockProvider::hosted(&["gpt-4"]).await.unwrap();
    hosted.fail_next(1, 500);
    let config = ConfigBuilder::new()
        .with_hosted_provider("hosted", &hosted.base_url(), &[])
        .build();

    let server = TestServer::start(config).await.unwrap();
    let (status, body) = server
        .post_json("/models/gpt-4/benchmark", &serde_json::json!({}))
        .await;

    assert_eq!(status, 502);
    assert_eq!(body["error"]["type"], "benchmark_failed");
    assert_eq!(hosted.completion_count(), 1);
}
