//! Integration tests for the HTTP evaluation service
//!
//! Serves the router on an ephemeral port and evaluates against the scripted
//! environment, with wiremock standing in for the model API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use gymharness::env::EnvRegistry;
use gymharness::eval::EvaluationReport;
use gymharness::server::{router, AppState};
use gymharness::HarnessConfig;

async fn serve(config: HarnessConfig) -> String {
    let state = AppState::new(Arc::new(config), Arc::new(EnvRegistry::builtin()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(env_name: &str, api_key: &str) -> HarnessConfig {
    let mut config = HarnessConfig {
        env_name: env_name.into(),
        ..HarnessConfig::default()
    };
    config.agent.api_key = api_key.into();
    config.agent.retry_delay_ms = 10;
    config
}

async fn model_server(models_status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(models_status))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Thought: go\n\nAction: look"}}]
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_is_ok() {
    let base = serve(config("mock", "k")).await;
    let body: serde_json::Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!("ok"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_answers_during_slow_evaluation() {
    let model = model_server(200).await;
    let env = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .mount(&env)
        .await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"observation": "You see a door.", "reward": 0.0, "score": 0.0, "done": false}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&env)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "Done.", "reward": 1.0, "score": 1.0, "done": true
        })))
        .mount(&env)
        .await;

    let base = serve(config("babyai", "k")).await;
    let evaluation = tokio::spawn({
        let url = format!("{base}/evaluator");
        let body = json!({
            "model": "m",
            "base_url": model.uri(),
            "env_server_base": env.uri(),
            "ids": [0],
            "max_round": 1,
            "timeout": 30
        });
        async move { reqwest::Client::new().post(url).json(&body).send().await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let health = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap()
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.json::<serde_json::Value>().await.unwrap(), json!("ok"));
    assert!(!evaluation.is_finished(), "evaluation should still be waiting on reset");

    let resp = evaluation.await.unwrap().unwrap();
    assert_eq!(resp.status(), 200);
    let report: EvaluationReport = resp.json().await.unwrap();
    assert_eq!(report.num_evaluated, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_evaluator_runs_batch() {
    let model = model_server(200).await;
    let base = serve(config("mock", "k")).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/evaluator"))
        .json(&json!({
            "model": "test-model",
            "base_url": model.uri(),
            "ids": [0, 1, 2],
            "max_round": 6,
            "data_len": 3
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let report: EvaluationReport = resp.json().await.unwrap();
    assert_eq!(report.task_name, "mock");
    assert_eq!(report.num_evaluated, 3);
    assert!(report.details[0].success);
    assert!(report.details[1].success);
    assert!(!report.details[2].success);
    assert!((report.success_rate - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_ids_cover_data_len() {
    let model = model_server(200).await;
    let base = serve(config("mock", "k")).await;

    let report: EvaluationReport = reqwest::Client::new()
        .post(format!("{base}/evaluator"))
        .json(&json!({"model": "m", "base_url": model.uri(), "data_len": 4, "max_round": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<usize> = report.details.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_key_is_unauthorized() {
    let base = serve(config("mock", "")).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/evaluator"))
        .json(&json!({"model": "m"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["detail"],
        "CHUTES_API_KEY environment variable is not set"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_key_is_unauthorized() {
    let model = model_server(403).await;
    let base = serve(config("mock", "k")).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/evaluator"))
        .json(&json!({"model": "m", "base_url": model.uri()}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Invalid API key for"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_environment_is_bad_request() {
    let base = serve(config("chess", "k")).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/evaluator"))
        .json(&json!({"model": "m"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("chess"));
}
