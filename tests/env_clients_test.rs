//! Integration tests for the environment clients
//!
//! Each adapter is pointed at a wiremock server standing in for the real
//! environment server.

use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{body_json, body_partial_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use gymharness::env::action::{MISSING_ACTION_MESSAGE, MULTIPLE_ACTIONS_MESSAGE};
use gymharness::env::alfworld::AlfWorldClient;
use gymharness::env::babyai::BabyAiClient;
use gymharness::env::maze::{self, MazeClient};
use gymharness::env::sciworld::SciWorldClient;
use gymharness::env::sqlgym::SqlGymClient;
use gymharness::env::textcraft::TextCraftClient;
use gymharness::env::webshop::WebShopClient;
use gymharness::env::wordle::WordleClient;
use gymharness::env::{EnvClient, EnvSettings, SessionId};
use gymharness::HarnessError;

fn settings(server: &MockServer) -> EnvSettings {
    EnvSettings::new(server.uri(), 10, 5)
}

async fn mount_create(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// BabyAI
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_babyai_sends_one_sanitized_action() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 7})).await;

    Mock::given(method("POST"))
        .and(path("/reset"))
        .and(body_json(json!({"id": 7, "data_idx": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "You see a red ball.",
            "reward": 0.0,
            "score": 0.0,
            "done": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/step"))
        .and(body_json(json!({"id": 7, "action": "go to red ball 1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "You reached the red ball.",
            "reward": 0.1,
            "score": 0.9,
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = BabyAiClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    assert_eq!(id, SessionId::Num(7));
    assert_eq!(client.observe(&id), "");

    client.reset(&id, 3).await.unwrap();
    assert_eq!(client.observe(&id), "You see a red ball.");

    let out = client
        .step(&id, "Thought:\nGo there.\n\nAction:\ngo to red-ball 1!!")
        .await
        .unwrap();
    assert_eq!(out.state, "You reached the red ball.");
    assert_eq!(out.reward, 0.9, "BabyAI reports the score as reward");
    assert!(out.done);
    assert_eq!(client.observe(&id), "You reached the red ball.");
}

#[tokio::test]
async fn test_babyai_malformed_actions_never_reach_the_server() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 1})).await;

    Mock::given(method("POST"))
        .and(path("/step"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = BabyAiClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();

    let out = client
        .step(&id, "Action: turn left\nAction: turn right")
        .await
        .unwrap();
    assert_eq!(out.state, MULTIPLE_ACTIONS_MESSAGE);
    assert_eq!(out.reward, 0.0);
    assert!(!out.done);

    let out = client.step(&id, "I think I should turn left.").await.unwrap();
    assert_eq!(out.state, MISSING_ACTION_MESSAGE);
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 2})).await;

    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let mut client = BabyAiClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    let err = client.reset(&id, 0).await.unwrap_err();
    match err {
        HarnessError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_step_times_out_as_transport_error() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 5})).await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "You see a wall.",
            "reward": 0.0,
            "score": 0.0,
            "done": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"observation": "late", "reward": 0.0, "score": 0.0, "done": false}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut client = BabyAiClient::new(&EnvSettings::new(server.uri(), 10, 1)).unwrap();
    let id = client.create().await.unwrap();
    client.reset(&id, 0).await.unwrap();

    let err = client.step(&id, "Action: turn left").await.unwrap_err();
    assert!(matches!(err, HarnessError::Transport { .. }), "got {err:?}");
    let msg = err.to_string();
    assert!(msg.contains("POST /step"), "{msg}");
    assert!(msg.contains("timed out"), "{msg}");
}

#[tokio::test]
async fn test_unknown_session_is_rejected_locally() {
    let server = MockServer::start().await;
    let mut client = BabyAiClient::new(&settings(&server)).unwrap();
    let err = client.step(&SessionId::Num(99), "Action: toggle").await.unwrap_err();
    assert!(matches!(err, HarnessError::UnknownSession(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_close_swallows_server_errors() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 4})).await;
    Mock::given(method("POST"))
        .and(path("/close"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = BabyAiClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    client.close(&id).await;

    // The session is gone locally even though the server failed.
    let err = client.reset(&id, 0).await.unwrap_err();
    assert!(matches!(err, HarnessError::UnknownSession(_)));
}

// ---------------------------------------------------------------------------
// TextCraft
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_textcraft_create_carries_options_and_observation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .and(body_partial_json(json!({"minecraft_dir": "agentenv_textcraft/"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 0,
            "observation": "Crafting commands:\ncraft 4 oak planks using 1 oak log\n\nGoal: craft oak planks."
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .and(body_json(json!({"id": 0, "action": "get 1 oak log"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "Got 1 oak log",
            "reward": 0.0,
            "done": false
        })))
        .mount(&server)
        .await;

    let mut client = TextCraftClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    assert!(client.observe(&id).ends_with("Goal: craft oak planks."));

    let out = client.step(&id, "Action: get 1 oak log").await.unwrap();
    assert_eq!(out.state, "Got 1 oak log");
    assert!(!out.done);
}

// ---------------------------------------------------------------------------
// SciWorld
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sciworld_react_action_and_score() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 5})).await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_description": "Your task is to boil water.",
            "observation": "This room is called the kitchen."
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .and(body_json(json!({"id": 5, "action": "open cupboard"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "The cupboard is now open.",
            "reward": 0.0,
            "score": 8.0,
            "done": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = SciWorldClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    client.reset(&id, 0).await.unwrap();
    assert_eq!(
        client.observe(&id),
        "Your task is to boil water.\nThis room is called the kitchen."
    );

    let out = client
        .step(&id, "Thought: need a pot\nAction: open cupboard")
        .await
        .unwrap();
    assert_eq!(out.reward, 8.0);

    let out = client.step(&id, "Thought: hmm").await.unwrap();
    assert!(out.state.starts_with("Invalid Action.\n\n"));
    assert!(out.state.ends_with("The cupboard is now open."));
}

// ---------------------------------------------------------------------------
// ALFWorld
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_alfworld_lists_available_actions() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": "a1"})).await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .and(body_json(json!({"id": "a1", "game": 2, "world_type": "Text"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "You are in the middle of a room.",
            "available_actions": ["go to fridge 1", "look"],
            "reward": 0.0,
            "done": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "You arrive at fridge 1.",
            "available_actions": [],
            "reward": 1.0,
            "done": true
        })))
        .mount(&server)
        .await;

    let mut client = AlfWorldClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    assert_eq!(id, SessionId::Text("a1".into()));
    client.reset(&id, 2).await.unwrap();
    assert_eq!(
        client.observe(&id),
        "You are in the middle of a room.\nAVAILABLE ACTIONS: go to fridge 1,look"
    );

    let out = client.step(&id, "Action:\ngo to fridge 1</s>").await.unwrap();
    assert_eq!(out.state, "You arrive at fridge 1.");
    assert_eq!(out.reward, 1.0);
    assert!(out.done);
}

// ---------------------------------------------------------------------------
// WebShop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_webshop_fetches_observation_and_retries_busy_server() {
    let server = MockServer::start().await;
    mount_create(&server, json!(11)).await;

    // First reset attempt finds the server busy.
    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .and(body_json(json!({"env_idx": 11, "session_id": 6})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/observation"))
        .and(query_param("env_idx", "11"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!("WebShop [SEP] Instruction: [SEP] red shoes")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .and(body_json(json!({"env_idx": 11, "action": "search[red shoes]"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "[SEP] Back to Search [SEP] B01 [SEP] Red Shoe",
            "reward": 0.0,
            "done": false,
            "info": null
        })))
        .mount(&server)
        .await;

    let mut client = WebShopClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    assert_eq!(id, SessionId::Num(11));

    client.reset(&id, 6).await.unwrap();
    assert_eq!(
        client.observe(&id),
        "WebShop [SEP] Instruction: [SEP] red shoes"
    );

    let out = client
        .step(&id, "Thought:\nsearch first\n\nAction:\nsearch[red shoes]")
        .await
        .unwrap();
    assert!(out.state.contains("Red Shoe"));
    assert_eq!(client.observe(&id), out.state);
}

// ---------------------------------------------------------------------------
// SQLGym
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sqlgym_extracts_fenced_sql() {
    let server = MockServer::start().await;
    mount_create(&server, json!(3)).await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .and(body_json(json!({"env_idx": 3, "item_id": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            "How many singers are there?",
            {"schema": "singer(id, name)"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .and(body_json(json!({"env_idx": 3, "action": "SELECT count(*) FROM singer;"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "[(6,)]",
            "reward": 1.0,
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = SqlGymClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    client.reset(&id, 1).await.unwrap();
    assert_eq!(client.observe(&id), "How many singers are there?");

    let out = client
        .step(
            &id,
            "Thought: count rows.\n\nAction: ```sql\nSELECT count(*) FROM singer;\n```",
        )
        .await
        .unwrap();
    assert_eq!(out.state, "[(6,)]");
    assert_eq!(out.reward, 1.0);
    assert!(out.done);
}

#[tokio::test]
async fn test_sqlgym_reset_without_question_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_create(&server, json!(3)).await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let mut client = SqlGymClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    let err = client.reset(&id, 0).await.unwrap_err();
    assert!(matches!(err, HarnessError::Decode { .. }));
}

// ---------------------------------------------------------------------------
// LMRL-Gym
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_maze_prefixes_rules_and_sends_first_action() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 11})).await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .and(body_json(json!({"id": 11, "game": 4})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "Your current position is at position (1, 1)."
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .and(body_json(json!({"id": 11, "action": "move up"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "There is a wall above you.",
            "reward": -1.0,
            "done": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = MazeClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    client.reset(&id, 4).await.unwrap();
    assert_eq!(
        client.observe(&id),
        format!("{}\nYour current position is at position (1, 1).", maze::RULES)
    );

    let out = client
        .step(&id, "Thought:\nGo north.\n\nAction:\nmove up\nAction: move down</s>")
        .await
        .unwrap();
    assert_eq!(out.state, "There is a wall above you.");
    assert_eq!(out.reward, -1.0);
    assert!(!out.done);
    assert_eq!(client.observe(&id), "There is a wall above you.");
}

#[tokio::test]
async fn test_wordle_fetches_vocabulary_once() {
    let server = MockServer::start().await;
    mount_create(&server, json!({"id": 2})).await;
    Mock::given(method("GET"))
        .and(path("/filtered_vocab"))
        .and(query_param("id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["crane", "slate"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reset"))
        .and(body_json(json!({"id": 2, "seed": 9})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"observation": "ignored"})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/step"))
        .and(body_json(json!({"id": 2, "action": "c r a n e"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observation": "b y g g b",
            "reward": 0.0,
            "done": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = WordleClient::new(&settings(&server)).unwrap();
    let id = client.create().await.unwrap();
    let rules = WordleClient::render_rules(&["crane".into(), "slate".into()]);
    assert_eq!(client.observe(&id), rules);

    client.reset(&id, 9).await.unwrap();
    let out = client.step(&id, "Thought: common letters.\n\nAction: c r a n e").await.unwrap();
    assert_eq!(out.state, "b y g g b");

    // A new game goes back to the rules without asking for the vocabulary again.
    client.reset(&id, 9).await.unwrap();
    assert_eq!(client.observe(&id), rules);
}
