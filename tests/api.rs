//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parley_gateway::api::ApiServerBuilder;
use parley_gateway::engines::{Engines, Generator, Synthesizer};
use parley_gateway::voice::{WAV_HEADER_LEN, pcm_to_wav};
use parley_gateway::{Config, ExtensionRegistry};
use tower::ServiceExt;

mod common;
use common::{
    ChunkSynthesizer, FailingGenerator, FailingSynthesizer, FixedGenerator, Heard,
    ScriptedTranscriber, engines,
};

/// Build a test API router around the given engines
fn build_test_router(engines: Engines) -> axum::Router {
    ApiServerBuilder::new(Config::default(), engines)
        .static_dir(None)
        .extensions(ExtensionRegistry::default())
        .build()
        .router()
}

fn default_engines() -> Engines {
    engines(
        ScriptedTranscriber::new([Heard::Text("hello world")]),
        FixedGenerator::new("Hi there."),
        ChunkSynthesizer::new(vec![vec![1, 2, 3, 4], vec![5, 6]]),
    )
}

fn with_reply(generator: Arc<dyn Generator>, synthesizer: Arc<dyn Synthesizer>) -> Engines {
    engines(ScriptedTranscriber::new([]), generator, synthesizer)
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_bytes(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router(default_engines());

    let (status, json) = send(
        app,
        Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["timestamp"].is_string());
    assert_eq!(json["sessions"], 0);
    assert_eq!(json["agents"], 0);
    assert_eq!(json["extensions"], 0);
}

#[tokio::test]
async fn test_extensions_listing() {
    let dir = tempfile::tempdir().unwrap();
    let ext = dir.path().join("ollama_llm");
    std::fs::create_dir_all(&ext).unwrap();
    std::fs::write(ext.join("manifest.json"), r#"{"name": "Ollama LLM"}"#).unwrap();
    std::fs::write(ext.join("extension.py"), "").unwrap();

    let app = ApiServerBuilder::new(Config::default(), default_engines())
        .static_dir(None)
        .extensions(ExtensionRegistry::load(dir.path()))
        .build()
        .router();

    let (status, json) = send(
        app,
        Request::builder()
            .uri("/api/extensions")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["name"], "ollama_llm");
    assert_eq!(json[0]["manifest"]["name"], "Ollama LLM");
}

#[tokio::test]
async fn test_chat_returns_reply_and_wav_audio() {
    let app = build_test_router(default_engines());

    let (status, json) = send(
        app,
        post_json("/api/chat", &serde_json::json!({"message": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], "Hi there.");

    let audio = STANDARD.decode(json["audio"].as_str().unwrap()).unwrap();
    assert_eq!(&audio[..4], b"RIFF");
    assert_eq!(audio.len(), WAV_HEADER_LEN + 6);
    assert_eq!(&audio[WAV_HEADER_LEN..], &[1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_chat_without_message_is_rejected() {
    let app = build_test_router(default_engines());

    let (status, json) = send(app, post_json("/api/chat", &serde_json::json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No message provided");
}

#[tokio::test]
async fn test_chat_omits_audio_when_synthesis_fails() {
    let app = build_test_router(with_reply(
        FixedGenerator::new("Text only."),
        Arc::new(FailingSynthesizer),
    ));

    let (status, json) = send(
        app,
        post_json("/api/chat", &serde_json::json!({"message": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], "Text only.");
    assert!(json.get("audio").is_none());
}

#[tokio::test]
async fn test_chat_generation_failure_is_server_error() {
    let app = build_test_router(with_reply(
        Arc::new(FailingGenerator),
        ChunkSynthesizer::new(vec![]),
    ));

    let (status, json) = send(
        app,
        post_json("/api/chat", &serde_json::json!({"message": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("ollama unreachable"));
}

#[tokio::test]
async fn test_transcribe_wraps_raw_pcm() {
    let transcriber = ScriptedTranscriber::new([Heard::Text("hello world")]);
    let app = build_test_router(engines(
        transcriber.clone(),
        FixedGenerator::new("unused"),
        ChunkSynthesizer::new(vec![]),
    ));

    let (status, json) = send(app, post_bytes("/api/transcribe", vec![0u8; 64])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["text"], "hello world");

    let received = transcriber.received();
    assert_eq!(received[0].len(), WAV_HEADER_LEN + 64);
    assert_eq!(&received[0][..4], b"RIFF");
}

#[tokio::test]
async fn test_transcribe_passes_wav_through() {
    let transcriber = ScriptedTranscriber::new([Heard::Text("ok")]);
    let app = build_test_router(engines(
        transcriber.clone(),
        FixedGenerator::new("unused"),
        ChunkSynthesizer::new(vec![]),
    ));

    let wav = pcm_to_wav(&[7u8; 32]).unwrap();
    let (status, _) = send(app, post_bytes("/api/transcribe", wav.clone())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(transcriber.received()[0], wav);
}

#[tokio::test]
async fn test_transcribe_empty_body_is_rejected() {
    let app = build_test_router(default_engines());

    let (status, json) = send(app, post_bytes("/api/transcribe", Vec::new())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No audio file provided");
}

#[tokio::test]
async fn test_transcribe_without_text_fails() {
    let app = build_test_router(engines(
        ScriptedTranscriber::new([Heard::Nothing]),
        FixedGenerator::new("unused"),
        ChunkSynthesizer::new(vec![]),
    ));

    let (status, json) = send(app, post_bytes("/api/transcribe", vec![0u8; 64])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Transcription failed");
}

#[tokio::test]
async fn test_vad_on_raw_pcm_and_wav() {
    let loud: Vec<u8> = std::iter::repeat_n(8000i16.to_le_bytes(), 256)
        .flatten()
        .collect();

    let app = build_test_router(default_engines());
    let (status, json) = send(app.clone(), post_bytes("/api/vad", loud.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_speech"], true);
    assert_eq!(json["confidence"], 1.0);

    let (_, json) = send(app.clone(), post_bytes("/api/vad", pcm_to_wav(&loud).unwrap())).await;
    assert_eq!(json["is_speech"], true);

    let (_, json) = send(app, post_bytes("/api/vad", vec![0u8; 512])).await;
    assert_eq!(json["is_speech"], false);
    assert_eq!(json["rms"], 0.0);
}

#[tokio::test]
async fn test_turn_detection() {
    let app = build_test_router(default_engines());

    let (status, json) = send(
        app.clone(),
        post_json(
            "/api/turn-detection",
            &serde_json::json!({"text": "What time is it?"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "finished");
    assert_eq!(json["should_respond"], true);

    let (_, json) = send(
        app,
        post_json(
            "/api/turn-detection",
            &serde_json::json!({"text": "hold on"}),
        ),
    )
    .await;
    assert_eq!(json["state"], "wait");
    assert_eq!(json["should_respond"], false);
}

#[tokio::test]
async fn test_agent_start_and_stop() {
    let app = build_test_router(default_engines());

    let (status, json) = send(
        app.clone(),
        post_json(
            "/api/agent/start",
            &serde_json::json!({
                "channel_name": "room-1",
                "user_uid": 42,
                "graph_name": "voice_assistant",
                "language": "en-US",
                "voice_type": "female"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "started");
    assert_eq!(json["channel_name"], "room-1");
    assert_eq!(json["user_uid"], 42);

    let health = || {
        Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap()
    };
    let (_, json) = send(app.clone(), health()).await;
    assert_eq!(json["agents"], 1);

    let stop = serde_json::json!({"channel_name": "room-1"});
    let (status, json) = send(app.clone(), post_json("/api/agent/stop", &stop)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "stopped");
    let (_, json) = send(app.clone(), health()).await;
    assert_eq!(json["agents"], 0);

    // Already stopped
    let (status, json) = send(app, post_json("/api/agent/stop", &stop)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_agent_start_requires_channel() {
    let app = build_test_router(default_engines());

    let (status, _) = send(
        app,
        post_json("/api/agent/start", &serde_json::json!({"language": "en"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_livekit_join_is_mocked() {
    let app = build_test_router(default_engines());

    let (status, json) = send(
        app,
        post_json(
            "/api/livekit/join",
            &serde_json::json!({"room": "lobby", "identity": "alice"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["room"], "lobby");
    assert_eq!(json["identity"], "alice");
    assert_eq!(json["token"], "mock-token");
    assert_eq!(json["wsUrl"], Config::default().livekit_url);
}

#[tokio::test]
async fn test_static_fallback_serves_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>parley</h1>").unwrap();

    let app = ApiServerBuilder::new(Config::default(), default_engines())
        .static_dir(Some(dir.path().to_path_buf()))
        .extensions(ExtensionRegistry::default())
        .build()
        .router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/some/client/route")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"<h1>parley</h1>");
}

#[tokio::test]
async fn test_unknown_api_route_is_not_found() {
    let app = build_test_router(default_engines());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
