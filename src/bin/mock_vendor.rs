//! Local stand-in for the four vendor APIs. Every endpoint answers with the
//! same canned playbook in the vendor's own response shape.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use rand::Rng;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::info;

const PLAYBOOK: &str = "---\n- name: Mock playbook\n  hosts: all\n  become: yes\n  tasks:\n    - name: Ping hosts\n      ping:\n      tags:\n        - mock\n";

#[derive(Parser, Clone)]
#[command(name = "mock_vendor", about = "Serve mock LLM vendor endpoints")]
struct ServerConfig {
    #[arg(long, default_value_t = 3000)]
    port: u16,
    /// Base latency added to every response.
    #[arg(long, default_value_t = 200)]
    latency_ms: u64,
    /// Fraction of generation calls answered with HTTP 500.
    #[arg(long, default_value_t = 0.0)]
    error_rate: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    playbook_forge::logging::init("info");
    let config = ServerConfig::parse();

    let app = Router::new()
        .route("/v1/chat/completions", post(openai))
        .route("/v1/messages", post(anthropic))
        .route("/v1beta/models/:call", post(gemini))
        .route("/api/chat", post(ollama))
        .route("/api/tags", get(ollama_tags))
        .route("/api/pull", post(ollama_pull))
        .with_state(config.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!(
        %addr,
        latency_ms = config.latency_ms,
        error_rate = config.error_rate,
        "mock vendor listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Sleeps for the configured latency plus jitter, then decides whether to
/// simulate a failure.
async fn simulate(config: &ServerConfig) -> Result<(), (StatusCode, Json<Value>)> {
    let jitter = rand::thread_rng().gen_range(0..=20);
    sleep(Duration::from_millis(config.latency_ms + jitter)).await;

    if config.error_rate > 0.0 && rand::thread_rng().gen_bool(config.error_rate.min(1.0)) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "simulated failure"})),
        ));
    }
    Ok(())
}

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn requested_model(body: &Value, fallback: &str) -> String {
    body.get("model")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

async fn openai(State(config): State<ServerConfig>, Json(body): Json<Value>) -> Reply {
    simulate(&config).await?;
    Ok(Json(json!({
        "id": "mock-response",
        "object": "chat.completion",
        "model": requested_model(&body, "gpt-4"),
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": PLAYBOOK},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 40, "total_tokens": 50}
    })))
}

async fn anthropic(State(config): State<ServerConfig>, Json(body): Json<Value>) -> Reply {
    simulate(&config).await?;
    Ok(Json(json!({
        "id": "msg_mock",
        "type": "message",
        "model": requested_model(&body, "claude-3-sonnet-20240229"),
        "content": [{"type": "text", "text": PLAYBOOK}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 40}
    })))
}

async fn gemini(
    State(config): State<ServerConfig>,
    Path(call): Path<String>,
    Json(_body): Json<Value>,
) -> Reply {
    if !call.ends_with(":generateContent") {
        return Err((StatusCode::NOT_FOUND, Json(json!({"error": "unknown method"}))));
    }
    simulate(&config).await?;
    Ok(Json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": PLAYBOOK}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 40, "totalTokenCount": 50}
    })))
}

async fn ollama(State(config): State<ServerConfig>, Json(body): Json<Value>) -> Reply {
    simulate(&config).await?;
    Ok(Json(json!({
        "model": requested_model(&body, "llama2"),
        "message": {"role": "assistant", "content": PLAYBOOK},
        "done": true,
        "prompt_eval_count": 10,
        "eval_count": 40
    })))
}

async fn ollama_tags() -> Json<Value> {
    Json(json!({"models": [{"name": "llama2:latest"}, {"name": "mistral:latest"}]}))
}

async fn ollama_pull(Json(body): Json<Value>) -> (StatusCode, String) {
    info!(model = ?body.get("name"), "mock pull");
    let lines = [
        json!({"status": "pulling manifest"}),
        json!({"status": "verifying sha256 digest"}),
        json!({"status": "success"}),
    ];
    let body = lines.iter().map(|line| format!("{}\n", line)).collect();
    (StatusCode::OK, body)
}
