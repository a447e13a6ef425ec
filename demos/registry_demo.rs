//! Registers an HTTP and a WebSocket target against local example servers,
//! runs each endpoint once and attacks the GET endpoint for a few seconds.
//!
//! ```text
//! cargo run --example registry_demo
//! ```

use anyhow::Context;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Form, Json, Router};
use bombard::{
    AttackOptions, AttackTarget, Bombard, Environment, FormInput, Header, HttpClientHandler,
    HttpHandler, HttpTarget, KeyFormInput, RequestMethod, RequestType, ResolvedRun, RunOutput,
    RunRequest, RunResponse, Target, WebSocketClientHandler, WebSocketTarget,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HTTP_ADDRESS: &str = "127.0.0.1:8217";
const WEBSOCKET_ADDRESS: &str = "127.0.0.1:28240";

async fn example_get(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({"code": 200, "message": "/example", "data": params}))
}

async fn example_post(Form(params): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({"code": 200, "message": "/example", "data": params}))
}

async fn example_error() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "server error")
}

async fn serve_http() -> anyhow::Result<()> {
    let app = Router::new()
        .route("/example", get(example_get).post(example_post))
        .route("/example/error", get(example_error));
    let listener = TcpListener::bind(HTTP_ADDRESS).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Replies to every text message with the same text.
async fn serve_web_socket() -> anyhow::Result<()> {
    let listener = TcpListener::bind(WEBSOCKET_ADDRESS).await?;
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    if ws.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
        });
    }
}

/// Runs with the stock client and tags attack requests with a header.
struct ExampleGet {
    client: HttpClientHandler,
}

#[async_trait::async_trait]
impl HttpHandler for ExampleGet {
    async fn run(&self, run: &ResolvedRun) -> anyhow::Result<RunResponse> {
        self.client.run(run).await
    }

    fn pre_attack(&self, run: &ResolvedRun) -> anyhow::Result<AttackTarget> {
        let mut target = run.attack_target()?;
        target.headers.push(Header::new("X-Attack", "1"));
        info!(url = %target.url, "pre-attack snapshot");
        Ok(target)
    }
}

fn number(label: &str, value: &str) -> FormInput {
    FormInput::number(value).label(label)
}

fn targets() -> (Target, Target) {
    let client = Arc::new(HttpClientHandler::default());

    let http = Target::new("Example HTTP", format!("http://{}", HTTP_ADDRESS))
        .hint("HTTP endpoints that can be tested and attacked.")
        .opts(AttackOptions::new(Duration::from_secs(300), 1, Duration::ZERO))
        .vars(KeyFormInput::new().with("A", number("A", "1")))
        .http_target(
            HttpTarget::new(RequestMethod::Get, "/example")
                .id("http_get")
                .name("HTTP Get")
                .request_type(RequestType::Query)
                .headers(KeyFormInput::new().with("X-Get", number("X-Get", "1.1")))
                .params(KeyFormInput::new().with("Param1", number("Param1", "1")))
                .allow_attack(true)
                .handler(Arc::new(ExampleGet {
                    client: HttpClientHandler::default(),
                })),
        )
        .http_target(
            HttpTarget::new(RequestMethod::Get, "/example/error")
                .name("HTTP Error Get")
                .request_type(RequestType::Query)
                .headers(KeyFormInput::new().with("X-Get", number("X-Get", "1.1")))
                .allow_attack(true)
                .handler(client.clone()),
        )
        .http_target(
            HttpTarget::new(RequestMethod::Post, "/example")
                .id("http_post_form")
                .name("HTTP Post Form")
                .request_type(RequestType::Form)
                .params(
                    KeyFormInput::new()
                        .with("Param1", number("Param1", "1"))
                        .with("Param2", FormInput::string("a string").label("Param2")),
                )
                .allow_attack(true)
                .handler(client.clone()),
        )
        .http_target(
            HttpTarget::new(RequestMethod::Get, "/example")
                .id("http_free_form")
                .name("HTTP free form")
                .request_type(RequestType::Form)
                .customizable(true)
                .handler(client),
        );

    let web_socket = Target::new("Example WebSocket", format!("ws://{}", WEBSOCKET_ADDRESS))
        .vars(KeyFormInput::new().with("WebSocketVar", FormInput::string("hello")))
        .web_socket_target(
            WebSocketTarget::new("Similar to HTTP GET")
                .params(KeyFormInput::new().with("Param1", number("Param1", "123")))
                .handler(Arc::new(WebSocketClientHandler)),
        );

    (http, web_socket)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tokio::spawn(serve_http());
    tokio::spawn(serve_web_socket());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let results_dir = std::env::temp_dir().join("bombard-demo");
    let bombard = Bombard::new(Environment {
        results_dir,
        results_suffix: "example".to_string(),
        ..Default::default()
    })?;

    let (http, web_socket) = targets();
    bombard.register_target(http)?;
    bombard.register_target(web_socket)?;

    let cancel = CancellationToken::new();

    let mut req = RunRequest::http("example_http", "http_get");
    req.http_target
        .as_mut()
        .context("HTTP overlay")?
        .params
        .insert("Param1", FormInput::number("42"));
    if let RunOutput::Http(res) = bombard.run_request(req, &cancel).await? {
        println!("GET {} -> {}: {}", res.url, res.status, res.body_text());
    }

    let req = RunRequest::web_socket("example_websocket", "similar_to_http_get");
    if let RunOutput::WebSocket(reply) = bombard.run_request(req, &cancel).await? {
        println!("WebSocket reply: {}", String::from_utf8_lossy(&reply));
    }

    // The rate is above the ceiling and is ignored; the duration fits.
    let mut req = RunRequest::http("example_http", "http_get");
    req.target.opts = AttackOptions::new(Duration::from_secs(3), 10_000, Duration::ZERO);
    let handle = bombard.attack_request(req).await?;
    println!("Attacking, result will be stored as {}", handle.name());
    if let Some(result) = handle.wait().await? {
        let metrics = result.report()?;
        bombard::write_text_report(&mut std::io::stdout(), &metrics)?;
    }

    Ok(())
}
