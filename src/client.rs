//! Ready-made handlers for targets loaded from a file.

use anyhow::Context;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::handler::{HttpHandler, RunResponse, WebSocketHandler};
use crate::models::Header;
use crate::run_request::ResolvedRun;

/// Runs HTTP sub-targets with reqwest, sending the request described by
/// [`ResolvedRun::attack_target`].
#[derive(Debug, Clone, Default)]
pub struct HttpClientHandler {
    client: Client,
}

impl HttpClientHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpHandler for HttpClientHandler {
    async fn run(&self, run: &ResolvedRun) -> anyhow::Result<RunResponse> {
        let target = run.attack_target()?;
        let method = reqwest::Method::from_bytes(target.method.as_bytes())
            .with_context(|| format!("Invalid method: {}", target.method))?;

        let mut request_builder = self
            .client
            .request(method, target.url.clone())
            .timeout(run.opts.timeout());
        for header in &target.headers {
            request_builder = request_builder.header(&header.name, &header.value);
        }
        if let Some(body) = &target.body {
            request_builder = request_builder.body(body.clone());
        }

        debug!(
            event = "run_http",
            method = %target.method,
            url = %target.url,
            message = "Running HTTP target"
        );

        let response = request_builder.send().await.context("Request failed")?;
        let status = response.status();
        let response_headers = response
            .headers()
            .iter()
            .map(|(name, value)| Header::new(name.as_str(), String::from_utf8_lossy(value.as_bytes())))
            .collect();
        let response_body = response
            .bytes()
            .await
            .context("Failed to read response body")?
            .to_vec();

        Ok(RunResponse {
            method: target.method,
            url: target.url.to_string(),
            request_headers: target.headers,
            request_body: target.body.map(|b| String::from_utf8_lossy(&b).into_owned()),
            status_code: status.as_u16(),
            status: status.to_string(),
            response_headers,
            response_body,
        })
    }
}

/// Runs WebSocket sub-targets: connects to the target's base URL, sends the
/// parameters as one JSON text message and returns the first reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketClientHandler;

#[async_trait]
impl WebSocketHandler for WebSocketClientHandler {
    async fn run(&self, run: &ResolvedRun) -> anyhow::Result<Vec<u8>> {
        let wt = run
            .web_socket_target()
            .context("WebSocket handler needs a WebSocket sub-target")?;

        let mut request = run
            .base_url
            .as_str()
            .into_client_request()
            .with_context(|| format!("Invalid WebSocket URL: {}", run.base_url))?;
        for header in wt.headers.to_headers() {
            request.headers_mut().insert(
                HeaderName::from_bytes(header.name.as_bytes())
                    .with_context(|| format!("Invalid header name: {}", header.name))?,
                HeaderValue::from_str(&header.value)
                    .with_context(|| format!("Invalid header value for {}", header.name))?,
            );
        }

        let (mut ws, _resp) = tokio_tungstenite::connect_async(request)
            .await
            .context("connect ws")?;

        let payload = serde_json::to_string(&wt.params.to_json())?;
        ws.send(Message::Text(payload)).await.context("send ws message")?;

        let reply = loop {
            match ws.next().await.context("ws stream ended")?.context("ws message error")? {
                Message::Text(text) => break text.into_bytes(),
                Message::Binary(data) => break data,
                Message::Close(_) => anyhow::bail!("ws closed before replying"),
                _ => continue,
            }
        };

        let _ = ws.close(None).await;
        Ok(reply)
    }
}
