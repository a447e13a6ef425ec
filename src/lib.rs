//! Bombard - target registry and run/attack dispatch for load testing
//!
//! Operators register named targets, each a base URL with HTTP and
//! WebSocket endpoints and default attack tuning. Clients then run an
//! endpoint once, or attack it at a sustained rate, with their own
//! overrides merged in. Overrides that exceed the server ceilings are
//! ignored and the configured value is kept.
//!
//! # Example
//!
//! ```rust,no_run
//! use bombard::{
//!     AttackOptions, Bombard, Environment, HttpClientHandler, HttpTarget, RequestMethod,
//!     RequestType, RunRequest, Target,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bombard = Bombard::new(Environment::default())?;
//!
//!     bombard.register_target(
//!         Target::new("Example HTTP", "http://127.0.0.1:8217")
//!             .opts(AttackOptions::new(Duration::from_secs(10), 50, Duration::from_secs(5)))
//!             .http_target(
//!                 HttpTarget::new(RequestMethod::Get, "/example")
//!                     .request_type(RequestType::Query)
//!                     .allow_attack(true)
//!                     .handler(Arc::new(HttpClientHandler::default())),
//!             ),
//!     )?;
//!
//!     // Ask for 10000 req/s; the ceiling keeps the configured 50
//!     let mut req = RunRequest::http("example_http", "_example");
//!     req.target.opts.set_rate_per_second(10_000);
//!
//!     let handle = bombard.attack_request(req).await?;
//!     if let Some(result) = handle.wait().await? {
//!         println!("Stored {}", result.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod bombard;
mod client;
mod engine;
mod env;
mod error;
mod handler;
mod models;
mod options;
mod registry;
mod report;
mod result;
mod run_request;
mod target;
mod telemetry;
mod utils;

// Re-export the main types for library users
pub use bombard::{AttackHandle, AttackProgress, Bombard, RunOutput};
pub use client::{HttpClientHandler, WebSocketClientHandler};
pub use engine::{make_request, AttackEngine, EngineConfig, HttpEngine};
pub use env::{
    Environment, DEFAULT_ATTACK_DURATION, DEFAULT_ATTACK_RATE_PER_SECOND, DEFAULT_ATTACK_TIMEOUT,
    DEFAULT_MAX_ATTACK_DURATION, DEFAULT_MAX_ATTACK_RATE,
};
pub use error::{Error, Result};
pub use handler::{HttpHandler, RunResponse, Targeter, WebSocketHandler};
pub use models::{
    AttackTarget, FormInput, FormInputKind, Header, Hit, KeyFormInput, Metrics, RequestMethod,
    RequestType,
};
pub use options::{AttackOptions, Rate};
pub use registry::{Registry, TargetEntry};
pub use report::{calculate_metrics, write_text_report};
pub use result::{AttackResult, OnDuplicate};
pub use run_request::{
    ClampedOverride, HttpTargetOverlay, ResolvedRun, ResolvedSubTarget, RunRequest, TargetOverlay,
    WebSocketTargetOverlay,
};
pub use target::{generate_id, AttackSlot, HttpTarget, SubTarget, Target, WebSocketTarget};
pub use telemetry::install_otlp_meter_provider;
pub use utils::{
    format_duration, format_size, get_writer, headers_to_form, load_targets_file, parse_headers,
    parse_params,
};
