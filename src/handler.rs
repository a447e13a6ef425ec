//! Execution bindings of sub-targets.
//!
//! An [`HttpHandler`] knows how to run an HTTP sub-target once, how to turn a
//! resolved run into the request descriptor the engine fires, and how to
//! hand that descriptor to the engine's workers. A [`WebSocketHandler`] only
//! runs, WebSocket sub-targets are never attacked.

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{AttackTarget, Header};
use crate::run_request::ResolvedRun;

/// Called by the engine for every hit to obtain the request to fire.
pub type Targeter = Arc<dyn Fn() -> anyhow::Result<AttackTarget> + Send + Sync>;

/// Response of a single-shot HTTP run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResponse {
    pub method: String,
    pub url: String,
    pub request_headers: Vec<Header>,
    pub request_body: Option<String>,
    pub status_code: u16,
    pub status: String,
    pub response_headers: Vec<Header>,
    pub response_body: Vec<u8>,
}

impl RunResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.response_body).into_owned()
    }
}

#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Execute the resolved run once.
    async fn run(&self, run: &ResolvedRun) -> anyhow::Result<RunResponse>;

    /// Build the request descriptor stored as the sub-target's snapshot
    /// before an attack starts.
    fn pre_attack(&self, run: &ResolvedRun) -> anyhow::Result<AttackTarget> {
        run.attack_target()
    }

    /// Return the targeter the engine calls for every hit.
    ///
    /// The default reads the snapshot stored by [`HttpHandler::pre_attack`].
    fn attack(&self, run: &ResolvedRun) -> anyhow::Result<Targeter> {
        let http_target = run
            .http_target()
            .ok_or_else(|| anyhow!("attack requires an HTTP sub-target"))?;
        let slot = http_target.attack_slot();
        Ok(Arc::new(move || {
            slot.load()
                .map(|target| (*target).clone())
                .ok_or_else(|| anyhow!("attack target is not armed"))
        }))
    }
}

#[async_trait]
pub trait WebSocketHandler: Send + Sync {
    /// Execute the resolved run once and return the raw reply.
    async fn run(&self, run: &ResolvedRun) -> anyhow::Result<Vec<u8>>;
}
