//! Client run/attack requests and their merge into the canonical targets.
//!
//! A [`RunRequest`] is untrusted: it carries the values a client wants to
//! use for one invocation. Merging it against the registered [`Target`]
//! clamps the attack tuning to the [`Environment`] ceilings, writes the
//! accepted values back into the canonical target and yields a
//! [`ResolvedRun`], the immutable context handed to the handlers.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::env::Environment;
use crate::models::{AttackTarget, Header, KeyFormInput, RequestMethod, RequestType};
use crate::options::AttackOptions;
use crate::target::{HttpTarget, Target, WebSocketTarget};

/// Client overlay of a [`Target`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetOverlay {
    pub id: String,
    #[serde(default)]
    pub opts: AttackOptions,
    #[serde(default)]
    pub vars: KeyFormInput,
}

/// Client overlay of an [`HttpTarget`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpTargetOverlay {
    pub id: String,
    #[serde(default)]
    pub method: RequestMethod,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default)]
    pub headers: KeyFormInput,
    #[serde(default)]
    pub params: KeyFormInput,
}

/// Client overlay of a [`WebSocketTarget`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSocketTargetOverlay {
    pub id: String,
    #[serde(default)]
    pub headers: KeyFormInput,
    #[serde(default)]
    pub params: KeyFormInput,
}

/// One client invocation of a sub-target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub target: TargetOverlay,
    #[serde(default)]
    pub http_target: Option<HttpTargetOverlay>,
    #[serde(default)]
    pub web_socket_target: Option<WebSocketTargetOverlay>,
}

impl fmt::Display for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target:{}", self.target.id)?;
        if let Some(ht) = &self.http_target {
            write!(f, " http_target:{}", ht.id)?;
        }
        if let Some(wt) = &self.web_socket_target {
            write!(f, " web_socket_target:{}", wt.id)?;
        }
        Ok(())
    }
}

/// Attack option a client asked for beyond the server ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampedOverride {
    Duration { requested: Duration, max: Duration },
    Rate { requested: u32, max: u32 },
    Timeout { requested: Duration, max: Duration },
}

impl ClampedOverride {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Duration { .. } => "duration",
            Self::Rate { .. } => "rate_per_second",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for ClampedOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration { requested, max } | Self::Timeout { requested, max } => write!(
                f,
                "{} {} exceeds {}",
                self.field(),
                humantime::format_duration(*requested),
                humantime::format_duration(*max)
            ),
            Self::Rate { requested, max } => {
                write!(f, "{} {} exceeds {}", self.field(), requested, max)
            }
        }
    }
}

/// The sub-target part of a resolved run.
#[derive(Debug, Clone)]
pub enum ResolvedSubTarget {
    Http(HttpTarget),
    WebSocket(WebSocketTarget),
}

/// Execution context produced by merging a [`RunRequest`] into the
/// canonical definitions. Immutable; shared with engine workers.
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub target_id: String,
    pub target_name: String,
    pub base_url: String,
    pub opts: AttackOptions,
    pub vars: KeyFormInput,
    pub sub_target: ResolvedSubTarget,
}

impl ResolvedRun {
    pub fn http_target(&self) -> Option<&HttpTarget> {
        match &self.sub_target {
            ResolvedSubTarget::Http(ht) => Some(ht),
            ResolvedSubTarget::WebSocket(_) => None,
        }
    }

    pub fn web_socket_target(&self) -> Option<&WebSocketTarget> {
        match &self.sub_target {
            ResolvedSubTarget::WebSocket(wt) => Some(wt),
            ResolvedSubTarget::Http(_) => None,
        }
    }

    pub fn sub_target_id(&self) -> &str {
        match &self.sub_target {
            ResolvedSubTarget::Http(ht) => &ht.id,
            ResolvedSubTarget::WebSocket(wt) => &wt.id,
        }
    }

    /// Build the HTTP request described by this run: base URL plus path,
    /// headers, and parameters encoded according to the request type.
    pub fn attack_target(&self) -> anyhow::Result<AttackTarget> {
        let ht = self
            .http_target()
            .context("request descriptor needs an HTTP sub-target")?;

        let mut url = join_url(&self.base_url, &ht.path)?;
        let mut headers = ht.headers.to_headers();
        let mut body = None;

        match ht.request_type {
            RequestType::None => {}
            RequestType::Query => {
                if !ht.params.is_empty() {
                    let mut pairs = url.query_pairs_mut();
                    for (name, input) in ht.params.iter() {
                        pairs.append_pair(name, &input.value);
                    }
                }
            }
            RequestType::Form => body = Some(ht.params.to_urlencoded().into_bytes()),
            RequestType::Json => body = Some(serde_json::to_vec(&ht.params.to_json())?),
        }

        if let Some(content_type) = ht.request_type.content_type() {
            if !headers.iter().any(|h| h.name.eq_ignore_ascii_case("Content-Type")) {
                headers.push(Header::new("Content-Type", content_type));
            }
        }

        Ok(AttackTarget {
            method: ht.method.as_str().to_string(),
            url,
            headers,
            body,
        })
    }
}

fn join_url(base_url: &str, path: &str) -> anyhow::Result<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    Url::parse(&joined).with_context(|| format!("Failed to build URL from {:?}", joined))
}

/// Accept the client's attack options that fit under the ceilings.
///
/// Returns the options that were rejected; the canonical value is kept for
/// each of them.
pub(crate) fn merge_options(
    env: &Environment,
    canonical: &mut AttackOptions,
    requested: &AttackOptions,
) -> Vec<ClampedOverride> {
    let mut clamped = Vec::new();

    let duration = requested.duration();
    if !duration.is_zero() {
        if duration <= env.max_attack_duration {
            canonical.set_duration(duration);
        } else {
            clamped.push(ClampedOverride::Duration {
                requested: duration,
                max: env.max_attack_duration,
            });
        }
    }

    let rate = requested.rate_per_second();
    if rate > 0 {
        if rate <= env.max_attack_rate {
            canonical.set_rate_per_second(rate);
        } else {
            clamped.push(ClampedOverride::Rate {
                requested: rate,
                max: env.max_attack_rate,
            });
        }
    }

    let timeout = requested.timeout();
    if !timeout.is_zero() {
        if timeout <= env.max_attack_timeout {
            canonical.set_timeout(timeout);
        } else {
            clamped.push(ClampedOverride::Timeout {
                requested: timeout,
                max: env.max_attack_timeout,
            });
        }
    }

    clamped
}

impl RunRequest {
    pub fn http(target_id: impl Into<String>, http_target_id: impl Into<String>) -> Self {
        Self {
            target: TargetOverlay {
                id: target_id.into(),
                ..Default::default()
            },
            http_target: Some(HttpTargetOverlay {
                id: http_target_id.into(),
                ..Default::default()
            }),
            web_socket_target: None,
        }
    }

    pub fn web_socket(target_id: impl Into<String>, web_socket_target_id: impl Into<String>) -> Self {
        Self {
            target: TargetOverlay {
                id: target_id.into(),
                ..Default::default()
            },
            http_target: None,
            web_socket_target: Some(WebSocketTargetOverlay {
                id: web_socket_target_id.into(),
                ..Default::default()
            }),
        }
    }

    /// Id of the sub-target this request addresses.
    pub fn sub_target_id(&self) -> Option<&str> {
        self.http_target
            .as_ref()
            .map(|ht| ht.id.as_str())
            .or_else(|| self.web_socket_target.as_ref().map(|wt| wt.id.as_str()))
    }

    fn merge_target(overlay: TargetOverlay, env: &Environment, target: &mut Target) -> Vec<ClampedOverride> {
        let clamped = merge_options(env, &mut target.opts, &overlay.opts);
        for c in &clamped {
            warn!(
                event = "clamped_override",
                target_id = %target.id,
                field = c.field(),
                detail = %c,
                message = "Client override exceeds server ceiling, keeping configured value"
            );
        }
        target.vars = overlay.vars;
        clamped
    }

    /// Merge into the canonical target and its HTTP sub-target at `index`.
    pub(crate) fn merge_http(
        self,
        env: &Environment,
        target: &mut Target,
        index: usize,
    ) -> (ResolvedRun, Vec<ClampedOverride>) {
        let overlay = self.http_target.unwrap_or_default();
        let clamped = Self::merge_target(self.target, env, target);

        let ht = &mut target.http_targets[index];
        if ht.is_customizable {
            ht.method = overlay.method;
            ht.path = overlay.path;
            ht.request_type = overlay.request_type;
        }
        ht.headers = overlay.headers;
        ht.params = overlay.params;

        let sub_target = ResolvedSubTarget::Http(ht.clone());
        (resolved(target, sub_target), clamped)
    }

    /// Merge into the canonical target and its WebSocket sub-target at `index`.
    pub(crate) fn merge_web_socket(
        self,
        env: &Environment,
        target: &mut Target,
        index: usize,
    ) -> (ResolvedRun, Vec<ClampedOverride>) {
        let overlay = self.web_socket_target.unwrap_or_default();
        let clamped = Self::merge_target(self.target, env, target);

        let wt = &mut target.web_socket_targets[index];
        wt.headers = overlay.headers;
        wt.params = overlay.params;

        let sub_target = ResolvedSubTarget::WebSocket(wt.clone());
        (resolved(target, sub_target), clamped)
    }
}

fn resolved(target: &Target, sub_target: ResolvedSubTarget) -> ResolvedRun {
    ResolvedRun {
        target_id: target.id.clone(),
        target_name: target.name.clone(),
        base_url: target.base_url.clone(),
        opts: target.opts.clone(),
        vars: target.vars.clone(),
        sub_target,
    }
}
