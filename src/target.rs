//! Canonical definitions of targets and their sub-targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::handler::{HttpHandler, WebSocketHandler};
use crate::models::{AttackTarget, KeyFormInput, RequestMethod, RequestType};
use crate::options::AttackOptions;
use crate::result::AttackResult;

/// Derive a stable identifier from a path or a name.
///
/// ASCII letters and digits are kept (lowercased), everything else becomes
/// `_`, so the same input always yields the same id.
pub fn generate_id(input: &str) -> String {
    input
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// A named group of endpoints sharing a base URL and default attack tuning.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hint: String,
    pub base_url: String,
    #[serde(default)]
    pub opts: AttackOptions,
    #[serde(default)]
    pub vars: KeyFormInput,
    #[serde(default)]
    pub http_targets: Vec<HttpTarget>,
    #[serde(default)]
    pub web_socket_targets: Vec<WebSocketTarget>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("opts", &self.opts)
            .field("http_targets", &self.http_targets)
            .field("web_socket_targets", &self.web_socket_targets)
            .finish_non_exhaustive()
    }
}

impl Target {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn opts(mut self, opts: AttackOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn vars(mut self, vars: KeyFormInput) -> Self {
        self.vars = vars;
        self
    }

    pub fn http_target(mut self, http_target: HttpTarget) -> Self {
        self.http_targets.push(http_target);
        self
    }

    pub fn web_socket_target(mut self, web_socket_target: WebSocketTarget) -> Self {
        self.web_socket_targets.push(web_socket_target);
        self
    }

    pub fn find_http_target(&self, id: &str) -> Option<&HttpTarget> {
        self.http_targets.iter().find(|ht| ht.id == id)
    }

    pub fn find_http_target_mut(&mut self, id: &str) -> Option<&mut HttpTarget> {
        self.http_targets.iter_mut().find(|ht| ht.id == id)
    }

    pub fn find_web_socket_target(&self, id: &str) -> Option<&WebSocketTarget> {
        self.web_socket_targets.iter().find(|wt| wt.id == id)
    }

    pub fn find_web_socket_target_mut(&mut self, id: &str) -> Option<&mut WebSocketTarget> {
        self.web_socket_targets.iter_mut().find(|wt| wt.id == id)
    }

    /// Normalize the target and its sub-targets, then validate them.
    pub(crate) fn init(&mut self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidTarget("target name is empty".to_string()));
        }
        if self.id.is_empty() {
            self.id = generate_id(&self.name);
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            Error::InvalidTarget(format!("{}: invalid base URL {:?}: {}", self.id, self.base_url, e))
        })?;

        self.opts.init();

        let mut seen: Vec<String> = Vec::new();
        for ht in &mut self.http_targets {
            ht.init(&self.id)?;
            if seen.contains(&ht.id) {
                return Err(Error::DuplicateSubTarget {
                    target_id: self.id.clone(),
                    sub_target_id: ht.id.clone(),
                });
            }
            seen.push(ht.id.clone());
        }
        for wt in &mut self.web_socket_targets {
            wt.init(&self.id)?;
            if seen.contains(&wt.id) {
                return Err(Error::DuplicateSubTarget {
                    target_id: self.id.clone(),
                    sub_target_id: wt.id.clone(),
                });
            }
            seen.push(wt.id.clone());
        }
        Ok(())
    }
}

/// Snapshot of the request an HTTP sub-target is attacked with.
///
/// Written once per dispatch by `pre_attack`, read by every engine worker.
/// The lock only guards the swap or the clone of the `Arc`.
#[derive(Debug, Default)]
pub struct AttackSlot {
    current: Mutex<Option<Arc<AttackTarget>>>,
}

impl AttackSlot {
    pub fn store(&self, target: AttackTarget) {
        let next = Arc::new(target);
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(next);
    }

    pub fn load(&self) -> Option<Arc<AttackTarget>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

/// An HTTP endpoint that can be run, and attacked when allowed.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct HttpTarget {
    /// Optional, generated from `path` when empty
    #[serde(default)]
    pub id: String,
    /// Optional, defaults to `path`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub method: RequestMethod,
    pub path: String,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default)]
    pub headers: KeyFormInput,
    #[serde(default)]
    pub params: KeyFormInput,
    /// Client overrides may change method, path and request type
    #[serde(default)]
    pub is_customizable: bool,
    /// Sustained attacks may be dispatched against this endpoint
    #[serde(default)]
    pub allow_attack: bool,
    /// Attack results, in the order they were produced
    #[serde(default)]
    pub results: Vec<AttackResult>,

    #[serde(skip)]
    pub(crate) handler: Option<Arc<dyn HttpHandler>>,
    #[serde(skip)]
    attack_slot: Arc<AttackSlot>,
}

impl fmt::Debug for HttpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTarget")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("request_type", &self.request_type)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("is_customizable", &self.is_customizable)
            .field("allow_attack", &self.allow_attack)
            .field("has_handler", &self.handler.is_some())
            .field("results", &self.results)
            .finish()
    }
}

impl HttpTarget {
    pub fn new(method: RequestMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = request_type;
        self
    }

    pub fn headers(mut self, headers: KeyFormInput) -> Self {
        self.headers = headers;
        self
    }

    pub fn params(mut self, params: KeyFormInput) -> Self {
        self.params = params;
        self
    }

    pub fn customizable(mut self, is_customizable: bool) -> Self {
        self.is_customizable = is_customizable;
        self
    }

    pub fn allow_attack(mut self, allow_attack: bool) -> Self {
        self.allow_attack = allow_attack;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn HttpHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn set_handler(&mut self, handler: Arc<dyn HttpHandler>) {
        self.handler = Some(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Shared snapshot slot read by the engine workers
    pub fn attack_slot(&self) -> Arc<AttackSlot> {
        Arc::clone(&self.attack_slot)
    }

    fn init(&mut self, target_id: &str) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::InvalidTarget(format!(
                "{}: HTTP target {:?} has an empty path",
                target_id, self.name
            )));
        }
        if self.id.is_empty() {
            self.id = generate_id(&self.path);
        }
        if self.name.is_empty() {
            self.name = self.path.clone();
        }
        if self.allow_attack && self.handler.is_none() {
            return Err(Error::InvalidTarget(format!(
                "{}: HTTP target {} allows attack but has no handler",
                target_id, self.id
            )));
        }
        Ok(())
    }
}

/// A WebSocket endpoint, run only.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WebSocketTarget {
    /// Optional, generated from `name` when empty
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub headers: KeyFormInput,
    #[serde(default)]
    pub params: KeyFormInput,

    #[serde(skip)]
    pub(crate) handler: Option<Arc<dyn WebSocketHandler>>,
}

impl fmt::Debug for WebSocketTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTarget")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl WebSocketTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn headers(mut self, headers: KeyFormInput) -> Self {
        self.headers = headers;
        self
    }

    pub fn params(mut self, params: KeyFormInput) -> Self {
        self.params = params;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn WebSocketHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn set_handler(&mut self, handler: Arc<dyn WebSocketHandler>) {
        self.handler = Some(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    fn init(&mut self, target_id: &str) -> Result<()> {
        if self.id.is_empty() {
            self.id = generate_id(&self.name);
        }
        if self.id.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "{}: WebSocket target has neither id nor name",
                target_id
            )));
        }
        if self.handler.is_none() {
            return Err(Error::InvalidTarget(format!(
                "{}: WebSocket target {} has no handler",
                target_id, self.id
            )));
        }
        Ok(())
    }
}

/// A sub-target found by a registry lookup.
#[derive(Debug, Clone)]
pub enum SubTarget {
    Http(HttpTarget),
    WebSocket(WebSocketTarget),
}

impl SubTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Http(ht) => &ht.id,
            Self::WebSocket(wt) => &wt.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Http(ht) => &ht.name,
            Self::WebSocket(wt) => &wt.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FormInput, Header};

    #[test]
    fn test_generate_id_is_deterministic() {
        assert_eq!(generate_id("/example/error"), "_example_error");
        assert_eq!(generate_id("/example/error"), generate_id("/example/error"));
        assert_eq!(generate_id("Example HTTP"), "example_http");
        assert_ne!(generate_id("/a"), generate_id("/b"));
    }

    #[test]
    fn test_http_target_init_defaults() {
        let mut ht = HttpTarget::new(RequestMethod::Get, "/example");
        ht.init("t").unwrap();
        assert_eq!(ht.id, "_example");
        assert_eq!(ht.name, "/example");
        assert!(ht.headers.is_empty());
        assert!(ht.params.is_empty());
    }

    #[test]
    fn test_http_target_init_keeps_explicit_values() {
        let mut ht = HttpTarget::new(RequestMethod::Get, "/example")
            .id("get")
            .name("HTTP Get");
        ht.init("t").unwrap();
        assert_eq!(ht.id, "get");
        assert_eq!(ht.name, "HTTP Get");
    }

    #[test]
    fn test_attack_without_handler_is_invalid() {
        let mut ht = HttpTarget::new(RequestMethod::Get, "/example").allow_attack(true);
        assert!(matches!(ht.init("t"), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let mut ht = HttpTarget::new(RequestMethod::Get, " ");
        assert!(matches!(ht.init("t"), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn test_target_init_rejects_duplicate_paths() {
        let mut target = Target::new("Example", "http://127.0.0.1:8217")
            .http_target(HttpTarget::new(RequestMethod::Get, "/example"))
            .http_target(HttpTarget::new(RequestMethod::Post, "/example"));
        match target.init() {
            Err(Error::DuplicateSubTarget {
                target_id,
                sub_target_id,
            }) => {
                assert_eq!(target_id, "example");
                assert_eq!(sub_target_id, "_example");
            }
            other => panic!("expected duplicate sub-target, got {:?}", other),
        }
    }

    #[test]
    fn test_target_init_rejects_bad_base_url() {
        let mut target = Target::new("Example", "not a url");
        assert!(matches!(target.init(), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn test_attack_slot_store_and_load() {
        let slot = AttackSlot::default();
        assert!(slot.load().is_none());

        let target = AttackTarget {
            method: "GET".to_string(),
            url: url::Url::parse("http://127.0.0.1/example").unwrap(),
            headers: vec![Header::new("X-Get", "1")],
            body: None,
        };
        slot.store(target.clone());
        assert_eq!(slot.load().as_deref(), Some(&target));

        slot.clear();
        assert!(slot.load().is_none());
    }

    #[test]
    fn test_clone_shares_attack_slot() {
        let ht = HttpTarget::new(RequestMethod::Get, "/example")
            .params(KeyFormInput::new().with("A", FormInput::number("1")));
        let copy = ht.clone();
        assert!(Arc::ptr_eq(&ht.attack_slot(), &copy.attack_slot()));
    }
}
