//! In-memory registry of canonical targets.
//!
//! Each registered target sits behind its own lock so that merging a run
//! into one target never contends with another. The outer lock is only
//! taken to register or to find a target.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::target::{SubTarget, Target};

/// A registered target with its own lock.
pub type TargetEntry = Arc<RwLock<Target>>;

#[derive(Debug, Default)]
pub struct Registry {
    targets: RwLock<Vec<TargetEntry>>,
}

pub(crate) fn read_target(entry: &TargetEntry) -> RwLockReadGuard<'_, Target> {
    entry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write_target(entry: &TargetEntry) -> RwLockWriteGuard<'_, Target> {
    entry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize, validate and store `target`.
    pub fn register(&self, env: &Environment, mut target: Target) -> Result<TargetEntry> {
        target.init()?;

        if target.opts.duration() > env.max_attack_duration
            || target.opts.rate_per_second() > env.max_attack_rate
        {
            warn!(
                event = "target_defaults_above_ceiling",
                target_id = %target.id,
                duration = %humantime::format_duration(target.opts.duration()),
                rate_per_second = target.opts.rate_per_second(),
                message = "Target defaults exceed the environment ceilings"
            );
        }

        let mut targets = self
            .targets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if targets.iter().any(|entry| read_target(entry).id == target.id) {
            return Err(Error::DuplicateTarget(target.id));
        }

        info!(
            event = "target_registered",
            target_id = %target.id,
            http_targets = target.http_targets.len(),
            web_socket_targets = target.web_socket_targets.len(),
            message = "Target registered"
        );

        let entry = Arc::new(RwLock::new(target));
        targets.push(Arc::clone(&entry));
        Ok(entry)
    }

    /// Find the entry of a target by id.
    pub fn entry(&self, target_id: &str) -> Option<TargetEntry> {
        let targets = self
            .targets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        targets
            .iter()
            .find(|entry| read_target(entry).id == target_id)
            .cloned()
    }

    /// Copy of a target and one of its sub-targets. HTTP sub-targets are
    /// searched before WebSocket ones.
    pub fn lookup(&self, target_id: &str, sub_target_id: &str) -> Option<(Target, SubTarget)> {
        let entry = self.entry(target_id)?;
        let target = read_target(&entry);
        let sub_target = if let Some(ht) = target.find_http_target(sub_target_id) {
            SubTarget::Http(ht.clone())
        } else {
            SubTarget::WebSocket(target.find_web_socket_target(sub_target_id)?.clone())
        };
        Some((target.clone(), sub_target))
    }

    pub fn lookup_target(&self, target_id: &str) -> Option<Target> {
        self.entry(target_id).map(|entry| read_target(&entry).clone())
    }

    /// Copies of all targets in registration order.
    pub fn targets(&self) -> Vec<Target> {
        let targets = self
            .targets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        targets.iter().map(|entry| read_target(entry).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HttpHandler, RunResponse};
    use crate::models::RequestMethod;
    use crate::run_request::ResolvedRun;
    use crate::target::{HttpTarget, WebSocketTarget};

    struct Noop;

    #[async_trait::async_trait]
    impl HttpHandler for Noop {
        async fn run(&self, _run: &ResolvedRun) -> anyhow::Result<RunResponse> {
            Ok(RunResponse::default())
        }
    }

    fn example() -> Target {
        Target::new("Example HTTP", "http://127.0.0.1:8217")
            .http_target(
                HttpTarget::new(RequestMethod::Get, "/example")
                    .allow_attack(true)
                    .handler(Arc::new(Noop)),
            )
            .http_target(HttpTarget::new(RequestMethod::Get, "/example/error"))
    }

    #[test]
    fn test_sub_target_without_handler_registers() {
        let registry = Registry::new();
        registry.register(&Environment::default(), example()).unwrap();

        let (_, sub_target) = registry.lookup("example_http", "_example_error").unwrap();
        match sub_target {
            SubTarget::Http(ht) => assert!(!ht.has_handler()),
            other => panic!("expected an HTTP sub-target, got {:?}", other),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        let env = Environment::default();
        registry.register(&env, example()).unwrap();

        let (target, sub_target) = registry.lookup("example_http", "_example").unwrap();
        assert_eq!(target.id, "example_http");
        assert!(matches!(sub_target, SubTarget::Http(ref ht) if ht.name == "/example"));
        assert_eq!(sub_target.id(), "_example");

        assert!(registry.lookup("example_http", "missing").is_none());
        assert!(registry.lookup("missing", "_example").is_none());
    }

    #[test]
    fn test_duplicate_target_is_rejected() {
        let registry = Registry::new();
        let env = Environment::default();
        registry.register(&env, example()).unwrap();

        let err = registry.register(&env, example()).unwrap_err();
        assert!(matches!(err, Error::DuplicateTarget(id) if id == "example_http"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_path_same_id_across_targets() {
        let registry = Registry::new();
        let env = Environment::default();
        registry.register(&env, example()).unwrap();
        registry
            .register(
                &env,
                Target::new("Other", "http://127.0.0.1:9000")
                    .http_target(HttpTarget::new(RequestMethod::Post, "/example")),
            )
            .unwrap();

        let (_, first) = registry.lookup("example_http", "_example").unwrap();
        let (_, second) = registry.lookup("other", "_example").unwrap();
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_same_path_twice_in_one_target_is_rejected() {
        let registry = Registry::new();
        let target = Target::new("Example", "http://127.0.0.1:8217")
            .http_target(HttpTarget::new(RequestMethod::Get, "/example"))
            .http_target(HttpTarget::new(RequestMethod::Post, "/example"));

        let err = registry.register(&Environment::default(), target).unwrap_err();
        assert!(matches!(err, Error::DuplicateSubTarget { .. }));
        assert!(err.is_validation());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_handlers_are_invalid() {
        let registry = Registry::new();
        let env = Environment::default();

        let attack_without_handler = Target::new("A", "http://127.0.0.1:8217")
            .http_target(HttpTarget::new(RequestMethod::Get, "/a").allow_attack(true));
        assert!(matches!(
            registry.register(&env, attack_without_handler),
            Err(Error::InvalidTarget(_))
        ));

        let web_socket_without_handler = Target::new("B", "ws://127.0.0.1:28240")
            .web_socket_target(WebSocketTarget::new("Echo"));
        assert!(matches!(
            registry.register(&env, web_socket_without_handler),
            Err(Error::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_targets_keep_registration_order() {
        let registry = Registry::new();
        let env = Environment::default();
        for name in ["c", "a", "b"] {
            registry
                .register(&env, Target::new(name, "http://127.0.0.1:8217"))
                .unwrap();
        }
        let ids: Vec<String> = registry.targets().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
