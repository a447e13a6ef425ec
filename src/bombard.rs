//! Dispatch surface: registration, single runs, sustained attacks and the
//! results they leave behind.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{AttackEngine, HttpEngine};
use crate::env::{Environment, RESULT_EXTENSION};
use crate::error::{Error, Result};
use crate::handler::{HttpHandler, RunResponse};
use crate::models::{Hit, Metrics};
use crate::registry::{write_target, Registry, TargetEntry};
use crate::result::{AttackResult, OnDuplicate};
use crate::run_request::{ResolvedRun, ResolvedSubTarget, RunRequest};
use crate::target::Target;
use crate::telemetry;

/// Output of a single run.
#[derive(Debug, Clone)]
pub enum RunOutput {
    Http(RunResponse),
    WebSocket(Vec<u8>),
}

#[derive(Debug)]
struct RunningAttack {
    name: String,
    cancel: CancellationToken,
}

type RunningSlot = Arc<Mutex<Option<RunningAttack>>>;

fn clear_running(running: &RunningSlot, name: &str) {
    let mut running = running.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if running.as_ref().is_some_and(|r| r.name == name) {
        running.take();
    }
}

/// A sustained attack in progress.
#[derive(Debug)]
pub struct AttackHandle {
    name: String,
    cancel: CancellationToken,
    hits: Arc<AtomicUsize>,
    done: oneshot::Receiver<Result<Option<AttackResult>>>,
}

impl AttackHandle {
    /// Name the result will be stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hits received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Detached view of the attack that stays usable while [`AttackHandle::wait`] runs.
    pub fn progress(&self) -> AttackProgress {
        AttackProgress {
            hits: Arc::clone(&self.hits),
            cancel: self.cancel.clone(),
        }
    }

    /// Stop scheduling new requests. Nothing is stored for a cancelled attack.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the attack to finish. Returns the stored result, or `None`
    /// if the attack was cancelled.
    pub async fn wait(self) -> Result<Option<AttackResult>> {
        self.done
            .await
            .map_err(|_| Error::Transport(anyhow::anyhow!("attack task ended unexpectedly")))?
    }
}

#[derive(Debug, Clone)]
pub struct AttackProgress {
    hits: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl AttackProgress {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Registry of targets plus the dispatcher that runs and attacks them.
pub struct Bombard {
    env: Environment,
    registry: Registry,
    engine: Arc<dyn AttackEngine>,
    running: RunningSlot,
}

impl Bombard {
    /// Validate `env` and create its results directory.
    pub fn new(env: Environment) -> Result<Self> {
        env.validate()?;
        std::fs::create_dir_all(&env.results_dir)?;
        Ok(Self {
            env,
            registry: Registry::new(),
            engine: Arc::new(HttpEngine::default()),
            running: Arc::new(Mutex::new(None)),
        })
    }

    pub fn with_engine(mut self, engine: Arc<dyn AttackEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn targets(&self) -> Vec<Target> {
        self.registry.targets()
    }

    pub fn target(&self, target_id: &str) -> Option<Target> {
        self.registry.lookup_target(target_id)
    }

    /// Register a target and restore the results already stored for it.
    pub fn register_target(&self, target: Target) -> Result<()> {
        let entry = self.registry.register(&self.env, target)?;
        match self.restore_results(&entry) {
            Ok(0) => {}
            Ok(restored) => info!(
                event = "results_restored",
                restored,
                message = "Restored stored attack results"
            ),
            Err(e) => warn!(
                event = "results_restore_failed",
                error = %e,
                message = "Failed to scan results directory"
            ),
        }
        Ok(())
    }

    fn restore_results(&self, entry: &TargetEntry) -> Result<usize> {
        let mut names = Vec::new();
        for dir_entry in std::fs::read_dir(&self.env.results_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = dir_entry.file_name().to_str() {
                if name.ends_with(RESULT_EXTENSION) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let mut target = write_target(entry);
        let target_id = target.id.clone();
        let mut restored = 0;
        for ht in &mut target.http_targets {
            let prefix = format!("{}.{}.", target_id, ht.id);
            for name in names.iter().filter(|n| n.starts_with(&prefix)) {
                ht.add_result(&self.env.results_dir, name, OnDuplicate::Overwrite)?;
                restored += 1;
            }
        }
        Ok(restored)
    }

    /// Merge `req` into its canonical target and return the resolved run.
    ///
    /// The sub-target is checked before anything is merged.
    fn resolve(&self, req: RunRequest, attack: bool) -> Result<ResolvedRun> {
        let target_id = req.target.id.clone();
        let sub_target_id = req.sub_target_id().unwrap_or_default().to_string();
        let entry = self
            .registry
            .entry(&target_id)
            .ok_or_else(|| Error::TargetNotFound(target_id.clone()))?;
        let not_found = || Error::SubTargetNotFound {
            target_id: target_id.clone(),
            sub_target_id: sub_target_id.clone(),
        };

        let (run, clamped) = {
            let mut target = write_target(&entry);
            if req.http_target.is_some() {
                let index = target
                    .http_targets
                    .iter()
                    .position(|ht| ht.id == sub_target_id)
                    .ok_or_else(not_found)?;
                let ht = &target.http_targets[index];
                if attack && !ht.allow_attack {
                    return Err(Error::AttackNotAllowed(format!("{}/{}", target_id, sub_target_id)));
                }
                if !ht.has_handler() {
                    return Err(Error::MissingHandler(format!("{}/{}", target_id, sub_target_id)));
                }
                req.merge_http(&self.env, &mut target, index)
            } else if req.web_socket_target.is_some() {
                let index = target
                    .web_socket_targets
                    .iter()
                    .position(|wt| wt.id == sub_target_id)
                    .ok_or_else(not_found)?;
                if attack {
                    return Err(Error::AttackNotAllowed(format!("{}/{}", target_id, sub_target_id)));
                }
                if !target.web_socket_targets[index].has_handler() {
                    return Err(Error::MissingHandler(format!("{}/{}", target_id, sub_target_id)));
                }
                req.merge_web_socket(&self.env, &mut target, index)
            } else {
                return Err(not_found());
            }
        };

        telemetry::record_clamped(&run.target_id, &clamped);
        Ok(run)
    }

    /// Run a sub-target once with the client's overrides applied.
    ///
    /// The handler is raced against `cancel` and bounded by the merged
    /// timeout.
    pub async fn run_request(&self, req: RunRequest, cancel: &CancellationToken) -> Result<RunOutput> {
        let run = self.resolve(req, false)?;
        let timeout = run.opts.timeout();

        info!(
            event = "run_started",
            target_id = %run.target_id,
            sub_target_id = %run.sub_target_id(),
            message = "Running target"
        );

        let execute = async {
            match &run.sub_target {
                ResolvedSubTarget::Http(ht) => match ht.handler.clone() {
                    Some(handler) => handler.run(&run).await.map(RunOutput::Http).map_err(Error::Transport),
                    None => Err(Error::MissingHandler(ht.id.clone())),
                },
                ResolvedSubTarget::WebSocket(wt) => match wt.handler.clone() {
                    Some(handler) => handler
                        .run(&run)
                        .await
                        .map(RunOutput::WebSocket)
                        .map_err(Error::Transport),
                    None => Err(Error::MissingHandler(wt.id.clone())),
                },
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            output = tokio::time::timeout(timeout, execute) => output.map_err(|_| Error::Timeout(timeout))?,
        }
    }

    /// Start a sustained attack against an HTTP sub-target.
    ///
    /// Only one attack runs at a time. The result is stored once the attack
    /// completes without being cancelled.
    pub async fn attack_request(&self, req: RunRequest) -> Result<AttackHandle> {
        let cancel = CancellationToken::new();
        let reservation = format!("{}", req);
        {
            let mut running = self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(current) = running.as_ref() {
                return Err(Error::AttackRunning(current.name.clone()));
            }
            *running = Some(RunningAttack {
                name: reservation.clone(),
                cancel: cancel.clone(),
            });
        }

        match self.start_attack(req, cancel, &reservation).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                clear_running(&self.running, &reservation);
                Err(e)
            }
        }
    }

    async fn start_attack(
        &self,
        req: RunRequest,
        cancel: CancellationToken,
        reservation: &str,
    ) -> Result<AttackHandle> {
        let run = self.resolve(req, true)?;
        let ht = run
            .http_target()
            .ok_or_else(|| Error::AttackNotAllowed(run.sub_target_id().to_string()))?;
        let handler: Arc<dyn HttpHandler> = ht
            .handler
            .clone()
            .ok_or_else(|| Error::MissingHandler(ht.id.clone()))?;

        let slot = ht.attack_slot();
        slot.store(handler.pre_attack(&run).map_err(Error::Transport)?);
        let targeter = handler.attack(&run).map_err(Error::Transport)?;

        let opts = &run.opts;
        let name = self.env.result_name(
            &run.target_id,
            &ht.id,
            chrono::Utc::now(),
            opts.rate_per_second(),
            opts.duration(),
        );
        let entry = self
            .registry
            .entry(&run.target_id)
            .ok_or_else(|| Error::TargetNotFound(run.target_id.clone()))?;

        let mut rx = match self
            .engine
            .run_attack(targeter, opts.rate(), opts.duration(), opts.timeout(), cancel.clone())
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                slot.clear();
                return Err(Error::Transport(e));
            }
        };

        {
            let mut running = self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(current) = running.as_mut().filter(|r| r.name == reservation) {
                current.name = name.clone();
            }
        }

        info!(
            event = "attack_dispatched",
            target_id = %run.target_id,
            http_target_id = %ht.id,
            result = %name,
            rate_per_second = opts.rate_per_second(),
            duration = %humantime::format_duration(opts.duration()),
            message = "Attack dispatched"
        );

        let hits = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = oneshot::channel();
        let collector = Collector {
            name: name.clone(),
            http_target_id: ht.id.clone(),
            results_dir: self.env.results_dir.clone(),
            entry,
            running: Arc::clone(&self.running),
            cancel: cancel.clone(),
            hits: Arc::clone(&hits),
        };
        tokio::spawn(async move {
            let mut received: Vec<Hit> = Vec::new();
            while let Some(hit) = rx.recv().await {
                received.push(hit);
                collector.hits.fetch_add(1, Ordering::Relaxed);
            }
            slot.clear();
            let outcome = collector.finish(&received);
            let _ = done_tx.send(outcome);
        });

        Ok(AttackHandle {
            name,
            cancel,
            hits,
            done: done_rx,
        })
    }

    /// Cancel the running attack, if any.
    pub fn attack_cancel(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match running.as_ref() {
            Some(current) => {
                info!(event = "attack_cancel", result = %current.name, message = "Cancelling attack");
                current.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Name of the running attack, if any
    pub fn running_attack(&self) -> Option<String> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|r| r.name.clone())
    }

    fn with_http_target<T>(
        &self,
        target_id: &str,
        http_target_id: &str,
        f: impl FnOnce(&mut crate::target::HttpTarget) -> Result<T>,
    ) -> Result<T> {
        let entry = self
            .registry
            .entry(target_id)
            .ok_or_else(|| Error::TargetNotFound(target_id.to_string()))?;
        let mut target = write_target(&entry);
        let ht = target
            .find_http_target_mut(http_target_id)
            .ok_or_else(|| Error::SubTargetNotFound {
                target_id: target_id.to_string(),
                sub_target_id: http_target_id.to_string(),
            })?;
        f(ht)
    }

    /// Results of an HTTP sub-target, oldest first.
    pub fn list_results(&self, target_id: &str, http_target_id: &str) -> Result<Vec<AttackResult>> {
        self.with_http_target(target_id, http_target_id, |ht| Ok(ht.results.clone()))
    }

    pub fn get_result(&self, target_id: &str, http_target_id: &str, name: &str) -> Result<AttackResult> {
        self.with_http_target(target_id, http_target_id, |ht| {
            ht.get_result_by_name(name)
                .cloned()
                .ok_or_else(|| Error::ResultNotFound(name.to_string()))
        })
    }

    /// Summarize a stored result.
    pub fn result_report(&self, target_id: &str, http_target_id: &str, name: &str) -> Result<Metrics> {
        let result = self.get_result(target_id, http_target_id, name)?;
        result.report().map_err(Error::Transport)
    }

    /// Stop tracking a result and remove its file. Deleting an unknown name
    /// is not an error.
    pub fn delete_result(
        &self,
        target_id: &str,
        http_target_id: &str,
        name: &str,
    ) -> Result<Option<AttackResult>> {
        let deleted = self.with_http_target(target_id, http_target_id, |ht| Ok(ht.delete_result(name)))?;
        if let Some(result) = &deleted {
            match std::fs::remove_file(result.full_path()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            info!(event = "result_deleted", result = %name, message = "Attack result deleted");
        }
        Ok(deleted)
    }
}

struct Collector {
    name: String,
    http_target_id: String,
    results_dir: std::path::PathBuf,
    entry: TargetEntry,
    running: RunningSlot,
    cancel: CancellationToken,
    hits: Arc<AtomicUsize>,
}

impl Collector {
    fn finish(self, hits: &[Hit]) -> Result<Option<AttackResult>> {
        let outcome = self.store(hits);
        clear_running(&self.running, &self.name);
        outcome
    }

    fn store(&self, hits: &[Hit]) -> Result<Option<AttackResult>> {
        if self.cancel.is_cancelled() {
            info!(
                event = "attack_cancelled",
                result = %self.name,
                hits = hits.len(),
                message = "Attack cancelled, result not stored"
            );
            return Ok(None);
        }

        let mut target = write_target(&self.entry);
        let target_id = target.id.clone();
        let ht = target
            .find_http_target_mut(&self.http_target_id)
            .ok_or_else(|| Error::SubTargetNotFound {
                target_id,
                sub_target_id: self.http_target_id.clone(),
            })?;
        if ht.get_result_by_name(&self.name).is_some() {
            return Err(Error::DuplicateResultName(self.name.clone()));
        }

        let result = AttackResult::new(self.http_target_id.clone(), &self.results_dir, self.name.clone());
        if let Err(e) = result.save(hits) {
            let exists = e
                .downcast_ref::<std::io::Error>()
                .is_some_and(|io| io.kind() == std::io::ErrorKind::AlreadyExists);
            return Err(if exists {
                Error::DuplicateResultName(self.name.clone())
            } else {
                Error::Transport(e)
            });
        }
        let stored = ht
            .add_result(&self.results_dir, &self.name, OnDuplicate::Reject)?
            .clone();

        info!(
            event = "attack_stored",
            result = %self.name,
            hits = hits.len(),
            message = "Attack result stored"
        );
        Ok(Some(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Targeter, WebSocketHandler};
    use crate::models::{AttackTarget, RequestMethod};
    use crate::options::{AttackOptions, Rate};
    use crate::target::{HttpTarget, WebSocketTarget};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Echo;

    #[async_trait::async_trait]
    impl HttpHandler for Echo {
        async fn run(&self, run: &ResolvedRun) -> anyhow::Result<RunResponse> {
            let target = run.attack_target()?;
            Ok(RunResponse {
                method: target.method,
                url: target.url.to_string(),
                status_code: 200,
                ..Default::default()
            })
        }
    }

    struct Slow;

    #[async_trait::async_trait]
    impl WebSocketHandler for Slow {
        async fn run(&self, _run: &ResolvedRun) -> anyhow::Result<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    /// Fires `targeter` a fixed number of times without any network.
    struct FixedEngine {
        hits: usize,
    }

    #[async_trait::async_trait]
    impl AttackEngine for FixedEngine {
        async fn run_attack(
            &self,
            targeter: Targeter,
            _rate: Rate,
            _duration: Duration,
            _timeout: Duration,
            cancel: CancellationToken,
        ) -> anyhow::Result<mpsc::Receiver<Hit>> {
            let (tx, rx) = mpsc::channel(16);
            let hits = self.hits;
            tokio::spawn(async move {
                for _ in 0..hits {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let target: AttackTarget = match targeter() {
                        Ok(target) => target,
                        Err(_) => continue,
                    };
                    let hit = Hit {
                        timestamp: chrono::Utc::now(),
                        latency: Duration::from_millis(1),
                        status_code: 200,
                        error: None,
                        method: target.method,
                        url: target.url.to_string(),
                        bytes_in: 0,
                        bytes_out: 0,
                    };
                    if tx.send(hit).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        }
    }

    /// Fires 3 hits on the first attack, 6 on the second and so on.
    #[derive(Default)]
    struct GrowingEngine {
        runs: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AttackEngine for GrowingEngine {
        async fn run_attack(
            &self,
            targeter: Targeter,
            rate: Rate,
            duration: Duration,
            timeout: Duration,
            cancel: CancellationToken,
        ) -> anyhow::Result<mpsc::Receiver<Hit>> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            FixedEngine { hits: 3 * run }
                .run_attack(targeter, rate, duration, timeout, cancel)
                .await
        }
    }

    fn bombard(dir: &std::path::Path, engine: Arc<dyn AttackEngine>) -> Bombard {
        let env = Environment {
            results_dir: dir.to_path_buf(),
            ..Default::default()
        };
        Bombard::new(env).unwrap().with_engine(engine)
    }

    fn example() -> Target {
        Target::new("Example", "http://127.0.0.1:8217")
            .opts(AttackOptions::new(Duration::from_secs(1), 10, Duration::from_secs(5)))
            .http_target(
                HttpTarget::new(RequestMethod::Get, "/example")
                    .allow_attack(true)
                    .handler(Arc::new(Echo)),
            )
            .http_target(HttpTarget::new(RequestMethod::Get, "/example/run").handler(Arc::new(Echo)))
            .http_target(HttpTarget::new(RequestMethod::Get, "/example/bare"))
            .web_socket_target(WebSocketTarget::new("Slow").handler(Arc::new(Slow)))
    }

    #[tokio::test]
    async fn test_run_request_http() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 0 }));
        bombard.register_target(example()).unwrap();

        let output = bombard
            .run_request(RunRequest::http("example", "_example_run"), &CancellationToken::new())
            .await
            .unwrap();
        match output {
            RunOutput::Http(response) => {
                assert_eq!(response.status_code, 200);
                assert_eq!(response.url, "http://127.0.0.1:8217/example/run");
            }
            other => panic!("expected HTTP output, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_request_lookup_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 0 }));
        bombard.register_target(example()).unwrap();
        let cancel = CancellationToken::new();

        assert!(matches!(
            bombard.run_request(RunRequest::http("missing", "_example"), &cancel).await,
            Err(Error::TargetNotFound(_))
        ));
        assert!(matches!(
            bombard.run_request(RunRequest::http("example", "missing"), &cancel).await,
            Err(Error::SubTargetNotFound { .. })
        ));
        assert!(matches!(
            bombard.run_request(RunRequest::http("example", "_example_bare"), &cancel).await,
            Err(Error::MissingHandler(_))
        ));
    }

    #[tokio::test]
    async fn test_run_request_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 0 }));
        bombard.register_target(example()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = bombard
            .run_request(RunRequest::web_socket("example", "slow"), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_request_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 0 }));
        bombard.register_target(example()).unwrap();

        let mut req = RunRequest::web_socket("example", "slow");
        req.target.opts.set_timeout(Duration::from_millis(50));
        let result = bombard.run_request(req, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Timeout(t)) if t == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_attack_stores_result() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 5 }));
        bombard.register_target(example()).unwrap();

        let handle = bombard
            .attack_request(RunRequest::http("example", "_example"))
            .await
            .unwrap();
        let name = handle.name().to_string();
        assert!(name.starts_with("example._example."));
        assert!(name.ends_with(".10x1s.json"));

        let stored = handle.wait().await.unwrap().unwrap();
        assert_eq!(stored.name, name);
        assert!(stored.full_path().exists());
        assert!(bombard.running_attack().is_none());

        let results = bombard.list_results("example", "_example").unwrap();
        assert_eq!(results.len(), 1);
        let report = bombard.result_report("example", "_example", &name).unwrap();
        assert_eq!(report.requests, 5);
    }

    #[tokio::test]
    async fn test_attack_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 0 }));
        bombard.register_target(example()).unwrap();

        assert!(matches!(
            bombard.attack_request(RunRequest::http("example", "_example_run")).await,
            Err(Error::AttackNotAllowed(_))
        ));
        assert!(matches!(
            bombard.attack_request(RunRequest::web_socket("example", "slow")).await,
            Err(Error::AttackNotAllowed(_))
        ));
        assert!(bombard.running_attack().is_none());
    }

    #[tokio::test]
    async fn test_delete_result_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 2 }));
        bombard.register_target(example()).unwrap();

        let stored = bombard
            .attack_request(RunRequest::http("example", "_example"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap()
            .unwrap();

        let deleted = bombard.delete_result("example", "_example", &stored.name).unwrap();
        assert_eq!(deleted, Some(stored.clone()));
        assert!(!stored.full_path().exists());
        assert!(matches!(
            bombard.get_result("example", "_example", &stored.name),
            Err(Error::ResultNotFound(_))
        ));
        assert_eq!(bombard.delete_result("example", "_example", &stored.name).unwrap(), None);
    }

    #[test]
    fn test_register_restores_results() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "example._example.20240102030405.10x1s.json",
            "example._example.20240101030405.10x1s.json",
            "example._example_run.20240101030405.10x1s.json",
            "other._example.20240101030405.10x1s.json",
            "example._example.notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let bombard = bombard(dir.path(), Arc::new(FixedEngine { hits: 0 }));
        bombard.register_target(example()).unwrap();

        let names: Vec<String> = bombard
            .list_results("example", "_example")
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "example._example.20240101030405.10x1s.json",
                "example._example.20240102030405.10x1s.json",
            ]
        );
        assert_eq!(bombard.list_results("example", "_example_run").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_back_to_back_attacks_keep_first_result() {
        let dir = tempfile::tempdir().unwrap();
        let bombard = bombard(dir.path(), Arc::new(GrowingEngine::default()));
        bombard.register_target(example()).unwrap();

        let first = bombard
            .attack_request(RunRequest::http("example", "_example"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.load().unwrap().len(), 3);

        let second = bombard
            .attack_request(RunRequest::http("example", "_example"))
            .await
            .unwrap();
        let same_name = second.name() == first.name;
        let outcome = second.wait().await;
        if same_name {
            assert!(matches!(outcome, Err(Error::DuplicateResultName(_))));
            assert_eq!(bombard.list_results("example", "_example").unwrap().len(), 1);
        } else {
            assert_eq!(outcome.unwrap().unwrap().load().unwrap().len(), 6);
        }

        assert_eq!(first.load().unwrap().len(), 3);
        assert_eq!(bombard.get_result("example", "_example", &first.name).unwrap(), first);
        assert!(bombard.running_attack().is_none());
    }
}
