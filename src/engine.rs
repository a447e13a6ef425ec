//! Rate-limited attack engine.
//!
//! The engine calls a [`Targeter`] once per tick and fires the returned
//! request on a bounded pool of workers. Hits stream back on a channel that
//! closes once the duration has elapsed, or the attack is cancelled, and
//! every in-flight request has finished.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::Targeter;
use crate::models::{AttackTarget, Hit};
use crate::options::Rate;
use crate::telemetry;

/// Capacity of the hit channel returned by [`AttackEngine::run_attack`].
const HIT_CHANNEL_CAPACITY: usize = 1000;

#[async_trait]
pub trait AttackEngine: Send + Sync {
    /// Start an attack and return the stream of its hits.
    async fn run_attack(
        &self,
        targeter: Targeter,
        rate: Rate,
        duration: Duration,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<Hit>>;
}

/// Tuning of the HTTP client and worker pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial number of concurrent workers
    pub workers: usize,
    /// Workers are added linearly over the attack up to this number
    pub max_workers: Option<usize>,
    /// Max idle connections per host
    pub connections: usize,
    pub keepalive: bool,
    pub http2: bool,
    /// Ignore invalid server TLS certificates
    pub insecure: bool,
    /// Redirects to follow, negative to disable
    pub redirects: i32,
    /// Max response bytes counted per hit, negative for no limit
    pub max_body: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            max_workers: None,
            connections: 10000,
            keepalive: true,
            http2: true,
            insecure: false,
            redirects: 10,
            max_body: -1,
        }
    }
}

/// Default [`AttackEngine`] backed by reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpEngine {
    config: EngineConfig,
}

impl HttpEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn client(&self, timeout: Duration) -> anyhow::Result<Client> {
        let mut client_builder = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(self.config.connections);

        if !self.config.keepalive {
            client_builder = client_builder.pool_max_idle_per_host(0);
        }

        if self.config.insecure {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        if self.config.http2 {
            client_builder = client_builder.http2_adaptive_window(true);
        }

        if self.config.redirects >= 0 {
            client_builder =
                client_builder.redirect(reqwest::redirect::Policy::limited(self.config.redirects as usize));
        } else {
            client_builder = client_builder.redirect(reqwest::redirect::Policy::none());
        }

        client_builder.build().context("Failed to build HTTP client")
    }
}

#[async_trait]
impl AttackEngine for HttpEngine {
    async fn run_attack(
        &self,
        targeter: Targeter,
        rate: Rate,
        duration: Duration,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> anyhow::Result<mpsc::Receiver<Hit>> {
        let delay = rate
            .interval()
            .ok_or_else(|| anyhow::anyhow!("Attack rate must be greater than zero"))?;
        let client = Arc::new(self.client(timeout)?);
        let config = self.config.clone();

        let (tx, rx) = mpsc::channel::<Hit>(HIT_CHANNEL_CAPACITY);

        info!(
            event = "attack_started",
            rate = rate.freq,
            per = %humantime::format_duration(rate.per),
            duration = %humantime::format_duration(duration),
            workers = config.workers,
            message = "Starting attack"
        );

        tokio::spawn(async move {
            let start_time = Instant::now();
            let end_time = start_time + duration;
            let mut interval = tokio::time::interval(delay);
            let worker_semaphore = Arc::new(Semaphore::new(config.workers.max(1)));

            // Ramp up to max_workers over the attack duration
            if let Some(max_workers) = config.max_workers {
                if max_workers > config.workers {
                    let semaphore = Arc::clone(&worker_semaphore);
                    let worker_diff = max_workers - config.workers;
                    let step = duration.div_f64(worker_diff as f64);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        for _ in 0..worker_diff {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                _ = sleep(step) => semaphore.add_permits(1),
                            }
                        }
                    });
                }
            }

            let mut request_count: u64 = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if Instant::now() >= end_time {
                    break;
                }

                let target = match targeter() {
                    Ok(target) => target,
                    Err(e) => {
                        warn!(event = "targeter_error", error = %e, message = "Failed to build attack request");
                        let hit = failed_hit(String::new(), String::new(), Instant::now(), format!("{:#}", e));
                        telemetry::record_hit(&hit);
                        if tx.send(hit).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let permit = tokio::select! {
                    _ = cancel.cancelled() => break,
                    permit = Arc::clone(&worker_semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                // In-flight requests always complete; cancel only stops scheduling.
                let client = Arc::clone(&client);
                let tx = tx.clone();
                let max_body = config.max_body;
                tokio::spawn(async move {
                    let hit = make_request(&client, target, max_body).await;
                    telemetry::record_hit(&hit);
                    let _ = tx.send(hit).await;
                    drop(permit);
                });

                request_count += 1;
            }

            info!(
                event = "attack_completed",
                requests = request_count,
                cancelled = cancel.is_cancelled(),
                elapsed = %humantime::format_duration(Duration::from_millis(start_time.elapsed().as_millis() as u64)),
                message = "Attack completed"
            );
        });

        Ok(rx)
    }
}

fn failed_hit(method: String, url: String, start_time: Instant, error: String) -> Hit {
    Hit {
        timestamp: chrono::Utc::now(),
        latency: start_time.elapsed(),
        status_code: 0,
        error: Some(error),
        method,
        url,
        bytes_in: 0,
        bytes_out: 0,
    }
}

/// Fire a single request and measure it.
pub async fn make_request(client: &Client, target: AttackTarget, max_body: i64) -> Hit {
    let start_time = Instant::now();
    let timestamp = chrono::Utc::now();
    let method_name = target.method.clone();
    let url = target.url.to_string();

    let method = match reqwest::Method::from_bytes(target.method.as_bytes()) {
        Ok(method) => method,
        Err(e) => {
            return failed_hit(method_name, url, start_time, format!("Invalid method: {}", e));
        }
    };

    let mut request_builder = client.request(method, target.url);
    for header in &target.headers {
        request_builder = request_builder.header(&header.name, &header.value);
    }

    let bytes_out = target.body.as_ref().map(|b| b.len()).unwrap_or(0);
    if let Some(body) = target.body {
        request_builder = request_builder.body(body);
    }

    debug!(event = "request_start", method = %method_name, url = %url, message = "Starting request");

    match request_builder.send().await {
        Ok(response) => {
            let status_code = response.status().as_u16();
            let body_bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Hit {
                        timestamp,
                        latency: start_time.elapsed(),
                        status_code,
                        error: Some(format!("Failed to read response body: {}", e)),
                        method: method_name,
                        url,
                        bytes_in: 0,
                        bytes_out,
                    };
                }
            };

            let bytes_in = if max_body >= 0 && (body_bytes.len() as i64) > max_body {
                max_body as usize
            } else {
                body_bytes.len()
            };

            Hit {
                timestamp,
                latency: start_time.elapsed(),
                status_code,
                error: None,
                method: method_name,
                url,
                bytes_in,
                bytes_out,
            }
        }
        Err(e) => Hit {
            timestamp,
            latency: start_time.elapsed(),
            status_code: 0,
            error: Some(format!("Request failed: {}", e)),
            method: method_name,
            url,
            bytes_in: 0,
            bytes_out,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing_targeter(calls: Arc<AtomicUsize>) -> Targeter {
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("not armed"))
        })
    }

    #[tokio::test]
    async fn test_zero_rate_is_rejected() {
        let engine = HttpEngine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let result = engine
            .run_attack(
                failing_targeter(calls),
                Rate::per_second(0),
                Duration::from_secs(1),
                Duration::from_secs(1),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_targeter_errors_become_hits() {
        let engine = HttpEngine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut rx = engine
            .run_attack(
                failing_targeter(Arc::clone(&calls)),
                Rate::per_second(50),
                Duration::from_millis(200),
                Duration::from_secs(1),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut hits = Vec::new();
        while let Some(hit) = rx.recv().await {
            hits.push(hit);
        }
        assert!(!hits.is_empty());
        assert_eq!(hits.len(), calls.load(Ordering::SeqCst));
        assert!(hits.iter().all(|h| h.error.as_deref() == Some("not armed")));
    }

    #[tokio::test]
    async fn test_cancel_closes_the_stream() {
        let engine = HttpEngine::default();
        let cancel = CancellationToken::new();
        let mut rx = engine
            .run_attack(
                failing_targeter(Arc::new(AtomicUsize::new(0))),
                Rate::per_second(10),
                Duration::from_secs(60),
                Duration::from_secs(1),
                cancel.clone(),
            )
            .await
            .unwrap();

        cancel.cancel();
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_requests_finish() {
        let app = axum::Router::new().route(
            "/slow",
            axum::routing::get(|| async {
                sleep(Duration::from_millis(500)).await;
                "late"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = url::Url::parse(&format!("http://{}/slow", addr)).unwrap();
        let targeter: Targeter = Arc::new(move || {
            Ok(AttackTarget {
                method: "GET".to_string(),
                url: url.clone(),
                headers: Vec::new(),
                body: None,
            })
        });

        let cancel = CancellationToken::new();
        let mut rx = HttpEngine::default()
            .run_attack(
                targeter,
                Rate::per_second(1),
                Duration::from_secs(10),
                Duration::from_secs(5),
                cancel.clone(),
            )
            .await
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let hits = tokio::time::timeout(Duration::from_secs(5), async {
            let mut hits = Vec::new();
            while let Some(hit) = rx.recv().await {
                hits.push(hit);
            }
            hits
        })
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].status_code, 200);
        assert!(hits[0].latency >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_huge_rate_does_not_panic() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut rx = HttpEngine::default()
            .run_attack(
                failing_targeter(Arc::clone(&calls)),
                Rate::per_second(u32::MAX),
                Duration::ZERO,
                Duration::from_secs(1),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        while rx.recv().await.is_some() {}
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_method_is_reported() {
        let client = Client::new();
        let target = AttackTarget {
            method: "BAD METHOD".to_string(),
            url: url::Url::parse("http://127.0.0.1:1/").unwrap(),
            headers: Vec::new(),
            body: None,
        };
        let hit = make_request(&client, target, -1).await;
        assert_eq!(hit.status_code, 0);
        assert!(hit.error.unwrap().starts_with("Invalid method"));
    }
}
