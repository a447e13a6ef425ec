use bombard::{
    AttackOptions, FormInput, HttpHandler, HttpTarget, KeyFormInput, RequestMethod,
    RequestType, ResolvedRun, ResolvedSubTarget, RunResponse,
};
use std::sync::{Arc, Barrier};
use std::time::Duration;

struct Noop;

#[async_trait::async_trait]
impl HttpHandler for Noop {
    async fn run(&self, _run: &ResolvedRun) -> anyhow::Result<RunResponse> {
        Ok(RunResponse::default())
    }
}

fn resolved() -> ResolvedRun {
    ResolvedRun {
        target_id: "example_http".to_string(),
        target_name: "Example HTTP".to_string(),
        base_url: "http://127.0.0.1:8217".to_string(),
        opts: AttackOptions::new(Duration::from_secs(10), 100, Duration::from_secs(5)),
        vars: KeyFormInput::new(),
        sub_target: ResolvedSubTarget::Http(
            HttpTarget::new(RequestMethod::Get, "/example")
                .id("http_get")
                .request_type(RequestType::Query)
                .headers(KeyFormInput::new().with("X-Get", FormInput::number("1.1")))
                .params(KeyFormInput::new().with("Param1", FormInput::number("1"))),
        ),
    }
}

#[test]
fn test_targeter_before_pre_attack_fails() {
    let run = resolved();
    let targeter = Noop.attack(&run).unwrap();
    assert!(targeter().is_err());
}

#[test]
fn test_snapshot_read_concurrently() {
    let run = resolved();
    let handler = Noop;

    let snapshot = handler.pre_attack(&run).unwrap();
    assert_eq!(snapshot.url.as_str(), "http://127.0.0.1:8217/example?Param1=1");
    run.http_target().unwrap().attack_slot().store(snapshot.clone());

    let targeter = handler.attack(&run).unwrap();
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let targeter = Arc::clone(&targeter);
            std::thread::spawn(move || {
                (0..1000)
                    .map(|_| targeter().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for worker in workers {
        let observed = worker.join().unwrap();
        assert_eq!(observed.len(), 1000);
        assert!(observed.iter().all(|t| *t == snapshot));
    }
}

#[test]
fn test_new_snapshot_replaces_old_one() {
    let run = resolved();
    let slot = run.http_target().unwrap().attack_slot();
    let targeter = Noop.attack(&run).unwrap();

    let first = Noop.pre_attack(&run).unwrap();
    slot.store(first.clone());
    assert_eq!(targeter().unwrap(), first);

    let mut second = first.clone();
    second.method = "POST".to_string();
    slot.store(second.clone());
    assert_eq!(targeter().unwrap(), second);
}

#[test]
fn test_snapshot_replaced_while_workers_read() {
    let run = resolved();
    let slot = run.http_target().unwrap().attack_slot();
    let first = Noop.pre_attack(&run).unwrap();
    let mut second = first.clone();
    second.method = "POST".to_string();
    slot.store(first.clone());

    let targeter = Noop.attack(&run).unwrap();
    let start = Arc::new(Barrier::new(9));
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let targeter = Arc::clone(&targeter);
            let start = Arc::clone(&start);
            std::thread::spawn(move || {
                start.wait();
                (0..5000)
                    .map(|_| targeter().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let writer = {
        let slot = Arc::clone(&slot);
        let second = second.clone();
        let start = Arc::clone(&start);
        std::thread::spawn(move || {
            start.wait();
            slot.store(second);
        })
    };

    writer.join().unwrap();
    for reader in readers {
        let observed = reader.join().unwrap();
        assert_eq!(observed.len(), 5000);
        assert!(observed.iter().all(|t| *t == first || *t == second));
    }
    assert_eq!(targeter().unwrap(), second);
}
