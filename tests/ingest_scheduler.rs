// tests/ingest_scheduler.rs
//
// Scheduler behavior on real runtimes with short intervals.
// Covered:
// - no overlapping runs per source
// - one failing or panicking source does not stop the others
// - a broken store does not stop ticking
// - a never-returning source does not delay another one
// - run_on_start = false delays the first run by one interval

use async_trait::async_trait;
use serde_json::json;
use skyglass_collector::record::{AttemptRecord, NewAttempt, RecordSummary};
use skyglass_collector::{
    CollectError, Collector, FetchOutcome, LogStore, MemoryLogStore, Scheduler, SchedulerCfg,
    StoreError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const TICK: Duration = Duration::from_millis(20);

fn cfg() -> SchedulerCfg {
    SchedulerCfg {
        fetch_timeout: Duration::from_secs(5),
        run_on_start: true,
    }
}

/// Blocks every fetch until a permit is released, tracking concurrency.
struct Gated {
    gate: Arc<Semaphore>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Gated {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(0)),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Collector for Gated {
    async fn fetch(&self) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let permit = self.gate.acquire().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
        Ok(json!({"ok": true}))
    }
    fn name(&self) -> &'static str {
        "gated"
    }
}

struct Counting {
    calls: AtomicUsize,
    mode: Mode,
}

enum Mode {
    Ok,
    Fail,
    Panic,
}

impl Counting {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            mode,
        })
    }
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for Counting {
    async fn fetch(&self) -> FetchOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Ok => Ok(json!({"n": n})),
            Mode::Fail => Err(CollectError::Http("connection refused".into())),
            Mode::Panic => panic!("collector blew up"),
        }
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

struct BrokenStore;

fn disk_full() -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
}

#[async_trait]
impl LogStore for BrokenStore {
    async fn append(&self, _entry: NewAttempt) -> Result<AttemptRecord, StoreError> {
        Err(disk_full())
    }
    async fn latest_success(&self, _source: &str) -> Result<Option<AttemptRecord>, StoreError> {
        Err(disk_full())
    }
    async fn latest_failure(&self, _source: &str) -> Result<Option<AttemptRecord>, StoreError> {
        Err(disk_full())
    }
    async fn records(&self, _source: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        Err(disk_full())
    }
    async fn recent(&self, _limit: usize) -> Result<Vec<RecordSummary>, StoreError> {
        Err(disk_full())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_job_is_never_overlapped() {
    let store = Arc::new(MemoryLogStore::new());
    let gated = Gated::new();

    let mut sched = Scheduler::new(store.clone(), cfg());
    sched.register("slow", TICK, gated.clone()).unwrap();
    let handle = sched.start();

    // Many intervals pass while the first job is blocked.
    tokio::time::sleep(TICK * 12).await;
    assert_eq!(gated.calls.load(Ordering::SeqCst), 1);
    assert_eq!(gated.max_active.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());

    // Release; later ticks run again, still one at a time.
    gated.gate.add_permits(1_000);
    tokio::time::sleep(TICK * 8).await;
    handle.shutdown();

    assert!(gated.calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(gated.max_active.load(Ordering::SeqCst), 1);
    let recs = store.records("slow").await.unwrap();
    assert!(!recs.is_empty());
    assert!(recs.iter().all(|r| r.is_success()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_and_panicking_sources_do_not_stop_others() {
    let store = Arc::new(MemoryLogStore::new());
    let ok = Counting::new(Mode::Ok);
    let failing = Counting::new(Mode::Fail);
    let panicking = Counting::new(Mode::Panic);

    let mut sched = Scheduler::new(store.clone(), cfg());
    sched.register("ok", TICK, ok.clone()).unwrap();
    sched.register("failing", TICK, failing.clone()).unwrap();
    sched.register("panicking", TICK, panicking.clone()).unwrap();
    let handle = sched.start();

    tokio::time::sleep(TICK * 10).await;
    assert!(handle.all_running());
    handle.shutdown();

    assert!(ok.calls() >= 2, "ok source ran {} times", ok.calls());
    assert!(failing.calls() >= 2);
    assert!(panicking.calls() >= 2);

    let ok_recs = store.records("ok").await.unwrap();
    assert!(ok_recs.iter().all(|r| r.is_success()));

    let fail = store.latest_failure("failing").await.unwrap().unwrap();
    assert_eq!(fail.error_message(), Some("connection refused"));
    assert!(store.latest_success("failing").await.unwrap().is_none());

    let boom = store.latest_failure("panicking").await.unwrap().unwrap();
    assert!(boom
        .error_message()
        .is_some_and(|m| m.contains("collector blew up")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_store_does_not_stop_ticking() {
    let collector = Counting::new(Mode::Ok);
    let mut sched = Scheduler::new(Arc::new(BrokenStore), cfg());
    sched.register("quake", TICK, collector.clone()).unwrap();
    let handle = sched.start();

    tokio::time::sleep(TICK * 8).await;
    assert!(handle.all_running());
    handle.shutdown();
    assert!(collector.calls() >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_on_start_false_waits_one_interval() {
    let store = Arc::new(MemoryLogStore::new());
    let collector = Counting::new(Mode::Ok);
    let interval = Duration::from_millis(300);

    let mut sched = Scheduler::new(
        store.clone(),
        SchedulerCfg {
            run_on_start: false,
            ..cfg()
        },
    );
    sched.register("quake", interval, collector.clone()).unwrap();
    let handle = sched.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.calls(), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.shutdown();
    assert!(collector.calls() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hung_collector_times_out_into_failure_records() {
    struct Hang;

    #[async_trait]
    impl Collector for Hang {
        async fn fetch(&self) -> FetchOutcome {
            std::future::pending::<()>().await;
            Ok(json!(null))
        }
        fn name(&self) -> &'static str {
            "hang"
        }
    }

    let store = Arc::new(MemoryLogStore::new());
    let mut sched = Scheduler::new(
        store.clone(),
        SchedulerCfg {
            fetch_timeout: Duration::from_millis(30),
            run_on_start: true,
        },
    );
    sched.register("hang", TICK, Arc::new(Hang)).unwrap();
    let handle = sched.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown();

    let recs = store.records("hang").await.unwrap();
    assert!(recs.len() >= 2);
    assert!(recs
        .iter()
        .all(|r| r.error_message().is_some_and(|m| m.contains("timed out"))));
}

struct NeverReturns {
    calls: AtomicUsize,
}

#[async_trait]
impl Collector for NeverReturns {
    async fn fetch(&self) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(json!(null))
    }
    fn name(&self) -> &'static str {
        "never"
    }
}

#[tokio::test(flavor = "current_thread")]
async fn blocked_source_does_not_delay_another() {
    let store = Arc::new(MemoryLogStore::new());
    let stuck = Arc::new(NeverReturns {
        calls: AtomicUsize::new(0),
    });
    let fast = Counting::new(Mode::Ok);

    let mut sched = Scheduler::new(
        store.clone(),
        SchedulerCfg {
            fetch_timeout: Duration::from_secs(3600),
            run_on_start: true,
        },
    );
    sched.register("stuck", TICK, stuck.clone()).unwrap();
    sched.register("fast", TICK, fast.clone()).unwrap();
    let handle = sched.start();

    tokio::time::sleep(TICK * 10).await;
    assert!(handle.all_running());
    handle.shutdown();

    assert_eq!(stuck.calls.load(Ordering::SeqCst), 1);
    assert!(store.records("stuck").await.unwrap().is_empty());
    let fast_recs = store.records("fast").await.unwrap();
    assert!(
        fast_recs.len() >= 3,
        "fast source logged {} records",
        fast_recs.len()
    );
    assert!(fast_recs.iter().all(|r| r.is_success()));
}
