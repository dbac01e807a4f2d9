//! End-to-end orchestration tests over scripted device sessions and an
//! in-memory snapshot store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use netvault_core::{
    content_hash, BackupError, BackupTarget, ChangeKind, Credential, Device, DeviceSession,
    ErrorKind, JobState, Orchestrator, OrchestratorConfig, Report, Result, RetryPolicy,
    SessionFactory, Snapshot, SnapshotMeta, TriggerKind, VersionedRepository,
};

/// Scripted transport behavior for one fake device.
#[derive(Clone)]
enum Script {
    /// Connect succeeds and fetch returns this text.
    Content(&'static str),
    /// Every connect fails with a transient connection error.
    RefuseConnect,
    /// Every connect fails with an authentication error.
    DenyAuth,
    /// Connect never completes.
    HangConnect,
    /// Connect holds a slot for `hold` before succeeding.
    SlowConnect {
        hold: Duration,
        content: &'static str,
    },
}

/// Shared counters observed by the assertions.
#[derive(Default)]
struct Gauges {
    connects: AtomicUsize,
    currently_connecting: AtomicUsize,
    peak_connecting: AtomicUsize,
}

struct ScriptedSession {
    device_name: String,
    script: Script,
    gauges: Arc<Gauges>,
    content: Option<String>,
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    async fn connect(&mut self) -> Result<()> {
        self.gauges.connects.fetch_add(1, Ordering::SeqCst);
        let current = self
            .gauges
            .currently_connecting
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        self.gauges
            .peak_connecting
            .fetch_max(current, Ordering::SeqCst);

        let outcome = match &self.script {
            Script::Content(text) => {
                self.content = Some(text.to_string());
                Ok(())
            }
            Script::RefuseConnect => Err(BackupError::Connection(format!(
                "{}: connection refused",
                self.device_name
            ))),
            Script::DenyAuth => Err(BackupError::Authentication(format!(
                "{}: permission denied",
                self.device_name
            ))),
            Script::HangConnect => {
                // Still counted as CONNECTING; never decremented.
                std::future::pending::<()>().await;
                unreachable!()
            }
            Script::SlowConnect { hold, content } => {
                tokio::time::sleep(*hold).await;
                self.content = Some(content.to_string());
                Ok(())
            }
        };

        self.gauges
            .currently_connecting
            .fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn fetch_config(&mut self) -> Result<String> {
        self.content.clone().ok_or_else(|| {
            BackupError::Connection(format!("{}: session not connected", self.device_name))
        })
    }

    async fn disconnect(&mut self) {}
}

struct ScriptedFactory {
    scripts: HashMap<String, Script>,
    gauges: Arc<Gauges>,
}

impl ScriptedFactory {
    fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(name, script)| (name.to_string(), script.clone()))
                .collect(),
            gauges: Arc::new(Gauges::default()),
        }
    }
}

impl SessionFactory for ScriptedFactory {
    fn open(&self, device: &Device, _credential: &Credential) -> Result<Box<dyn DeviceSession>> {
        let script = self
            .scripts
            .get(&device.name)
            .cloned()
            .ok_or_else(|| BackupError::UnsupportedDevice(device.device_type.clone()))?;
        Ok(Box::new(ScriptedSession {
            device_name: device.name.clone(),
            script,
            gauges: Arc::clone(&self.gauges),
            content: None,
        }))
    }
}

/// In-memory snapshot store tracking commit counts.
#[derive(Default)]
struct MemoryRepository {
    histories: Mutex<BTreeMap<String, Vec<Snapshot>>>,
    commits: AtomicUsize,
}

impl MemoryRepository {
    fn seed(&self, device: &str, content: &str) {
        let mut histories = self.histories.lock().unwrap();
        let history = histories.entry(device.to_string()).or_default();
        history.push(Snapshot {
            device_name: device.to_string(),
            content: content.to_string(),
            content_hash: content_hash(content),
            commit_id: format!("seed-{device}-{}", history.len()),
            captured_at: Utc::now(),
        });
    }

    fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionedRepository for MemoryRepository {
    async fn latest_snapshot(&self, device_name: &str) -> Result<Option<Snapshot>> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(device_name)
            .and_then(|h| h.last().cloned()))
    }

    async fn commit_snapshot(
        &self,
        device_name: &str,
        content: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let mut histories = self.histories.lock().unwrap();
        let history = histories.entry(device_name.to_string()).or_default();
        let snapshot = Snapshot {
            device_name: device_name.to_string(),
            content: content.to_string(),
            content_hash: content_hash(content),
            commit_id: format!("commit-{device_name}-{}", history.len()),
            captured_at,
        };
        history.push(snapshot.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(snapshot)
    }

    async fn history(&self, device_name: &str, limit: usize) -> Result<Vec<SnapshotMeta>> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(device_name)
            .map(|h| {
                h.iter()
                    .rev()
                    .take(limit)
                    .rev()
                    .map(|s| SnapshotMeta {
                        commit_id: s.commit_id.clone(),
                        message: format!("backup({device_name})"),
                        captured_at: s.captured_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn diff_latest(&self, _device_name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

fn device(name: &str) -> Device {
    Device {
        name: name.into(),
        hostname: format!("{name}.example.net"),
        device_type: "cisco_ios".into(),
        groups: vec![],
        enabled: true,
        port: 22,
    }
}

fn targets(names: &[&str]) -> Vec<BackupTarget> {
    names
        .iter()
        .map(|name| BackupTarget {
            device: device(name),
            credential: Credential {
                username: "netops".into(),
                password: String::new(),
            },
        })
        .collect()
}

fn fast_config(max_retries: u32, backoff_ms: u64, attempt_timeout_ms: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        max_concurrent_backups: 4,
        per_device_timeout: Duration::from_millis(attempt_timeout_ms),
        retry_policy: RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(backoff_ms),
            backoff_cap: Duration::from_secs(2),
        },
        run_deadline: Duration::from_secs(20),
    }
}

#[tokio::test]
async fn transient_failure_exhausts_retries_then_fails() {
    let repo = Arc::new(MemoryRepository::default());
    let factory = Arc::new(ScriptedFactory::new(&[("flaky", Script::RefuseConnect)]));
    let gauges = Arc::clone(&factory.gauges);

    let orchestrator = Orchestrator::new(repo, factory, fast_config(2, 50, 5_000));

    let started = Instant::now();
    let run = orchestrator.run(targets(&["flaky"]), TriggerKind::Manual).await;
    let elapsed = started.elapsed();

    let job = &run.jobs["flaky"];
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt_count, 3, "max_retries + 1 attempts");
    assert_eq!(job.error.as_ref().unwrap().kind, ErrorKind::Connection);
    assert_eq!(gauges.connects.load(Ordering::SeqCst), 3);

    // Backoffs of 50ms and 100ms must have elapsed between attempts.
    assert!(elapsed >= Duration::from_millis(150), "elapsed: {elapsed:?}");
}

#[tokio::test]
async fn authentication_failure_fails_after_one_attempt() {
    let repo = Arc::new(MemoryRepository::default());
    let factory = Arc::new(ScriptedFactory::new(&[("locked", Script::DenyAuth)]));
    let gauges = Arc::clone(&factory.gauges);

    let orchestrator = Orchestrator::new(repo, factory, fast_config(5, 50, 5_000));
    let run = orchestrator
        .run(targets(&["locked"]), TriggerKind::Manual)
        .await;

    let job = &run.jobs["locked"];
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt_count, 1);
    assert_eq!(job.error.as_ref().unwrap().kind, ErrorKind::Authentication);
    assert_eq!(gauges.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn identical_content_across_runs_commits_once() {
    let repo = Arc::new(MemoryRepository::default());
    let factory = Arc::new(ScriptedFactory::new(&[(
        "stable",
        Script::Content("hostname stable\n"),
    )]));
    let orchestrator = Orchestrator::new(
        Arc::clone(&repo) as Arc<dyn VersionedRepository>,
        factory,
        fast_config(0, 50, 5_000),
    );

    let first = orchestrator
        .run(targets(&["stable"]), TriggerKind::Manual)
        .await;
    assert_eq!(
        first.jobs["stable"].change_record.as_ref().unwrap().classification,
        ChangeKind::FirstSnapshot
    );
    assert_eq!(repo.commit_count(), 1);

    let second = orchestrator
        .run(targets(&["stable"]), TriggerKind::Manual)
        .await;
    let record = second.jobs["stable"].change_record.as_ref().unwrap();
    assert_eq!(record.classification, ChangeKind::Unchanged);
    assert!(record.new_commit_id.is_none());
    assert_eq!(repo.commit_count(), 1, "no redundant commit on second run");
}

#[tokio::test]
async fn concurrency_is_bounded_by_the_pool() {
    let names = ["d1", "d2", "d3", "d4", "d5", "d6"];
    let scripts: Vec<(&str, Script)> = names
        .iter()
        .map(|name| {
            (
                *name,
                Script::SlowConnect {
                    hold: Duration::from_millis(100),
                    content: "cfg\n",
                },
            )
        })
        .collect();
    let repo = Arc::new(MemoryRepository::default());
    let factory = Arc::new(ScriptedFactory::new(&scripts));
    let gauges = Arc::clone(&factory.gauges);

    let config = OrchestratorConfig {
        max_concurrent_backups: 2,
        ..fast_config(0, 50, 5_000)
    };
    let orchestrator = Orchestrator::new(repo, factory, config);
    let run = orchestrator.run(targets(&names), TriggerKind::Manual).await;

    assert_eq!(run.failed_count(), 0);
    assert!(
        gauges.peak_connecting.load(Ordering::SeqCst) <= 2,
        "peak concurrent connects: {}",
        gauges.peak_connecting.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn mixed_fleet_produces_expected_report_and_commits() {
    let repo = Arc::new(MemoryRepository::default());
    repo.seed("b", "cfgB\n");
    repo.seed("c", "cfgC-old\n");

    let factory = Arc::new(ScriptedFactory::new(&[
        ("a", Script::Content("v1\n")),
        ("b", Script::Content("cfgB\n")),
        ("c", Script::Content("cfgC-new\n")),
    ]));
    let orchestrator = Orchestrator::new(
        Arc::clone(&repo) as Arc<dyn VersionedRepository>,
        factory,
        fast_config(0, 50, 5_000),
    );

    let run = orchestrator
        .run(targets(&["a", "b", "c"]), TriggerKind::Manual)
        .await;
    let report = Report::build(&run);

    assert_eq!(report.first_snapshot, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.changed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.first_snapshot_devices, vec!["a".to_string()]);
    assert_eq!(report.unchanged_devices, vec!["b".to_string()]);

    let change = &report.changes[0];
    assert_eq!(change.device_name, "c");
    assert!(change.diff_text.contains("-cfgC-old"));
    assert!(change.diff_text.contains("+cfgC-new"));
    assert!(change.new_commit_id.is_some());

    // Repository gains commits for a and c only.
    assert_eq!(repo.commit_count(), 2);
}

#[tokio::test]
async fn perpetual_timeout_is_bounded_and_fails() {
    let repo = Arc::new(MemoryRepository::default());
    let factory = Arc::new(ScriptedFactory::new(&[("stuck", Script::HangConnect)]));

    // 3 attempts of 200ms plus backoffs of 100ms and 200ms.
    let orchestrator = Orchestrator::new(repo, factory, fast_config(2, 100, 200));

    let started = Instant::now();
    let run = orchestrator.run(targets(&["stuck"]), TriggerKind::Manual).await;
    let elapsed = started.elapsed();

    let job = &run.jobs["stuck"];
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt_count, 3);
    assert_eq!(job.error.as_ref().unwrap().kind, ErrorKind::Timeout);
    assert!(elapsed >= Duration::from_millis(700), "elapsed: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "elapsed: {elapsed:?}");
}

#[tokio::test]
async fn run_deadline_forces_unfinished_jobs_to_timeout() {
    let repo = Arc::new(MemoryRepository::default());
    let factory = Arc::new(ScriptedFactory::new(&[("wedged", Script::HangConnect)]));

    let config = OrchestratorConfig {
        per_device_timeout: Duration::from_secs(30),
        run_deadline: Duration::from_millis(300),
        ..fast_config(0, 50, 30_000)
    };
    let orchestrator = Orchestrator::new(repo, factory, config);

    let started = Instant::now();
    let run = orchestrator
        .run(targets(&["wedged"]), TriggerKind::Manual)
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(run.is_finalized(), "run must always complete");

    let job = &run.jobs["wedged"];
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error.as_ref().unwrap().kind, ErrorKind::Timeout);
    assert!(job.error.as_ref().unwrap().message.contains("deadline"));
}

#[tokio::test]
async fn every_target_gets_exactly_one_terminal_entry() {
    let repo = Arc::new(MemoryRepository::default());
    let factory = Arc::new(ScriptedFactory::new(&[
        ("good", Script::Content("cfg\n")),
        ("flaky", Script::RefuseConnect),
        ("locked", Script::DenyAuth),
    ]));
    let orchestrator = Orchestrator::new(repo, factory, fast_config(0, 10, 5_000));

    let run = orchestrator
        .run(targets(&["good", "flaky", "locked"]), TriggerKind::Manual)
        .await;

    assert_eq!(run.jobs.len(), 3);
    assert!(run.jobs.values().all(|j| j.state.is_terminal()));
    assert_eq!(run.failed_count(), 2);
    assert!(run.is_finalized());
}
