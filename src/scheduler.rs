// src/scheduler.rs
//! Job scheduling: an interval loop for ingestion, a wall-clock daily loop for
//! digests, and manual triggers. Every path enters a job through the same
//! single-flight guard.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ingestion,
    Digest,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Ingestion => "ingestion",
            JobKind::Digest => "digest",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
}

/// Answer to a manual trigger; the job outcome is not awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAck {
    Accepted,
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job: JobKind,
    pub state: JobState,
    pub runs: u64,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// What the scheduler actually runs.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run_job(&self, kind: JobKind) -> Result<()>;
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub ingest_interval: Duration,
    pub digest_time: NaiveTime,
}

#[derive(Default)]
struct Timestamps {
    last_started_at: Option<DateTime<Utc>>,
    last_finished_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Default)]
struct JobSlot {
    running: AtomicBool,
    runs: AtomicU64,
    times: Mutex<Timestamps>,
}

pub struct Scheduler {
    cfg: SchedulerCfg,
    ingestion: JobSlot,
    digest: JobSlot,
    last_digest_day: Mutex<Option<NaiveDate>>,
}

/// Held while a job runs; dropping it returns the job to `Idle`.
pub struct JobGuard {
    sched: Arc<Scheduler>,
    kind: JobKind,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.sched.slot(self.kind).running.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(cfg: SchedulerCfg) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            ingestion: JobSlot::default(),
            digest: JobSlot::default(),
            last_digest_day: Mutex::new(None),
        })
    }

    fn slot(&self, kind: JobKind) -> &JobSlot {
        match kind {
            JobKind::Ingestion => &self.ingestion,
            JobKind::Digest => &self.digest,
        }
    }

    pub fn state(&self, kind: JobKind) -> JobState {
        if self.slot(kind).running.load(Ordering::Acquire) {
            JobState::Running
        } else {
            JobState::Idle
        }
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        [JobKind::Ingestion, JobKind::Digest]
            .into_iter()
            .map(|kind| {
                let slot = self.slot(kind);
                let t = slot.times.lock().unwrap_or_else(|p| p.into_inner());
                JobStatus {
                    job: kind,
                    state: self.state(kind),
                    runs: slot.runs.load(Ordering::Relaxed),
                    last_started_at: t.last_started_at,
                    last_finished_at: t.last_finished_at,
                    last_error: t.last_error.clone(),
                }
            })
            .collect()
    }

    /// `Idle -> Running` or `JobAlreadyRunning`.
    pub fn try_begin(self: &Arc<Self>, kind: JobKind) -> Result<JobGuard> {
        self.slot(kind)
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                counter!("job_skipped_total", "job" => kind.as_str()).increment(1);
                Error::JobAlreadyRunning(kind)
            })?;
        Ok(JobGuard {
            sched: Arc::clone(self),
            kind,
        })
    }

    /// Claim `day` for the scheduled digest; `false` if it was already claimed.
    pub fn claim_scheduled_day(&self, day: NaiveDate) -> bool {
        let mut last = self.last_digest_day.lock().unwrap_or_else(|p| p.into_inner());
        if last.is_some_and(|d| d >= day) {
            return false;
        }
        *last = Some(day);
        true
    }

    async fn run_guarded(&self, guard: JobGuard, runner: &dyn JobRunner) -> Result<()> {
        let kind = guard.kind;
        let slot = self.slot(kind);
        slot.runs.fetch_add(1, Ordering::Relaxed);
        slot.times.lock().unwrap_or_else(|p| p.into_inner()).last_started_at = Some(Utc::now());
        tracing::info!(target: "scheduler", job = %kind, "job started");

        let res = runner.run_job(kind).await;

        let finished = Utc::now();
        {
            let mut t = slot.times.lock().unwrap_or_else(|p| p.into_inner());
            t.last_finished_at = Some(finished);
            t.last_error = res.as_ref().err().map(ToString::to_string);
        }
        counter!("job_runs_total", "job" => kind.as_str()).increment(1);
        gauge!("job_last_run_ts", "job" => kind.as_str()).set(finished.timestamp() as f64);
        match &res {
            Ok(()) => tracing::info!(target: "scheduler", job = %kind, "job finished"),
            Err(e) => {
                counter!("job_failures_total", "job" => kind.as_str()).increment(1);
                tracing::error!(target: "scheduler", job = %kind, fatal = e.is_job_fatal(), error = %e, "job failed");
            }
        }
        drop(guard);
        res
    }

    /// Run `kind` to completion on the caller's task.
    pub async fn run_now(self: &Arc<Self>, runner: &dyn JobRunner, kind: JobKind) -> Result<()> {
        let guard = self.try_begin(kind)?;
        self.run_guarded(guard, runner).await
    }

    /// Start `kind` in the background and return immediately.
    pub fn trigger(self: &Arc<Self>, runner: Arc<dyn JobRunner>, kind: JobKind) -> TriggerAck {
        let guard = match self.try_begin(kind) {
            Ok(g) => g,
            Err(_) => {
                tracing::info!(target: "scheduler", job = %kind, "trigger ignored, job already running");
                return TriggerAck::AlreadyRunning;
            }
        };
        let sched = Arc::clone(self);
        tokio::spawn(async move {
            let _ = sched.run_guarded(guard, runner.as_ref()).await;
        });
        TriggerAck::Accepted
    }

    /// Spawn the ingestion interval loop and the daily digest loop.
    pub fn spawn(self: &Arc<Self>, runner: Arc<dyn JobRunner>) -> Vec<JoinHandle<()>> {
        let ingest = {
            let sched = Arc::clone(self);
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sched.cfg.ingest_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if let Err(Error::JobAlreadyRunning(_)) =
                        sched.run_now(runner.as_ref(), JobKind::Ingestion).await
                    {
                        tracing::debug!(target: "scheduler", "ingestion tick skipped");
                    }
                }
            })
        };

        let digest = {
            let sched = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let now = Utc::now();
                    let next = next_daily_run(now, sched.cfg.digest_time);
                    tracing::info!(target: "scheduler", next = %next, "next digest run");
                    tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;
                    sched.run_scheduled_digest(runner.as_ref(), next.date_naive()).await;
                }
            })
        };

        vec![ingest, digest]
    }

    /// Scheduled digest path: at most one run per calendar day.
    pub async fn run_scheduled_digest(self: &Arc<Self>, runner: &dyn JobRunner, day: NaiveDate) -> bool {
        let guard = match self.try_begin(JobKind::Digest) {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(target: "scheduler", error = %e, "scheduled digest skipped");
                return false;
            }
        };
        if !self.claim_scheduled_day(day) {
            tracing::info!(target: "scheduler", %day, "digest already sent for day");
            return false;
        }
        let _ = self.run_guarded(guard, runner).await;
        true
    }
}

/// Next instant at `at` (UTC) strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        now.date_naive()
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(at).and_utc())
            .unwrap_or(today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_is_today_or_tomorrow() {
        let at = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 3, 1, 7, 59, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(
            next_daily_run(early, at),
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
        );
        assert_eq!(
            next_daily_run(late, at),
            Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn second_begin_fails_until_guard_drops() {
        let s = Scheduler::new(SchedulerCfg {
            ingest_interval: Duration::from_secs(60),
            digest_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        });
        let g = s.try_begin(JobKind::Ingestion).unwrap();
        assert_eq!(s.state(JobKind::Ingestion), JobState::Running);
        assert!(matches!(
            s.try_begin(JobKind::Ingestion),
            Err(Error::JobAlreadyRunning(JobKind::Ingestion))
        ));
        assert!(s.try_begin(JobKind::Digest).is_ok());
        drop(g);
        assert_eq!(s.state(JobKind::Ingestion), JobState::Idle);
    }
}
