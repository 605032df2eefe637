//! Random-instant-per-cycle scheduler.
//!
//! Two timers are live per scheduler: `{prefix}:cycle_refresh`, which fires at
//! every cycle boundary, and `{prefix}:once:{epoch}`, the single task fire of
//! the cycle ending at `epoch`. Arming an id that is already armed replaces the
//! previous timer, so re-running the refresh for the same boundary never
//! produces a second fire.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use rand::Rng;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::{Clock, SchedulerError, SystemClock};

/// The task fired once per cycle.
pub type ScheduledTask =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// Synchronous hook run at every cycle boundary, before the next fire is armed.
pub type RefreshHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Construction options for [`RandomScheduler`].
pub struct SchedulerOptions {
    /// Prefix of every job id; distinguishes coexisting schedulers.
    pub job_prefix: String,
    /// Cycle expression. Five-field crontab or the six/seven-field form with seconds.
    pub cron_expr: String,
    /// IANA timezone the cycle expression is evaluated in.
    pub timezone: String,
    pub on_refresh: Option<RefreshHook>,
    pub clock: Arc<dyn Clock>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            job_prefix: "DailyRandomTask".to_string(),
            cron_expr: "0 0 * * *".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            on_refresh: None,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Parse a cycle expression.
///
/// A classic five-field crontab line gets a leading `0` seconds field.
pub fn parse_cycle(expr: &str) -> Result<Schedule, SchedulerError> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Uniform offset in `[0, range_secs]`.
pub fn random_offset<R: Rng + ?Sized>(range_secs: u64, rng: &mut R) -> u64 {
    rng.gen_range(0..=range_secs)
}

struct ArmedJob {
    generation: u64,
    handle: AbortHandle,
}

struct Inner {
    job_prefix: String,
    cron_expr: String,
    schedule: Schedule,
    timezone: Tz,
    task: ScheduledTask,
    on_refresh: Option<RefreshHook>,
    clock: Arc<dyn Clock>,
    jobs: Mutex<HashMap<String, ArmedJob>>,
    generation: AtomicU64,
    stopped: AtomicBool,
}

/// Runs a task once per cycle at a random instant. See the module docs.
///
/// Dropping the scheduler shuts it down.
pub struct RandomScheduler {
    inner: Arc<Inner>,
}

impl RandomScheduler {
    /// Validate the options and arm the first cycle.
    ///
    /// Must be called from within a Tokio runtime. Nothing is armed when the
    /// cycle expression or timezone is invalid.
    pub fn start(
        task: ScheduledTask,
        options: SchedulerOptions,
    ) -> Result<Self, SchedulerError> {
        let schedule = parse_cycle(&options.cron_expr)?;
        let timezone = options
            .timezone
            .parse::<Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(options.timezone.clone()))?;

        let inner = Arc::new(Inner {
            job_prefix: options.job_prefix,
            cron_expr: options.cron_expr,
            schedule,
            timezone,
            task,
            on_refresh: options.on_refresh,
            clock: options.clock,
            jobs: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        });

        info!(
            job_prefix = %inner.job_prefix,
            cron = %inner.cron_expr,
            timezone = %inner.timezone,
            "Random scheduler started"
        );
        inner.refresh_cycle();

        Ok(Self { inner })
    }

    pub fn job_prefix(&self) -> &str {
        &self.inner.job_prefix
    }

    /// Ids of the currently armed timers, sorted.
    pub fn pending_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock_jobs().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Cancel every pending timer. A task that already started keeps running.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.inner.stop() {
            info!(job_prefix = %self.inner.job_prefix, "Random scheduler stopped");
        }
    }
}

impl Drop for RandomScheduler {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl Inner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, ArmedJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns `true` if this call performed the transition to stopped.
    fn stop(&self) -> bool {
        let mut jobs = self.lock_jobs();
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
        true
    }

    fn refresh_id(&self) -> String {
        format!("{}:cycle_refresh", self.job_prefix)
    }

    fn once_id(&self, period_id: i64) -> String {
        format!("{}:once:{period_id}", self.job_prefix)
    }

    fn refresh_cycle(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let now = self.clock.now();
        let Some(next_refresh) = self
            .schedule
            .after(&now.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
        else {
            warn!(
                job_prefix = %self.job_prefix,
                cron = %self.cron_expr,
                "Cycle expression has no upcoming boundary, scheduler idle"
            );
            return;
        };

        let seconds_range = (next_refresh - now).num_seconds();
        if seconds_range <= 0 {
            warn!(
                job_prefix = %self.job_prefix,
                boundary = %next_refresh,
                "Cycle already over, skipping task for this boundary"
            );
            self.arm_refresh(next_refresh);
            return;
        }

        if let Some(hook) = &self.on_refresh {
            self.run_refresh_hook(hook);
        }

        let offset = random_offset(seconds_range.unsigned_abs(), &mut rand::thread_rng());
        let run_at = now + chrono::Duration::seconds(offset as i64);
        info!(
            job_prefix = %self.job_prefix,
            run_at = %run_at.with_timezone(&self.timezone),
            "Task time for this cycle randomized"
        );

        let inner = Arc::clone(self);
        self.arm(
            self.once_id(next_refresh.timestamp()),
            run_at,
            move || inner.run_task_safe(),
        );

        self.arm_refresh(next_refresh);
    }

    fn arm_refresh(self: &Arc<Self>, at: DateTime<Utc>) {
        let inner = Arc::clone(self);
        self.arm(self.refresh_id(), at, move || async move {
            inner.refresh_cycle();
        });
        debug!(
            job_prefix = %self.job_prefix,
            cron = %self.cron_expr,
            at = %at,
            "Cycle refresh armed"
        );
    }

    fn run_refresh_hook(&self, hook: &RefreshHook) {
        match std::panic::catch_unwind(AssertUnwindSafe(|| hook())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(job_prefix = %self.job_prefix, "on_refresh failed, ignored: {e:#}");
            }
            Err(_) => {
                error!(job_prefix = %self.job_prefix, "on_refresh panicked, ignored");
            }
        }
    }

    async fn run_task_safe(self: Arc<Self>) {
        info!(job_prefix = %self.job_prefix, "Running scheduled task");
        let task = Arc::clone(&self.task);
        // Own tokio task so a panic is contained and reported as a JoinError.
        match tokio::spawn(async move { task().await }).await {
            Ok(Ok(())) => info!(job_prefix = %self.job_prefix, "Scheduled task finished"),
            Ok(Err(e)) => error!(job_prefix = %self.job_prefix, "Scheduled task failed: {e:#}"),
            Err(e) if e.is_panic() => {
                error!(job_prefix = %self.job_prefix, "Scheduled task panicked")
            }
            Err(e) => warn!(job_prefix = %self.job_prefix, "Scheduled task cancelled: {e}"),
        }
    }

    /// Arm `job` to run at `fire_at` under `id`, replacing any timer with that id.
    fn arm<F, Fut>(self: &Arc<Self>, id: String, fire_at: DateTime<Utc>, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.lock_jobs();
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let delay = (fire_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let inner = Arc::clone(self);
        let job_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.take_job(&job_id, generation) {
                job().await;
            }
        });

        if let Some(previous) = jobs.insert(
            id,
            ArmedJob {
                generation,
                handle: handle.abort_handle(),
            },
        ) {
            previous.handle.abort();
        }
    }

    /// Claim a fired timer. Fails if it was replaced or the scheduler stopped.
    fn take_job(&self, id: &str, generation: u64) -> bool {
        let mut jobs = self.lock_jobs();
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        match jobs.get(id) {
            Some(job) if job.generation == generation => {
                jobs.remove(id);
                true
            }
            _ => false,
        }
    }
}
