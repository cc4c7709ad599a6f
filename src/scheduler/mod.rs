//! Recurring free-games check
//!
//! Ties the promotion cache to the dispatcher: on every firing the current
//! snapshot is read and, when it lists games that are free right now, a
//! digest is broadcast to the whole directory.
//!
//! Firings are aligned to local wall-clock hours: minute 0 of every hour
//! divisible by the interval (the cron expression `0 */N * * *`).
//!
//! # Modules
//!
//! - [`digest`] - HTML digests of current and upcoming games
//! - [`error`] - scheduler errors

pub mod digest;
pub mod error;

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastPayload, BroadcastStats, Dispatcher, FormatDirectives, ParseMode};
use crate::catalog::PromotionCache;
use crate::config::SchedulerConfig;
use crate::directory::RecipientDirectory;
use crate::error::EpicfreeErrorTrait;

pub use digest::{current_games_digest, upcoming_games_digest};
pub use error::{SchedulerError, SchedulerResult};

/// Valid check intervals in hours
pub const INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 1..=24;

/// Default check interval in hours
pub const DEFAULT_INTERVAL_HOURS: u32 = 6;

/// Result of one check
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Catalog unreachable and nothing cached
    Degraded,
    /// Snapshot has no current games
    NoCurrentGames,
    /// Digest was broadcast
    Broadcast { stats: BroadcastStats },
    /// Broadcast could not run
    BroadcastFailed { reason: String },
}

/// Record of the most recent check
#[derive(Debug, Clone, Serialize)]
pub struct CheckRecord {
    pub checked_at: DateTime<Utc>,
    pub outcome: CheckOutcome,
}

/// Events emitted by the scheduler
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Configured { enabled: bool, interval_hours: u32 },
    CheckCompleted(CheckRecord),
}

/// Everything a firing needs; cheap to clone into the timer task
#[derive(Clone)]
struct CheckContext {
    cache: Arc<PromotionCache>,
    dispatcher: Arc<Dispatcher>,
    directory: Arc<dyn RecipientDirectory>,
    last_check: Arc<RwLock<Option<CheckRecord>>>,
    event_sender: broadcast::Sender<SchedulerEvent>,
}

impl CheckContext {
    async fn run_check(&self) -> CheckOutcome {
        let snapshot = self.cache.get().await;

        let outcome = if snapshot.degraded {
            tracing::warn!("Skipping scheduled check, catalog is unavailable");
            CheckOutcome::Degraded
        } else if snapshot.current_games.is_empty() {
            tracing::info!("Scheduled check found no current free games");
            CheckOutcome::NoCurrentGames
        } else {
            let payload = BroadcastPayload::text(current_games_digest(&snapshot.current_games))
                .with_format(FormatDirectives {
                    parse_mode: ParseMode::Html,
                    disable_preview: false,
                });

            match self.dispatcher.broadcast(payload, self.directory.as_ref()).await {
                Ok(stats) => {
                    tracing::info!(
                        games = snapshot.current_games.len(),
                        sent = stats.sent,
                        failed = stats.failed,
                        "Scheduled digest broadcast"
                    );
                    CheckOutcome::Broadcast { stats }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        category = %e.category(),
                        recoverable = e.is_recoverable(),
                        "Scheduled broadcast failed"
                    );
                    CheckOutcome::BroadcastFailed {
                        reason: e.to_string(),
                    }
                }
            }
        };

        let record = CheckRecord {
            checked_at: Utc::now(),
            outcome: outcome.clone(),
        };
        *self.last_check.write().await = Some(record.clone());
        let _ = self.event_sender.send(SchedulerEvent::CheckCompleted(record));

        outcome
    }
}

#[derive(Default)]
struct TimerState {
    enabled: bool,
    interval_hours: u32,
    handle: Option<JoinHandle<()>>,
}

/// Hour-aligned recurring check
pub struct CheckScheduler {
    context: CheckContext,
    state: Mutex<TimerState>,
}

impl CheckScheduler {
    /// Create a disabled scheduler
    pub fn new(
        cache: Arc<PromotionCache>,
        dispatcher: Arc<Dispatcher>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(100);

        Self {
            context: CheckContext {
                cache,
                dispatcher,
                directory,
                last_check: Arc::new(RwLock::new(None)),
                event_sender,
            },
            state: Mutex::new(TimerState {
                enabled: false,
                interval_hours: DEFAULT_INTERVAL_HOURS,
                handle: None,
            }),
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.context.event_sender.subscribe()
    }

    /// Apply the scheduler section of the configuration
    pub async fn apply_config(&self, config: &SchedulerConfig) -> SchedulerResult<()> {
        self.configure(config.enabled, config.interval_hours).await
    }

    /// Enable or disable the recurring check
    ///
    /// Any previously installed timer is aborted first, so at most one timer
    /// task exists at a time. A check that already fired keeps running.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidInterval` when enabling with an
    /// interval outside 1-24 hours. The previous timer is kept in that case.
    pub async fn configure(&self, enabled: bool, interval_hours: u32) -> SchedulerResult<()> {
        if enabled && !INTERVAL_RANGE.contains(&interval_hours) {
            return Err(SchedulerError::invalid_interval(interval_hours));
        }

        let mut state = self.state.lock().await;

        if let Some(handle) = state.handle.take() {
            handle.abort();
            tracing::debug!("Aborted previous check timer");
        }

        state.enabled = enabled;
        if enabled {
            state.interval_hours = interval_hours;
            state.handle = Some(self.spawn_timer(interval_hours));
            tracing::info!(
                interval_hours,
                cron = %format!("0 */{interval_hours} * * *"),
                "Auto check enabled"
            );
        } else {
            tracing::info!("Auto check disabled");
        }

        let _ = self.context.event_sender.send(SchedulerEvent::Configured {
            enabled,
            interval_hours: state.interval_hours,
        });

        Ok(())
    }

    /// Spawn the timer loop
    ///
    /// Each firing runs as its own task, so aborting the returned handle
    /// stops future firings without cancelling a check that is mid-broadcast.
    fn spawn_timer(&self, interval_hours: u32) -> JoinHandle<()> {
        let context = self.context.clone();

        tokio::spawn(async move {
            let mut last_fire: Option<DateTime<Local>> = None;

            loop {
                // Never fire the same boundary twice, even if the sleep wakes early
                let now = Local::now();
                let base = last_fire.map_or(now, |fired| fired.max(now));
                let Some(fire) = next_fire_local(base, interval_hours) else {
                    tracing::warn!(interval_hours, "No upcoming firing found, retrying in an hour");
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    continue;
                };

                let wait = fire
                    .signed_duration_since(now)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                tracing::debug!(wait_secs = wait.as_secs(), next = %fire, "Next auto check scheduled");
                tokio::time::sleep(wait).await;
                last_fire = Some(fire);

                tracing::info!(interval_hours, "Auto check firing");
                let check = context.clone();
                tokio::spawn(async move {
                    check.run_check().await;
                });
            }
        })
    }

    /// Run one check now, outside the timer
    pub async fn run_check(&self) -> CheckOutcome {
        self.context.run_check().await
    }

    /// Stop the timer; a check already running is left to finish
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.handle.take() {
            handle.abort();
        }
        state.enabled = false;
        tracing::info!("Check scheduler shut down");
    }

    /// Get scheduler status
    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().await;
        let next_fire = state
            .enabled
            .then(|| next_fire_local(Local::now(), state.interval_hours))
            .flatten();

        SchedulerStatus {
            enabled: state.enabled,
            interval_hours: state.interval_hours,
            next_fire,
            last_check: self.context.last_check.read().await.clone(),
        }
    }
}

impl Drop for CheckScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().handle.take() {
            handle.abort();
        }
    }
}

/// Scheduler status information
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub interval_hours: u32,
    pub next_fire: Option<DateTime<Local>>,
    pub last_check: Option<CheckRecord>,
}

impl SchedulerStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Scheduler Status\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Auto Check: {}\n", if self.enabled { "on" } else { "off" }));
        output.push_str(&format!("Interval: {}h\n", self.interval_hours));

        if let Some(next) = self.next_fire {
            output.push_str(&format!("Next Check: {}\n", next.format("%Y-%m-%d %H:%M")));
        }

        if let Some(ref last) = self.last_check {
            let outcome = match &last.outcome {
                CheckOutcome::Degraded => "catalog unavailable".to_string(),
                CheckOutcome::NoCurrentGames => "no current games".to_string(),
                CheckOutcome::Broadcast { stats } => {
                    format!("sent {} of {}", stats.sent, stats.total)
                }
                CheckOutcome::BroadcastFailed { reason } => format!("failed: {reason}"),
            };
            output.push_str(&format!(
                "Last Check: {} ({outcome})\n",
                last.checked_at.to_rfc3339()
            ));
        }

        output
    }
}

/// First wall-clock time strictly after `now` with minute 0 and `hour % interval == 0`
pub fn next_fire_after(now: NaiveDateTime, interval_hours: u32) -> NaiveDateTime {
    let interval = interval_hours.max(1);
    let mut candidate = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
        + Duration::hours(1);

    // Hour 0 always matches, so this settles within a day
    while candidate.hour() % interval != 0 {
        candidate += Duration::hours(1);
    }
    candidate
}

/// Next firing as a local time, skipping wall-clock times that do not exist
fn next_fire_local(now: DateTime<Local>, interval_hours: u32) -> Option<DateTime<Local>> {
    let mut naive = now.naive_local();
    for _ in 0..48 {
        naive = next_fire_after(naive, interval_hours);
        if let Some(fire) = Local.from_local_datetime(&naive).earliest() {
            if fire > now {
                return Some(fire);
            }
        }
    }
    None
}

/// How long to sleep until the next firing
pub fn duration_until_next_fire(now: DateTime<Local>, interval_hours: u32) -> std::time::Duration {
    next_fire_local(now, interval_hours)
        .and_then(|fire| fire.signed_duration_since(now).to_std().ok())
        .unwrap_or(std::time::Duration::from_secs(3600))
}
