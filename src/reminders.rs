//! Reminder scheduler.
//!
//! Two cron-driven loops run beside the dispatcher:
//! - a **minute ticker** that sends a fresh workout to every subscriber whose
//!   reminder time matches and whose next workout is due
//! - a **daily sweep** that marks stale pending workouts as missed

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bot::replies;
use crate::channels::ChannelManager;
use crate::coaching::Coach;
use crate::config::ReminderConfig;
use crate::error::{CoachError, ConfigError};
use crate::store::Database;

pub struct ReminderService {
    config: ReminderConfig,
    db: Arc<dyn Database>,
    coach: Arc<Coach>,
    channels: Arc<ChannelManager>,
}

impl ReminderService {
    pub fn new(
        config: ReminderConfig,
        db: Arc<dyn Database>,
        coach: Arc<Coach>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            config,
            db,
            coach,
            channels,
        }
    }

    /// Send reminders for the minute of `fired_at`, read in the configured
    /// offset. Returns how many users were reached. Per-user failures are
    /// logged and skipped.
    pub async fn send_due(&self, fired_at: DateTime<Utc>) -> Result<usize, CoachError> {
        let hhmm = fired_at
            .with_timezone(&self.config.utc_offset)
            .format("%H:%M")
            .to_string();
        let due = self
            .db
            .list_users_due_for_reminder(&hhmm, Utc::now())
            .await?;
        if due.is_empty() {
            return Ok(0);
        }
        tracing::debug!(count = due.len(), time = %hhmm, "Reminders due");

        let mut sent = 0;
        for user_id in due {
            let generated = match self.coach.request_training(&user_id).await {
                Ok(g) => g,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, "Reminder workout not generated: {e}");
                    continue;
                }
            };
            match self
                .channels
                .notify(&user_id, replies::reminder(&generated.content))
                .await
            {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!(user_id = %user_id, "Reminder not delivered: {e}"),
            }
        }
        Ok(sent)
    }

    pub async fn sweep_missed(&self) -> Result<usize, CoachError> {
        self.coach.sweep_missed(self.config.staleness_window).await
    }
}

fn parse_schedule(key: &str, expr: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("invalid cron: {e}"),
    })
}

/// Sleep until each upcoming fire time of `schedule` and run `job` with it.
fn spawn_cron_loop<F, Fut>(
    name: &'static str,
    schedule: cron::Schedule,
    job: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!(task = name, "Schedule has no upcoming fire time, stopping");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            job(next).await;
        }
    })
}

/// Spawn the minute ticker and the daily sweep. Returns no handles when
/// reminders are disabled.
pub fn spawn_scheduler(
    service: Arc<ReminderService>,
) -> Result<Vec<tokio::task::JoinHandle<()>>, ConfigError> {
    if !service.config.enabled {
        tracing::info!("Reminders disabled");
        return Ok(Vec::new());
    }

    let tick = parse_schedule("REMINDER_TICK_SCHEDULE", &service.config.tick_schedule)?;
    let sweep = parse_schedule("MISSED_SWEEP_SCHEDULE", &service.config.missed_sweep_schedule)?;

    let ticker = {
        let service = service.clone();
        spawn_cron_loop("reminder-ticker", tick, move |fired_at| {
            let service = service.clone();
            async move {
                match service.send_due(fired_at).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(count = n, "Reminders sent"),
                    Err(e) => tracing::error!("Reminder tick failed: {e}"),
                }
            }
        })
    };

    let sweeper = spawn_cron_loop("missed-sweep", sweep, move |_| {
        let service = service.clone();
        async move {
            if let Err(e) = service.sweep_missed().await {
                tracing::error!("Missed-workout sweep failed: {e}");
            }
        }
    });

    tracing::info!("Reminder scheduler started");
    Ok(vec![ticker, sweeper])
}
