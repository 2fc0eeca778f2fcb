use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use log::{error, info};

use crate::{
    fetcher::RateSource,
    pipeline::{Pipeline, RetryPolicy},
    status::StatusBoard,
    store::RateStore,
};

/// Fixed times of day (UTC) at which a run is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    times: Vec<NaiveTime>,
}

impl Schedule {
    pub fn new(mut times: Vec<NaiveTime>) -> Result<Self> {
        if times.is_empty() {
            bail!("Schedule needs at least one run time");
        }
        times.sort();
        times.dedup();
        Ok(Self { times })
    }

    /// Parses `HH:MM` entries separated by commas.
    pub fn parse(times: &str) -> Result<Self> {
        let times = times
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                NaiveTime::parse_from_str(s, "%H:%M")
                    .with_context(|| format!("Invalid run time {:?}, expected HH:MM", s))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(times)
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    /// The first slot strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut day = after.date_naive();
        loop {
            for time in &self.times {
                let slot = day.and_time(*time).and_utc();
                if slot > after {
                    return slot;
                }
            }
            day = match day.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => return after,
            };
        }
    }

    /// How long to wait for `slot`; zero once it is due.
    pub fn wait_until(slot: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (slot - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Every slot from midnight of `start` up to, but not including, `end`.
    pub fn slots_between(&self, start: NaiveDate, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut slots = Vec::new();
        let mut day = start;
        while day <= end.date_naive() {
            for time in &self.times {
                let slot = day.and_time(*time).and_utc();
                if slot < end {
                    slots.push(slot);
                }
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        slots
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            times: vec![
                NaiveTime::from_hms_opt(1, 0, 0).unwrap_or_default(),
                NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
            ],
        }
    }
}

/// Drives a pipeline on its schedule and records every outcome on the status board.
pub struct Scheduler<S, T> {
    pipeline: Pipeline<S, T>,
    schedule: Schedule,
    policy: RetryPolicy,
    board: Arc<StatusBoard>,
}

impl<S: RateSource, T: RateStore> Scheduler<S, T> {
    pub fn new(
        pipeline: Pipeline<S, T>,
        schedule: Schedule,
        policy: RetryPolicy,
        board: Arc<StatusBoard>,
    ) -> Self {
        Self {
            pipeline,
            schedule,
            policy,
            board,
        }
    }

    /// Runs one slot with retries. Returns whether it succeeded.
    pub async fn run_slot(&self, slot: DateTime<Utc>) -> bool {
        match self.pipeline.run_with_retry(slot, &self.policy).await {
            Ok(report) => {
                self.board.record_success(slot, report).await;
                true
            }
            Err(failure) => {
                error!("Run for slot {} failed after all attempts: {}", slot, failure);
                self.board.record_failure(slot, &failure).await;
                false
            }
        }
    }

    /// Catches up the slots missed between `backfill_start` and `until`.
    ///
    /// The provider only quotes current rates, so every missed slot would write the same
    /// snapshot; they collapse into a single run for the latest one. Returns `None` when
    /// nothing was missed, otherwise whether that run succeeded.
    pub async fn catch_up(
        &self,
        backfill_start: NaiveDate,
        until: DateTime<Utc>,
    ) -> Option<bool> {
        let slots = self.schedule.slots_between(backfill_start, until);
        let latest = *slots.last()?;

        info!(
            "Catching up {} missed runs since {} with one run for {}",
            slots.len(),
            backfill_start,
            latest
        );
        Some(self.run_slot(latest).await)
    }

    /// Runs every slot after `from` in turn. Never returns under normal operation.
    ///
    /// Slots that came due while an earlier run was still busy run immediately.
    pub async fn run_forever(&self, from: DateTime<Utc>) -> Result<()> {
        let mut cursor = from;
        loop {
            let next = self.schedule.next_after(cursor);
            if next <= cursor {
                bail!("No run time after {}", cursor);
            }

            let wait = Schedule::wait_until(next, Utc::now());
            if wait.is_zero() {
                info!("Run for {} is overdue, starting now", next);
            } else {
                info!("Next run at {}", next);
                tokio::time::sleep(wait).await;
            }
            self.run_slot(next).await;
            cursor = next;
        }
    }
}
