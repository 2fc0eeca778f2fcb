use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    currency::CurrencySet,
    error::{PipelineError, RunFailure, Stage},
    fetcher::RateSource,
    store::RateStore,
    validator::validate,
};

/// How often and how long a run may be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
    /// Bound on a single attempt; an attempt that exceeds it is abandoned.
    pub run_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_secs(30),
            run_timeout: Duration::from_secs(300),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub as_of: NaiveDate,
    pub captured_at: NaiveDateTime,
    pub rows_affected: u64,
}

/// Fetch, validate and store, in that order.
pub struct Pipeline<S, T> {
    source: S,
    store: T,
    currencies: CurrencySet,
}

impl<S: RateSource, T: RateStore> Pipeline<S, T> {
    pub fn new(source: S, store: T, currencies: CurrencySet) -> Self {
        Self {
            source,
            store,
            currencies,
        }
    }

    /// Runs the three stages once, writing under `as_of`.
    pub async fn run_once(
        &self,
        run_id: Uuid,
        as_of: NaiveDate,
        captured_at: NaiveDateTime,
        timeout: Duration,
    ) -> Result<RunReport, RunFailure> {
        let mut stage = Stage::Fetching;
        let outcome =
            tokio::time::timeout(timeout, self.execute(as_of, captured_at, &mut stage)).await;

        match outcome {
            Ok(Ok(rows_affected)) => Ok(RunReport {
                run_id,
                as_of,
                captured_at,
                rows_affected,
            }),
            Ok(Err(error)) => Err(RunFailure { stage, error }),
            Err(_) => Err(RunFailure {
                stage,
                error: PipelineError::TimedOut(timeout),
            }),
        }
    }

    async fn execute(
        &self,
        as_of: NaiveDate,
        captured_at: NaiveDateTime,
        stage: &mut Stage,
    ) -> Result<u64, PipelineError> {
        *stage = Stage::Fetching;
        let response = self.source.fetch(&self.currencies).await?;

        *stage = Stage::Validating;
        let rates = validate(&response, &self.currencies)?;

        *stage = Stage::Storing;
        self.store.ensure_schema().await?;
        self.store
            .upsert(self.currencies.base(), &rates, as_of, captured_at)
            .await
    }

    /// Runs the pipeline for one scheduled slot, retrying the whole run on failure.
    ///
    /// Every attempt takes its snapshot date and capture time from the clock when it starts.
    pub async fn run_with_retry(
        &self,
        slot: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<RunReport, RunFailure> {
        let run_id = Uuid::new_v4();
        let attempts = policy.retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let now = Utc::now();
            info!(
                "[{}] Starting run for slot {} (attempt {}/{})",
                run_id, slot, attempt, attempts
            );

            match self
                .run_once(run_id, now.date_naive(), now.naive_utc(), policy.run_timeout)
                .await
            {
                Ok(report) => {
                    info!(
                        "[{}] Stored {} rates for {}",
                        run_id, report.rows_affected, report.as_of
                    );
                    return Ok(report);
                }
                Err(failure) => {
                    if attempt >= attempts {
                        return Err(failure);
                    }
                    warn!(
                        "[{}] Attempt {}/{} failed: {}. Retrying in {:?}",
                        run_id, attempt, attempts, failure, policy.delay
                    );
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
}
