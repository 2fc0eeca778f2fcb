use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::PipelineError,
    exchange_rate::{ExchangeRates, StoredRate},
};

pub const DEFAULT_RATES_TABLE: &str = "xe_currency_exchanges_rates";

/// Durable home of the daily rate snapshot.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Creates the destination table if it doesn't exist yet.
    async fn ensure_schema(&self) -> Result<(), PipelineError>;

    /// Writes one row per currency for `as_of`, replacing rows already stored for that day.
    ///
    /// Either every currency is written or none is. Returns the number of rows affected.
    async fn upsert(
        &self,
        base: &str,
        rates: &ExchangeRates,
        as_of: NaiveDate,
        captured_at: NaiveDateTime,
    ) -> Result<u64, PipelineError>;
}

pub struct PgRateStore {
    pool: PgPool,
    table: String,
}

impl PgRateStore {
    pub fn new(pool: PgPool, table: &str) -> Result<Self> {
        if table.is_empty()
            || table.starts_with(|c: char| c.is_ascii_digit())
            || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!("Invalid rates table name: {:?}", table);
        }

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows stored for one day, ordered by target currency.
    pub async fn rates_for_date(&self, date: NaiveDate) -> Result<Vec<StoredRate>, PipelineError> {
        let rows = sqlx::query_as::<_, StoredRate>(&format!(
            r#"SELECT id, date_key, "timestamp", currency_from, currency_to,
                      usd_to_currency_rate, currency_to_usd_rate
               FROM {}
               WHERE date_key = $1
               ORDER BY currency_to"#,
            self.table
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn ensure_schema(&self) -> Result<(), PipelineError> {
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id serial PRIMARY KEY,
                date_key date NOT NULL DEFAULT CURRENT_DATE,
                "timestamp" timestamp NOT NULL DEFAULT NOW(),
                currency_from VARCHAR(10) NOT NULL,
                usd_to_currency_rate numeric NOT NULL,
                currency_to_usd_rate numeric NOT NULL,
                currency_to VARCHAR(10) NOT NULL,
                CONSTRAINT {table}_unique_date_currency_to UNIQUE (date_key, currency_to)
            )"#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(
        &self,
        base: &str,
        rates: &ExchangeRates,
        as_of: NaiveDate,
        captured_at: NaiveDateTime,
    ) -> Result<u64, PipelineError> {
        if rates.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"INSERT INTO {} (date_key, "timestamp", currency_from,
                usd_to_currency_rate, currency_to_usd_rate, currency_to) "#,
            self.table
        ));
        builder.push_values(rates, |mut row, (code, rate)| {
            row.push_bind(as_of)
                .push_bind(captured_at)
                .push_bind(base)
                .push_bind(rate.rate_from_base)
                .push_bind(rate.rate_to_base)
                .push_bind(code.as_str());
        });
        builder.push(
            r#" ON CONFLICT (date_key, currency_to) DO UPDATE SET
                "timestamp" = EXCLUDED."timestamp",
                usd_to_currency_rate = EXCLUDED.usd_to_currency_rate,
                currency_to_usd_rate = EXCLUDED.currency_to_usd_rate"#,
        );

        let mut tx = self.pool.begin().await?;
        let affected = builder.build().execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;

        debug!("Upserted {} rows into {} for {}", affected, self.table, as_of);
        Ok(affected)
    }
}
