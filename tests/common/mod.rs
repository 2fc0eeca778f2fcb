#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use xe_rates::{
    convert_from::ConvertFrom,
    currency::CurrencySet,
    error::PipelineError,
    exchange_rate::{ExchangeRates, StoredRate},
    fetcher::RateSource,
    store::RateStore,
};

pub const QUOTES: [(&str, f64, f64); 7] = [
    ("NGN", 1530.2, 0.00065),
    ("GHS", 15.6, 0.064),
    ("KES", 129.1, 0.0077),
    ("UGX", 3780.5, 0.00026),
    ("MAD", 9.9, 0.101),
    ("XOF", 605.3, 0.00165),
    ("EGP", 48.2, 0.0207),
];

pub fn response_with(quotes: &[(&str, f64, f64)]) -> ConvertFrom {
    let body = json!({
        "from": "USD",
        "amount": 1.0,
        "timestamp": "2024-01-01T01:00:00Z",
        "to": quotes
            .iter()
            .map(|(code, mid, inverse)| {
                json!({ "quotecurrency": code, "mid": mid, "inverse": inverse })
            })
            .collect::<Vec<_>>(),
    });
    serde_json::from_value(body).unwrap()
}

pub fn full_response() -> ConvertFrom {
    response_with(&QUOTES)
}

#[derive(Clone)]
pub enum Outcome {
    Respond(Vec<(&'static str, f64, f64)>),
    Fail(u16),
    Hang,
}

/// Replays scripted outcomes; the last one repeats once the script runs out.
#[derive(Clone)]
pub struct StubSource {
    script: Arc<Vec<Outcome>>,
    calls: Arc<AtomicUsize>,
}

impl StubSource {
    pub fn script(script: Vec<Outcome>) -> Self {
        assert!(!script.is_empty());
        Self {
            script: Arc::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(outcome: Outcome) -> Self {
        Self::script(vec![outcome])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for StubSource {
    async fn fetch(&self, currencies: &CurrencySet) -> Result<ConvertFrom, PipelineError> {
        assert_eq!(currencies.base(), "USD");
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script[call.min(self.script.len() - 1)].clone();
        match outcome {
            Outcome::Respond(quotes) => Ok(response_with(&quotes)),
            Outcome::Fail(status) => Err(PipelineError::Provider {
                status,
                body: "unavailable".to_string(),
            }),
            Outcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
        }
    }
}

#[derive(Default)]
struct Table {
    rows: BTreeMap<(NaiveDate, String), StoredRate>,
    next_id: i32,
    upserts: usize,
}

/// Keeps rows keyed by (date_key, currency_to), like the unique constraint in Postgres.
#[derive(Clone, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
    failing: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn rows(&self) -> Vec<StoredRate> {
        self.table.lock().unwrap().rows.values().cloned().collect()
    }

    pub fn rows_for(&self, date: NaiveDate) -> Vec<StoredRate> {
        self.rows()
            .into_iter()
            .filter(|row| row.date_key == date)
            .collect()
    }

    pub fn upserts(&self) -> usize {
        self.table.lock().unwrap().upserts
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn upsert(
        &self,
        base: &str,
        rates: &ExchangeRates,
        as_of: NaiveDate,
        captured_at: NaiveDateTime,
    ) -> Result<u64, PipelineError> {
        if *self.failing.lock().unwrap() {
            return Err(PipelineError::Storage(sqlx::Error::PoolTimedOut));
        }

        let mut table = self.table.lock().unwrap();
        table.upserts += 1;
        for (code, rate) in rates {
            let key = (as_of, code.clone());
            if let Some(row) = table.rows.get_mut(&key) {
                row.captured_at = captured_at;
                row.usd_to_currency_rate = rate.rate_from_base;
                row.currency_to_usd_rate = rate.rate_to_base;
            } else {
                table.next_id += 1;
                let id = table.next_id;
                table.rows.insert(
                    key,
                    StoredRate {
                        id,
                        date_key: as_of,
                        captured_at,
                        currency_from: base.to_string(),
                        currency_to: code.clone(),
                        usd_to_currency_rate: rate.rate_from_base,
                        currency_to_usd_rate: rate.rate_to_base,
                    },
                );
            }
        }
        Ok(rates.len() as u64)
    }
}
