use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Days, NaiveDate, Utc};

use crate::{
    currency::{CurrencySet, DEFAULT_BASE_CURRENCY, DEFAULT_TARGET_CURRENCIES},
    fetcher::{DEFAULT_XE_BASE_URL, XeCredentials},
    pipeline::RetryPolicy,
    scheduler::Schedule,
    store::DEFAULT_RATES_TABLE,
};

/// Upper bound on `RETRIES`; each retry is a paid provider call.
pub const MAX_RETRIES: u32 = 10;

/// Everything the service needs, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub currencies: CurrencySet,
    pub credentials: XeCredentials,
    pub provider_url: String,
    pub request_timeout: Duration,
    pub database_url: String,
    pub database_max_connections: u32,
    pub rates_table: String,
    pub schedule: Schedule,
    pub retry: RetryPolicy,
    pub backfill_start: NaiveDate,
    pub catchup: bool,
    pub run_once: bool,
    pub status_addr: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| anyhow!("{} must be set", key));

        let base = var("BASE_CURRENCY").unwrap_or_else(|| DEFAULT_BASE_CURRENCY.to_string());
        let currencies = match var("TARGET_CURRENCIES") {
            Some(list) => CurrencySet::new(
                base,
                list.split(',').map(str::trim).filter(|c| !c.is_empty()),
            ),
            None => CurrencySet::new(base, DEFAULT_TARGET_CURRENCIES),
        }
        .context("Invalid BASE_CURRENCY or TARGET_CURRENCIES")?;

        let schedule = match var("RUN_TIMES") {
            Some(times) => Schedule::parse(&times).context("Invalid RUN_TIMES")?,
            None => Schedule::default(),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            retries: at_most(
                parse_or(&var, "RETRIES", defaults.retries)?,
                "RETRIES",
                MAX_RETRIES,
            )?,
            delay: Duration::from_secs(parse_or(
                &var,
                "RETRY_DELAY_SECS",
                defaults.delay.as_secs(),
            )?),
            run_timeout: Duration::from_secs(non_zero(
                parse_or(&var, "RUN_TIMEOUT_SECS", defaults.run_timeout.as_secs())?,
                "RUN_TIMEOUT_SECS",
            )?),
        };

        let backfill_start = match var("BACKFILL_START") {
            Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d").with_context(|| {
                format!("Invalid BACKFILL_START {:?}, expected YYYY-MM-DD", date)
            })?,
            None => {
                let today = Utc::now().date_naive();
                today
                    .checked_sub_days(Days::new(1))
                    .ok_or(anyhow!("Can't get previous date for {}", today))?
            }
        };

        Ok(Self {
            currencies,
            credentials: XeCredentials {
                api_id: required("XE_API_ID")?,
                api_key: required("XE_API_KEY")?,
            },
            provider_url: var("XE_API_BASE_URL").unwrap_or_else(|| DEFAULT_XE_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(non_zero(
                parse_or(&var, "REQUEST_TIMEOUT_SECS", 30)?,
                "REQUEST_TIMEOUT_SECS",
            )?),
            database_url: required("DATABASE_URL")?,
            database_max_connections: non_zero(
                parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5)?,
                "DATABASE_MAX_CONNECTIONS",
            )?,
            rates_table: var("RATES_TABLE").unwrap_or_else(|| DEFAULT_RATES_TABLE.to_string()),
            schedule,
            retry,
            backfill_start,
            catchup: parse_or(&var, "CATCHUP", true)?,
            run_once: parse_or(&var, "RUN_ONCE", false)?,
            status_addr: var("STATUS_ADDR"),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value {:?}", key, raw)),
        None => Ok(default),
    }
}

fn non_zero<T>(value: T, key: &str) -> Result<T>
where
    T: Default + PartialEq,
{
    if value == T::default() {
        bail!("{} must be greater than zero", key);
    }
    Ok(value)
}

fn at_most(value: u32, key: &str, max: u32) -> Result<u32> {
    if value > max {
        bail!("{} must be at most {}, got {}", key, max, value);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("XE_API_ID", "account"),
        ("XE_API_KEY", "secret"),
        ("DATABASE_URL", "postgres://localhost/rates"),
    ];

    fn with_required(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        REQUIRED.iter().chain(extra.iter()).copied().collect()
    }

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();

        assert_eq!(config.currencies, CurrencySet::default());
        assert_eq!(config.credentials.api_id, "account");
        assert_eq!(config.credentials.api_key, "secret");
        assert_eq!(config.provider_url, DEFAULT_XE_BASE_URL);
        assert_eq!(config.rates_table, DEFAULT_RATES_TABLE);
        assert_eq!(config.schedule, Schedule::default());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(
            config.backfill_start,
            Utc::now().date_naive().pred_opt().unwrap()
        );
        assert!(config.catchup);
        assert!(!config.run_once);
        assert!(config.status_addr.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&with_required(&[
            ("BASE_CURRENCY", "EUR"),
            ("TARGET_CURRENCIES", "NGN, KES"),
            ("RUN_TIMES", "06:30"),
            ("RETRIES", "4"),
            ("RETRY_DELAY_SECS", "5"),
            ("RUN_TIMEOUT_SECS", "60"),
            ("BACKFILL_START", "2024-01-01"),
            ("CATCHUP", "false"),
            ("RUN_ONCE", "true"),
            ("STATUS_ADDR", "127.0.0.1:8080"),
            ("RATES_TABLE", "fx_rates"),
        ]))
        .unwrap();

        assert_eq!(config.currencies.base(), "EUR");
        assert_eq!(config.currencies.targets(), ["NGN", "KES"]);
        assert_eq!(config.schedule.times().len(), 1);
        assert_eq!(config.retry.retries, 4);
        assert_eq!(config.retry.delay, Duration::from_secs(5));
        assert_eq!(config.retry.run_timeout, Duration::from_secs(60));
        assert_eq!(
            config.backfill_start,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(!config.catchup);
        assert!(config.run_once);
        assert_eq!(config.status_addr.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(config.rates_table, "fx_rates");
    }

    #[test]
    fn test_missing_credentials() {
        let err = load(&[("DATABASE_URL", "postgres://localhost/rates")]).unwrap_err();
        assert!(err.to_string().contains("XE_API_ID"));
    }

    #[test]
    fn test_retries_are_bounded() {
        let config = load(&with_required(&[("RETRIES", "10")])).unwrap();
        assert_eq!(config.retry.retries, MAX_RETRIES);

        let err = load(&with_required(&[("RETRIES", "4294967295")])).unwrap_err();
        assert!(err.to_string().contains("RETRIES"));
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        for key in [
            "RUN_TIMEOUT_SECS",
            "REQUEST_TIMEOUT_SECS",
            "DATABASE_MAX_CONNECTIONS",
        ] {
            let err = load(&with_required(&[(key, "0")])).unwrap_err();
            assert!(err.to_string().contains(key), "error for {key} was {err:#}");
        }
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        for (key, value) in [
            ("RETRIES", "two"),
            ("RETRY_DELAY_SECS", "-1"),
            ("BACKFILL_START", "01/01/2024"),
            ("CATCHUP", "yes"),
            ("RUN_TIMES", "noon"),
            ("TARGET_CURRENCIES", "NGN,NGN"),
        ] {
            let err = load(&with_required(&[(key, value)])).unwrap_err();
            assert!(
                format!("{err:#}").contains(key),
                "error for {key} was {err:#}"
            );
        }
    }
}
