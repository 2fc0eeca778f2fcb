use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// Validated rates for one target currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRate {
    /// One unit of base currency expressed in the target currency (provider `mid`).
    pub rate_from_base: Decimal,
    /// One unit of target currency expressed in the base currency (provider `inverse`).
    pub rate_to_base: Decimal,
}

/// Target currency code -> rates, covering exactly the configured currency set.
pub type ExchangeRates = BTreeMap<String, ExchangeRate>;

/// A row of the rates table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredRate {
    pub id: i32,
    pub date_key: NaiveDate,
    #[sqlx(rename = "timestamp")]
    pub captured_at: NaiveDateTime,
    pub currency_from: String,
    pub currency_to: String,
    pub usd_to_currency_rate: Decimal,
    pub currency_to_usd_rate: Decimal,
}
