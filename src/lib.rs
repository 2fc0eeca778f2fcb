//! Daily FX rate snapshots: fetch quotes from the XE currency data API, validate them and
//! upsert one row per currency per day into Postgres.

pub mod config;
pub mod convert_from;
pub mod currency;
pub mod error;
pub mod exchange_rate;
pub mod fetcher;
pub mod pipeline;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod validator;
