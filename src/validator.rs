use std::collections::BTreeSet;

use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde_json::Value;

use crate::{
    convert_from::ConvertFrom,
    currency::CurrencySet,
    error::ValidationError,
    exchange_rate::{ExchangeRate, ExchangeRates},
};

/// Checks a provider response against the configured currencies and normalizes it.
///
/// The checks run in a fixed order and the first one that fails decides the error:
/// base currency, quote count, per-record shape, then the set of quoted codes.
pub fn validate(
    response: &ConvertFrom,
    currencies: &CurrencySet,
) -> Result<ExchangeRates, ValidationError> {
    if response.from != currencies.base() {
        return Err(ValidationError::UnexpectedBaseCurrency {
            expected: currencies.base().to_string(),
            actual: response.from.clone(),
        });
    }

    if response.to.len() != currencies.len() {
        return Err(ValidationError::QuoteCountMismatch {
            expected: currencies.len(),
            actual: response.to.len(),
        });
    }

    let mut quotes = Vec::with_capacity(response.to.len());
    for (index, record) in response.to.iter().enumerate() {
        quotes.push(parse_quote(index, record)?);
    }

    let mut seen = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for (code, _) in &quotes {
        if !seen.insert(code.as_str()) {
            duplicated.insert(code.clone());
        }
    }
    let missing: Vec<String> = currencies
        .targets()
        .iter()
        .filter(|code| !seen.contains(code.as_str()))
        .cloned()
        .collect();
    let unexpected: Vec<String> = seen
        .iter()
        .filter(|code| !currencies.contains(code))
        .map(|code| code.to_string())
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() || !duplicated.is_empty() {
        return Err(ValidationError::QuoteSetMismatch {
            missing,
            unexpected,
            duplicated: duplicated.into_iter().collect(),
        });
    }

    Ok(quotes.into_iter().collect())
}

fn parse_quote(index: usize, record: &Value) -> Result<(String, ExchangeRate), ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedQuote {
        index,
        record: record.to_string(),
        reason,
    };

    let fields = record
        .as_object()
        .ok_or_else(|| malformed("record is not an object".to_string()))?;

    let code = match fields.get("quotecurrency") {
        Some(Value::String(code)) => code.clone(),
        Some(other) => return Err(malformed(format!("quotecurrency is not a string: {other}"))),
        None => return Err(malformed("quotecurrency is missing".to_string())),
    };

    let rate = |name: &str| -> Result<Decimal, ValidationError> {
        let value = fields
            .get(name)
            .ok_or_else(|| malformed(format!("{name} is missing")))?;
        let number = value
            .as_f64()
            .ok_or_else(|| malformed(format!("{name} is not a number: {value}")))?;
        if !number.is_finite() || number <= 0.0 {
            return Err(malformed(format!("{name} must be finite and positive, got {number}")));
        }
        match Decimal::from_f64(number) {
            Some(decimal) if decimal > Decimal::ZERO => Ok(decimal),
            _ => Err(malformed(format!("{name} has no decimal representation: {number}"))),
        }
    };

    let rate_from_base = rate("mid")?;
    let rate_to_base = rate("inverse")?;

    Ok((
        code,
        ExchangeRate {
            rate_from_base,
            rate_to_base,
        },
    ))
}
