use std::collections::HashSet;

use anyhow::{Result, bail};

pub const DEFAULT_BASE_CURRENCY: &str = "USD";
pub const DEFAULT_TARGET_CURRENCIES: [&str; 7] = ["NGN", "GHS", "KES", "UGX", "MAD", "XOF", "EGP"];

/// The base currency and the fixed list of currencies quoted against it.
///
/// Built once at startup; the pipeline only ever borrows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencySet {
    base: String,
    targets: Vec<String>,
}

impl CurrencySet {
    pub fn new<B, I, T>(base: B, targets: I) -> Result<Self>
    where
        B: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let base = base.into();
        check_code(&base)?;

        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            bail!("At least one target currency is required");
        }

        let mut seen = HashSet::new();
        for code in &targets {
            check_code(code)?;
            if code == &base {
                bail!("Base currency {} can't also be a target currency", base);
            }
            if !seen.insert(code.as_str()) {
                bail!("Target currency {} is listed more than once", code);
            }
        }

        Ok(Self { base, targets })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.targets.iter().any(|t| t == code)
    }
}

impl Default for CurrencySet {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_CURRENCY.to_string(),
            targets: DEFAULT_TARGET_CURRENCIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

fn check_code(code: &str) -> Result<()> {
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        bail!("Invalid currency code {:?}: expected three uppercase letters", code);
    }
    Ok(())
}
