use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};

use crate::{convert_from::ConvertFrom, currency::CurrencySet, error::PipelineError};

pub const DEFAULT_XE_BASE_URL: &str = "https://xecdapi.xe.com";

/// Something that can quote the configured currencies against the base currency.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self, currencies: &CurrencySet) -> Result<ConvertFrom, PipelineError>;
}

/// Account credentials for the XE currency data API.
#[derive(Clone)]
pub struct XeCredentials {
    pub api_id: String,
    pub api_key: String,
}

impl std::fmt::Debug for XeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XeCredentials")
            .field("api_id", &self.api_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

pub struct XeClient {
    client: Client,
    endpoint: Url,
    credentials: XeCredentials,
}

impl XeClient {
    pub fn new(base_url: &str, credentials: XeCredentials, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&format!("{}/v1/convert_from", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid rate provider URL: {}", base_url))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Can't build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }

    fn url(&self, currencies: &CurrencySet) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("from", currencies.base())
            .append_pair("to", &currencies.targets().join(","))
            .append_pair("amount", "1")
            .append_pair("inverse", "true");
        url
    }
}

#[async_trait]
impl RateSource for XeClient {
    async fn fetch(&self, currencies: &CurrencySet) -> Result<ConvertFrom, PipelineError> {
        let url = self.url(currencies);
        debug!("Requesting rates from {}", url);

        let resp = self
            .client
            .get(url)
            .basic_auth(&self.credentials.api_id, Some(&self.credentials.api_key))
            .send()
            .await
            .map_err(PipelineError::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(PipelineError::Transport)?;

        if !status.is_success() {
            return Err(PipelineError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|source| PipelineError::UndecodableResponse { body, source })
    }
}
