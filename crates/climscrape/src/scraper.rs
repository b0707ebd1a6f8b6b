use crate::types::YearMonth;

use reqwest::Client;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Empty response for {0}")]
    EmptyResponse(YearMonth),
}

/// Resolves a month to the raw markup of its daily-data page.
pub trait MonthFetcher {
    fn fetch_month(
        &self,
        period: YearMonth,
    ) -> impl Future<Output = Result<String, ScraperError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScraperConfig {
    pub base_url: String,
    pub station_id: u32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: crate::BASE_URL.to_string(),
            station_id: crate::DEFAULT_STATION_ID,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    config: ScraperConfig,
}

impl WebScraper {
    pub fn new() -> Result<Self, ScraperError> {
        Self::with_config(ScraperConfig::default())
    }

    pub fn with_config(config: ScraperConfig) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn month_url(&self, period: YearMonth) -> String {
        format!(
            "{}/climate_data/daily_data_e.html?StationID={}&timeframe=2&StartYear={}&EndYear={}&Day=1&Year={}&Month={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.station_id,
            crate::EARLIEST_YEAR,
            YearMonth::current().year(),
            period.year(),
            period.month()
        )
    }

    async fn get_html(&self, url: &str) -> Result<String, ScraperError> {
        Ok(self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }
}

impl MonthFetcher for WebScraper {
    async fn fetch_month(&self, period: YearMonth) -> Result<String, ScraperError> {
        let url = self.month_url(period);
        log::debug!("Fetching {}: {}", period, url);

        let html = self.get_html(&url).await?;
        if html.trim().is_empty() {
            return Err(ScraperError::EmptyResponse(period));
        }

        Ok(html)
    }
}
