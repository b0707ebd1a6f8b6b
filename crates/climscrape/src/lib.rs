pub mod crawl;
pub mod parser;
#[cfg(feature = "plotting")]
pub mod plot;
pub mod scraper;
pub mod store;
pub mod types;

pub use crate::crawl::{CrawlError, CrawlOutcome, CrawlReport, Crawler};
pub use crate::scraper::{MonthFetcher, ScraperConfig, WebScraper};
pub use crate::store::{SqliteStore, WeatherStore};

pub(crate) const BASE_URL: &str = "https://climate.weather.gc.ca";
pub(crate) const DEFAULT_STATION_ID: u32 = 27174;
/// First year the climate service will serve daily reports for.
pub(crate) const EARLIEST_YEAR: i32 = 1840;
