//! Month-by-month crawling policy.
//!
//! Both crawl modes walk backwards from a start month one page at a time. A
//! full backfill stops once the source starts repeating its earliest page; an
//! incremental update stops at the month holding the most recently stored day
//! and only keeps the days after it.

use std::fmt::Display;

use serde::Serialize;

use crate::parser::parse_month_page;
use crate::scraper::{MonthFetcher, ScraperError};
use crate::store::{StoreError, WeatherStore};
use crate::types::{DateKey, MonthPage, YearMonth};

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Failed to fetch {period}: {source}")]
    Fetch {
        period: YearMonth,
        #[source]
        source: ScraperError,
    },
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("The store is empty; run a full download before updating")]
    EmptyStore,
    #[error("Most recent stored date {latest} is after the current month {current}")]
    BoundaryAhead { latest: DateKey, current: YearMonth },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// The source began repeating its earliest page.
    NoEarlierData { earliest: YearMonth },
    /// Walked past the first year the source publishes without seeing a repeat.
    ReachedFloor { floor: i32 },
    /// Caught up with the month holding the most recently stored day.
    UpToDate { boundary: YearMonth, last_day: u32 },
}

impl Display for CrawlOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlOutcome::NoEarlierData { earliest } => {
                write!(f, "no earlier data (earliest month available is {})", earliest)
            }
            CrawlOutcome::ReachedFloor { floor } => {
                write!(f, "stopped at the {} floor without a repeated page", floor)
            }
            CrawlOutcome::UpToDate { boundary, last_day } => {
                write!(f, "up to date (resumed after day {} of {})", last_day, boundary)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub months_fetched: usize,
    pub rows_saved: usize,
    pub outcome: CrawlOutcome,
}

impl Display for CrawlReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fetched {} month(s), saved {} row(s): {}",
            self.months_fetched, self.rows_saved, self.outcome
        )
    }
}

#[derive(Debug)]
struct FetchedMonth {
    period: YearMonth,
    page: MonthPage,
}

/// Fetches and parses consecutive months, newest first.
struct MonthWalker<'a, F> {
    fetcher: &'a F,
    cursor: YearMonth,
    last_title: Option<String>,
    fetched: usize,
}

impl<'a, F: MonthFetcher> MonthWalker<'a, F> {
    fn new(fetcher: &'a F, start: YearMonth) -> Self {
        Self {
            fetcher,
            cursor: start,
            last_title: None,
            fetched: 0,
        }
    }

    async fn next_month(&mut self) -> Result<FetchedMonth, CrawlError> {
        let period = self.cursor;
        log::info!("Downloading data from {}...", period);

        let html = self
            .fetcher
            .fetch_month(period)
            .await
            .map_err(|source| CrawlError::Fetch { period, source })?;

        let page = parse_month_page(&html, period, self.last_title.as_deref());
        if page.title.is_some() {
            self.last_title.clone_from(&page.title);
        }

        self.cursor = period.previous();
        self.fetched += 1;

        Ok(FetchedMonth { period, page })
    }
}

pub struct Crawler<F> {
    fetcher: F,
    start: YearMonth,
}

impl<F: MonthFetcher> Crawler<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            start: YearMonth::current(),
        }
    }

    /// Begins crawling from `start` instead of the current month.
    pub fn starting_at(mut self, start: YearMonth) -> Self {
        self.start = start;
        self
    }

    /// Updates when the store already holds data, downloads everything otherwise.
    pub async fn sync<S: WeatherStore>(&self, store: &mut S) -> Result<CrawlReport, CrawlError> {
        if store.row_count()? == 0 {
            log::info!("No stored data yet, performing a full download");
            self.full_backfill(store).await
        } else {
            self.incremental_update(store).await
        }
    }

    /// Stores every month from the start month back to the earliest one the source has.
    ///
    /// The store is expected to be empty; already stored days surface as
    /// [`StoreError::DuplicateKey`].
    pub async fn full_backfill<S: WeatherStore>(
        &self,
        store: &mut S,
    ) -> Result<CrawlReport, CrawlError> {
        let mut walker = MonthWalker::new(&self.fetcher, self.start);
        let mut rows_saved = 0;
        let mut last_saved = None;

        loop {
            if walker.cursor.year() < crate::EARLIEST_YEAR {
                log::warn!(
                    "Reached {} without the source repeating a page, stopping",
                    crate::EARLIEST_YEAR
                );
                return Ok(CrawlReport {
                    months_fetched: walker.fetched,
                    rows_saved,
                    outcome: CrawlOutcome::ReachedFloor {
                        floor: crate::EARLIEST_YEAR,
                    },
                });
            }

            let month = walker.next_month().await?;

            if month.page.same_month {
                let earliest = last_saved.unwrap_or(month.period);
                log::info!(
                    "Data before {} is not available, download complete!",
                    earliest
                );
                return Ok(CrawlReport {
                    months_fetched: walker.fetched,
                    rows_saved,
                    outcome: CrawlOutcome::NoEarlierData { earliest },
                });
            }

            rows_saved += store.insert_many(&month.page.dataset)?;
            last_saved = Some(month.period);
        }
    }

    /// Stores the months after the most recently stored day, then the missing
    /// tail of that day's month.
    pub async fn incremental_update<S: WeatherStore>(
        &self,
        store: &mut S,
    ) -> Result<CrawlReport, CrawlError> {
        let latest = store.most_recent_date()?.ok_or(CrawlError::EmptyStore)?;
        let boundary = latest.period();

        if boundary > self.start {
            return Err(CrawlError::BoundaryAhead {
                latest,
                current: self.start,
            });
        }

        // Stored keys always come back with a numeric day.
        let last_day = latest.day_number().unwrap_or(0);

        let mut walker = MonthWalker::new(&self.fetcher, self.start);
        let mut rows_saved = 0;

        while walker.cursor != boundary {
            let month = walker.next_month().await?;
            rows_saved += store.insert_many(&month.page.dataset)?;
        }

        log::info!("Updating data for {} after day {}...", boundary, last_day);
        let month = walker.next_month().await?;
        let fresh = month.page.dataset.retain_after_day(last_day);
        rows_saved += store.insert_many(&fresh)?;

        log::info!("Update complete! Database is now up to date!");

        Ok(CrawlReport {
            months_fetched: walker.fetched,
            rows_saved,
            outcome: CrawlOutcome::UpToDate { boundary, last_day },
        })
    }
}
