//! Nordpool day-ahead price integration
//!
//! Fetches hourly day-ahead prices for one bidding area from the Nordpool
//! data portal and keeps a today/tomorrow cache. The charging controller
//! never consults prices; they are surfaced for logging and the
//! "prices updated" notification only.

use crate::config::PricesConfig;
use crate::error::{EosError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Europe::Stockholm;
use serde::Deserialize;
use std::collections::HashMap;

const DATA_PORTAL_URL: &str = "https://dataportal-api.nordpoolgroup.com/api/DayAheadPrices";

/// One delivery hour with its total price
#[derive(Debug, Clone)]
pub struct PricePoint {
    /// Start of the delivery period
    pub starts_at: DateTime<Utc>,

    /// Price for the period in the configured currency per MWh
    pub total: f64,
}

/// Day-ahead prices for one delivery day in one bidding area
#[derive(Debug, Clone)]
pub struct PriceTable {
    /// Delivery day in the market timezone (CET)
    pub delivery_date: NaiveDate,

    /// Hourly rows in delivery order
    pub rows: Vec<PricePoint>,
}

/// Wire format of the data portal response
#[derive(Debug, Deserialize)]
struct DayAheadResponse {
    #[serde(rename = "deliveryDateCET")]
    delivery_date: String,

    #[serde(rename = "multiAreaEntries")]
    entries: Vec<AreaEntry>,
}

#[derive(Debug, Deserialize)]
struct AreaEntry {
    #[serde(rename = "deliveryStart")]
    delivery_start: DateTime<Utc>,

    #[serde(rename = "entryPerArea")]
    entry_per_area: HashMap<String, f64>,
}

impl PriceTable {
    fn from_response(response: DayAheadResponse, area: &str) -> Result<Self> {
        let delivery_date = NaiveDate::parse_from_str(&response.delivery_date, "%Y-%m-%d")?;
        let rows = response
            .entries
            .into_iter()
            .filter_map(|entry| {
                entry.entry_per_area.get(area).map(|total| PricePoint {
                    starts_at: entry.delivery_start,
                    total: *total,
                })
            })
            .collect();
        Ok(Self {
            delivery_date,
            rows,
        })
    }
}

/// Day-ahead price cache for one bidding area
pub struct PriceService {
    area: String,
    currency: String,
    http: reqwest::Client,
    today: Option<PriceTable>,
    tomorrow: Option<PriceTable>,
    logger: crate::logging::StructuredLogger,
}

impl PriceService {
    /// Create a price service for the configured area
    pub fn new(config: &PricesConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| EosError::api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            area: config.area.clone(),
            currency: config.currency.clone(),
            http,
            today: None,
            tomorrow: None,
            logger: get_logger("prices"),
        })
    }

    /// Bidding area this service tracks
    pub fn area(&self) -> &str {
        &self.area
    }

    /// Refresh the cache from the data portal
    ///
    /// Returns true when a table for a previously-unknown delivery day
    /// appeared, i.e. when the next day-ahead auction results landed.
    pub async fn update_prices(&mut self) -> Result<bool> {
        let market_today = market_date(Utc::now());
        self.roll_over(market_today);

        if self
            .today
            .as_ref()
            .is_none_or(|t| t.delivery_date < market_today)
        {
            if let Some(table) = self.fetch_day(market_today).await? {
                self.logger.info(&format!(
                    "Fetched {} day-ahead prices for {}",
                    table.rows.len(),
                    table.delivery_date
                ));
                self.today = Some(table);
            }
        }

        let market_tomorrow = market_today
            .succ_opt()
            .ok_or_else(|| EosError::api("Market date out of range"))?;

        let mut updated = false;
        if self
            .tomorrow
            .as_ref()
            .is_none_or(|t| t.delivery_date < market_tomorrow)
        {
            if let Some(table) = self.fetch_day(market_tomorrow).await? {
                self.logger.info(&format!(
                    "Fetched {} day-ahead prices for {}",
                    table.rows.len(),
                    table.delivery_date
                ));
                self.tomorrow = Some(table);
                updated = true;
            }
        }

        Ok(updated)
    }

    /// Price for the running delivery hour, if cached
    pub fn current_price(&self) -> Option<f64> {
        self.price_at(Utc::now())
    }

    /// Price for the delivery hour containing the given instant
    pub fn price_at(&self, at: DateTime<Utc>) -> Option<f64> {
        self.today
            .iter()
            .chain(self.tomorrow.iter())
            .flat_map(|table| table.rows.iter())
            .find(|row| row.starts_at <= at && at - row.starts_at < ChronoDuration::hours(1))
            .map(|row| row.total)
    }

    /// Currency the prices are denominated in
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Promote the tomorrow table once its delivery day has started
    fn roll_over(&mut self, market_today: NaiveDate) {
        if self
            .tomorrow
            .as_ref()
            .is_some_and(|t| t.delivery_date <= market_today)
        {
            self.today = self.tomorrow.take();
        }
    }

    /// Fetch one delivery day; None when the auction has not published yet
    async fn fetch_day(&self, date: NaiveDate) -> Result<Option<PriceTable>> {
        let response = self
            .http
            .get(DATA_PORTAL_URL)
            .query(&[
                ("date", date.format("%Y-%m-%d").to_string()),
                ("market", "DayAhead".to_string()),
                ("deliveryArea", self.area.clone()),
                ("currency", self.currency.clone()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EosError::api(format!(
                "Nordpool request for {} failed with status {}",
                date,
                response.status()
            )));
        }

        let body: DayAheadResponse = response.json().await?;
        let table = PriceTable::from_response(body, &self.area)?;
        if table.rows.is_empty() {
            self.logger.debug(&format!(
                "No rows for area {} on {}, treating as unpublished",
                self.area, date
            ));
            return Ok(None);
        }
        Ok(Some(table))
    }
}

/// Delivery day of the Nordpool market for a given instant (CET)
pub fn market_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Stockholm).date_naive()
}
