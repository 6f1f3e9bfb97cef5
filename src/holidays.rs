// 🎉 Holiday Lookup - National holidays for a year
// Keys are "<month>-<day>" without zero padding ("9-7", "12-25")

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// HOLIDAY SET
// ============================================================================

/// Immutable holiday table for one year
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HolidaySet {
    pub year: i32,
    pub by_key: BTreeMap<String, String>,
}

/// "<month>-<day>" key for a date
pub fn holiday_key(date: NaiveDate) -> String {
    format!("{}-{}", date.month(), date.day())
}

impl HolidaySet {
    pub fn new(year: i32) -> Self {
        HolidaySet { year, by_key: BTreeMap::new() }
    }

    /// Build from (month, day, name) triples
    pub fn from_entries<'a, I>(year: i32, entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32, &'a str)>,
    {
        let by_key = entries
            .into_iter()
            .map(|(month, day, name)| (format!("{}-{}", month, day), name.to_string()))
            .collect();
        HolidaySet { year, by_key }
    }

    /// Matches on the "<month>-<day>" key only, so a December date rolled
    /// into January still sees "1-1"
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.by_key.contains_key(&holiday_key(date))
    }

    pub fn name(&self, date: NaiveDate) -> Option<&str> {
        self.by_key.get(&holiday_key(date)).map(String::as_str)
    }

    /// Add the other set's keys that are not already present
    pub fn merge(&mut self, other: HolidaySet) {
        for (key, name) in other.by_key {
            self.by_key.entry(key).or_insert(name);
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// Anything that can produce the holidays of a year
pub trait HolidayProvider: Send + Sync {
    fn holidays(&self, year: i32) -> Result<HolidaySet>;
}

/// A prebuilt set serves its own year; other years get an empty set
impl HolidayProvider for HolidaySet {
    fn holidays(&self, year: i32) -> Result<HolidaySet> {
        if year == self.year {
            Ok(self.clone())
        } else {
            Ok(HolidaySet::new(year))
        }
    }
}

/// Fixed-date national holidays (movable feasts like Carnaval are not included)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedHolidays;

const FIXED_NATIONAL: [(u32, u32, &str); 9] = [
    (1, 1, "Confraternização mundial"),
    (4, 21, "Tiradentes"),
    (5, 1, "Dia do trabalho"),
    (9, 7, "Independência do Brasil"),
    (10, 12, "Nossa Senhora Aparecida"),
    (11, 2, "Finados"),
    (11, 15, "Proclamação da República"),
    (11, 20, "Dia da consciência negra"),
    (12, 25, "Natal"),
];

impl HolidayProvider for FixedHolidays {
    fn holidays(&self, year: i32) -> Result<HolidaySet> {
        Ok(HolidaySet::from_entries(year, FIXED_NATIONAL))
    }
}

#[derive(Debug, Deserialize)]
struct ApiHoliday {
    date: String,
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// BrasilAPI holiday endpoint: GET <base>/<year>
pub struct BrasilApiHolidays {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl BrasilApiHolidays {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build holiday HTTP client")?;

        Ok(BrasilApiHolidays {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl HolidayProvider for BrasilApiHolidays {
    fn holidays(&self, year: i32) -> Result<HolidaySet> {
        let url = format!("{}/{}", self.base_url, year);
        log::debug!("event=holiday_fetch url={}", url);

        let entries: Vec<ApiHoliday> = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("Holiday request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Holiday API returned an error: {}", url))?
            .json()
            .context("Failed to decode holiday response")?;

        Ok(national_holidays(year, entries))
    }
}

fn national_holidays(year: i32, entries: Vec<ApiHoliday>) -> HolidaySet {
    let mut set = HolidaySet::new(year);

    for entry in entries {
        if entry.kind != "national" {
            continue;
        }
        match NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d") {
            Ok(date) if date.year() == year => {
                set.by_key.insert(holiday_key(date), entry.name);
            }
            Ok(_) => {}
            Err(e) => log::warn!("event=holiday_bad_date date={} error={}", entry.date, e),
        }
    }

    set
}

/// Primary provider with a fallback; never fails
pub struct FallbackHolidays<P, F = FixedHolidays> {
    primary: P,
    fallback: F,
}

impl<P: HolidayProvider> FallbackHolidays<P, FixedHolidays> {
    pub fn new(primary: P) -> Self {
        FallbackHolidays { primary, fallback: FixedHolidays }
    }
}

impl<P: HolidayProvider, F: HolidayProvider> FallbackHolidays<P, F> {
    pub fn with_fallback(primary: P, fallback: F) -> Self {
        FallbackHolidays { primary, fallback }
    }

    /// Holidays from the primary, or the fallback's, or an empty set
    pub fn resolve(&self, year: i32) -> HolidaySet {
        match self.primary.holidays(year) {
            Ok(set) => set,
            Err(e) => {
                log::warn!("event=holiday_fallback year={} error={:#}", year, e);
                self.fallback.holidays(year).unwrap_or_else(|e| {
                    log::error!("event=holiday_fallback_failed year={} error={:#}", year, e);
                    HolidaySet::new(year)
                })
            }
        }
    }
}

impl<P: HolidayProvider, F: HolidayProvider> HolidayProvider for FallbackHolidays<P, F> {
    fn holidays(&self, year: i32) -> Result<HolidaySet> {
        Ok(self.resolve(year))
    }
}

// ============================================================================
// TESTS
// ============================================================================
