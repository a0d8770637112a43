use crate::{
    error::FlowError,
    instrument::{ExchangeId, Symbol},
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::str::FromStr;

/// OHLCV row. `timestamp` is the row open time in whole seconds since the UTC epoch.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default, Constructor, Deserialize, Serialize)]
pub struct CandleRow {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleRow {
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }

    pub fn time(&self) -> Result<DateTime<Utc>, FlowError> {
        DateTime::from_timestamp(self.timestamp, 0).ok_or(FlowError::InvalidCandle {
            timestamp: self.timestamp,
        })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum TimeframeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeframeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeframeUnit::Minute => "m",
            TimeframeUnit::Hour => "h",
            TimeframeUnit::Day => "d",
            TimeframeUnit::Week => "w",
            TimeframeUnit::Month => "M",
        }
    }

    /// Approximate length in seconds. Months count as 30 days, matching how exchanges
    /// convert timeframe labels into lookback durations.
    pub fn seconds(&self) -> i64 {
        match self {
            TimeframeUnit::Minute => 60,
            TimeframeUnit::Hour => 60 * 60,
            TimeframeUnit::Day => 24 * 60 * 60,
            TimeframeUnit::Week => 7 * 24 * 60 * 60,
            TimeframeUnit::Month => 30 * 24 * 60 * 60,
        }
    }
}

/// Candle timeframe, eg/ "1m", "5m", "4h", "1d", "1w", "1M".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(try_from = "SmolStr", into = "SmolStr")]
pub struct Timeframe {
    pub count: u32,
    pub unit: TimeframeUnit,
}

impl Timeframe {
    pub const fn minutes(count: u32) -> Self {
        Self {
            count,
            unit: TimeframeUnit::Minute,
        }
    }

    /// Approximate period length, `None` if it exceeds the [`Duration`] range.
    pub fn period(&self) -> Option<Duration> {
        Duration::try_seconds(i64::from(self.count) * self.unit.seconds())
    }

    /// Start of the lookback window covering `horizon` periods ending at `now`.
    pub fn since(&self, now: DateTime<Utc>, horizon: u32) -> Result<DateTime<Utc>, FlowError> {
        self.period()
            .zip(i32::try_from(horizon).ok())
            .and_then(|(period, horizon)| period.checked_mul(horizon))
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .ok_or_else(|| {
                FlowError::InvalidTimeframe(format!(
                    "{self} lookback of {horizon} periods is out of range"
                ))
            })
    }

    /// Start of the calendar-aligned window containing `time`.
    ///
    /// Windows are laid out from `origin`, the first window start of the series:
    /// - minutes / hours / days: fixed-width bins anchored at midnight UTC of `origin`'s day
    /// - weeks: bins anchored at the Monday 00:00 UTC on or before `origin`
    /// - months: bins anchored at the first day of `origin`'s month
    pub fn window_start(&self, origin: DateTime<Utc>, time: DateTime<Utc>) -> DateTime<Utc> {
        let count = i64::from(self.count.max(1));
        match self.unit {
            TimeframeUnit::Minute | TimeframeUnit::Hour | TimeframeUnit::Day => {
                let anchor = midnight(origin.date_naive());
                let width = count * self.unit.seconds();
                let offset = (time - anchor).num_seconds().div_euclid(width) * width;
                anchor + Duration::seconds(offset)
            }
            TimeframeUnit::Week => {
                let origin_day = origin.date_naive();
                let monday = origin_day
                    - Duration::days(i64::from(origin_day.weekday().num_days_from_monday()));
                let anchor = midnight(monday);
                let width = count * TimeframeUnit::Week.seconds();
                let offset = (time - anchor).num_seconds().div_euclid(width) * width;
                anchor + Duration::seconds(offset)
            }
            TimeframeUnit::Month => {
                let month_index = |t: DateTime<Utc>| i64::from(t.year()) * 12 + i64::from(t.month0());
                let anchor = month_index(origin);
                let index = anchor + (month_index(time) - anchor).div_euclid(count) * count;
                let year = index.div_euclid(12) as i32;
                let month = index.rem_euclid(12) as u32 + 1;
                NaiveDate::from_ymd_opt(year, month, 1)
                    .map(midnight)
                    .unwrap_or(time)
            }
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

impl FromStr for Timeframe {
    type Err = FlowError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || FlowError::InvalidTimeframe(label.to_string());

        let split = label
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (count, unit) = label.split_at(split);

        let count = count.parse::<u32>().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        // "T" and "min" are accepted as minute aliases
        let unit = match unit {
            "m" | "T" | "min" => TimeframeUnit::Minute,
            "h" | "H" => TimeframeUnit::Hour,
            "d" | "D" => TimeframeUnit::Day,
            "w" | "W" => TimeframeUnit::Week,
            "M" => TimeframeUnit::Month,
            _ => return Err(invalid()),
        };

        Ok(Self { count, unit })
    }
}

impl TryFrom<SmolStr> for Timeframe {
    type Error = FlowError;

    fn try_from(value: SmolStr) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<Timeframe> for SmolStr {
    fn from(value: Timeframe) -> Self {
        format_smolstr!("{}{}", value.count, value.unit.as_str())
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.count, self.unit.as_str())
    }
}

/// One-shot historical candle fetch request.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct CandleRequest {
    pub exchanges: Vec<ExchangeId>,
    pub symbols: Vec<Symbol>,
    pub timeframes: Vec<Timeframe>,
    pub since: DateTime<Utc>,
    /// Whether the source should also persist what it fetches.
    pub persist: bool,
}
