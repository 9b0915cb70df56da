//! # Remittance Periods: Inclusive Calendar Windows
//!
//! A [`RemittancePeriod`] is a pair of inclusive calendar dates. Orders are
//! attributed to a period when their UTC creation instant falls anywhere on
//! or between those dates.
//!
//! Periods are validated at construction (`start <= end`), including when
//! deserialized, so an inverted period cannot enter the system.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How a period was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Custom,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "custom" => Ok(Self::Custom),
            _ => Err(ValidationError::UnknownVariant {
                kind: "period type",
                value: s.to_string(),
            }),
        }
    }
}

/// A tenant's remittance cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceSchedule {
    #[default]
    Monthly,
    Quarterly,
}

impl RemittanceSchedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
        }
    }

    pub fn period_type(&self) -> PeriodType {
        match self {
            Self::Monthly => PeriodType::Monthly,
            Self::Quarterly => PeriodType::Quarterly,
        }
    }
}

impl fmt::Display for RemittanceSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemittanceSchedule {
    type Err = ValidationError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            _ => Err(ValidationError::UnknownVariant {
                kind: "remittance schedule",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct RawPeriod {
    start: NaiveDate,
    end: NaiveDate,
    period_type: PeriodType,
}

/// An inclusive `[start, end]` calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct RemittancePeriod {
    start: NaiveDate,
    end: NaiveDate,
    period_type: PeriodType,
}

impl TryFrom<RawPeriod> for RemittancePeriod {
    type Error = ValidationError;

    fn try_from(raw: RawPeriod) -> Result<Self, Self::Error> {
        Self::with_type(raw.start, raw.end, raw.period_type)
    }
}

impl RemittancePeriod {
    /// Build a period of any type. Fails when `start > end`.
    pub fn with_type(
        start: NaiveDate,
        end: NaiveDate,
        period_type: PeriodType,
    ) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidPeriod(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self {
            start,
            end,
            period_type,
        })
    }

    /// An operator-chosen window.
    pub fn custom(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        Self::with_type(start, end, PeriodType::Custom)
    }

    /// The calendar month `month` (1-12) of `year`.
    pub fn monthly(year: i32, month: u32) -> Result<Self, ValidationError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            ValidationError::InvalidPeriod(format!("no such month {year}-{month:02}"))
        })?;
        let end = last_day_of_month(year, month)?;
        Self::with_type(start, end, PeriodType::Monthly)
    }

    /// Calendar quarter `quarter` (1-4) of `year`.
    pub fn quarterly(year: i32, quarter: u32) -> Result<Self, ValidationError> {
        if !(1..=4).contains(&quarter) {
            return Err(ValidationError::InvalidPeriod(format!(
                "quarter must be 1-4, got {quarter}"
            )));
        }
        let first_month = (quarter - 1) * 3 + 1;
        let start = NaiveDate::from_ymd_opt(year, first_month, 1).ok_or_else(|| {
            ValidationError::InvalidPeriod(format!("no such quarter {year}-Q{quarter}"))
        })?;
        let end = last_day_of_month(year, first_month + 2)?;
        Self::with_type(start, end, PeriodType::Quarterly)
    }

    /// The period of `schedule` that contains `today`.
    pub fn current(
        schedule: RemittanceSchedule,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        match schedule {
            RemittanceSchedule::Monthly => Self::monthly(today.year(), today.month()),
            RemittanceSchedule::Quarterly => {
                Self::quarterly(today.year(), quarter_of(today.month()))
            }
        }
    }

    /// The period of `schedule` immediately before the one containing `today`.
    pub fn previous(
        schedule: RemittanceSchedule,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let current = Self::current(schedule, today)?;
        let day_before = current.start.pred_opt().ok_or_else(|| {
            ValidationError::InvalidPeriod(format!("no period precedes {}", current.start))
        })?;
        Self::current(schedule, day_before)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn period_type(&self) -> PeriodType {
        self.period_type
    }

    /// Midnight UTC at the start of the first day.
    pub fn start_of_day(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC after the last day. Exclusive upper bound for range queries.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        (self.end.and_time(NaiveTime::MIN) + Duration::days(1)).and_utc()
    }

    /// Whether `at` falls on any day of the period.
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start <= day && day <= self.end
    }

    /// Whether the two windows share at least one day.
    pub fn overlaps(&self, other: &RemittancePeriod) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for RemittancePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate, ValidationError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| ValidationError::InvalidPeriod(format!("no such month {year}-{month:02}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── construction ─────────────────────────────────────────────────

    #[test]
    fn monthly_covers_whole_month() {
        let feb = RemittancePeriod::monthly(2024, 2).unwrap();
        assert_eq!(feb.start(), date(2024, 2, 1));
        assert_eq!(feb.end(), date(2024, 2, 29));
        assert_eq!(feb.period_type(), PeriodType::Monthly);

        let dec = RemittancePeriod::monthly(2023, 12).unwrap();
        assert_eq!(dec.end(), date(2023, 12, 31));
    }

    #[test]
    fn quarterly_bounds() {
        let q3 = RemittancePeriod::quarterly(2024, 3).unwrap();
        assert_eq!(q3.start(), date(2024, 7, 1));
        assert_eq!(q3.end(), date(2024, 9, 30));
        assert!(RemittancePeriod::quarterly(2024, 5).is_err());
        assert!(RemittancePeriod::monthly(2024, 13).is_err());
    }

    #[test]
    fn custom_rejects_inverted_bounds() {
        assert!(RemittancePeriod::custom(date(2024, 3, 2), date(2024, 3, 1)).is_err());
        let single = RemittancePeriod::custom(date(2024, 3, 1), date(2024, 3, 1)).unwrap();
        assert_eq!(single.start(), single.end());
    }

    #[test]
    fn current_and_previous_cross_year_boundary() {
        let today = date(2024, 1, 15);
        let prev_month = RemittancePeriod::previous(RemittanceSchedule::Monthly, today).unwrap();
        assert_eq!(prev_month, RemittancePeriod::monthly(2023, 12).unwrap());

        let prev_q = RemittancePeriod::previous(RemittanceSchedule::Quarterly, today).unwrap();
        assert_eq!(prev_q, RemittancePeriod::quarterly(2023, 4).unwrap());

        let cur_q = RemittancePeriod::current(RemittanceSchedule::Quarterly, date(2024, 6, 30))
            .unwrap();
        assert_eq!(cur_q, RemittancePeriod::quarterly(2024, 2).unwrap());
    }

    // ── membership ───────────────────────────────────────────────────

    #[test]
    fn contains_is_inclusive_of_last_day() {
        let p = RemittancePeriod::monthly(2024, 1).unwrap();
        let last_second = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert!(p.contains(&last_second));
        assert!(!p.contains(&next_day));
        assert_eq!(p.end_exclusive(), next_day);
        assert_eq!(
            p.start_of_day(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn overlap_detection() {
        let jan = RemittancePeriod::monthly(2024, 1).unwrap();
        let q1 = RemittancePeriod::quarterly(2024, 1).unwrap();
        let feb = RemittancePeriod::monthly(2024, 2).unwrap();
        let touching = RemittancePeriod::custom(date(2024, 1, 31), date(2024, 2, 5)).unwrap();
        assert!(jan.overlaps(&q1));
        assert!(q1.overlaps(&feb));
        assert!(!jan.overlaps(&feb));
        assert!(jan.overlaps(&touching));
    }

    // ── parsing & serde ──────────────────────────────────────────────

    #[test]
    fn schedule_parse_is_case_insensitive() {
        assert_eq!(
            "Quarterly".parse::<RemittanceSchedule>().unwrap(),
            RemittanceSchedule::Quarterly
        );
        assert!("weekly".parse::<RemittanceSchedule>().is_err());
        assert_eq!(RemittanceSchedule::default(), RemittanceSchedule::Monthly);
    }

    #[test]
    fn deserialization_enforces_ordering() {
        let ok: RemittancePeriod = serde_json::from_str(
            r#"{"start":"2024-01-01","end":"2024-01-31","period_type":"monthly"}"#,
        )
        .unwrap();
        assert_eq!(ok.to_string(), "2024-01-01 - 2024-01-31");

        let bad = serde_json::from_str::<RemittancePeriod>(
            r#"{"start":"2024-02-01","end":"2024-01-31","period_type":"custom"}"#,
        );
        assert!(bad.is_err());
    }
}
