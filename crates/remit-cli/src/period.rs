//! # Period Subcommand
//!
//! Prints the filing period containing a date, or the one before it. The
//! scheduler files for the previous period, so `--previous` answers "what
//! would tonight's run create".

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Args;

use remit_core::{RemittancePeriod, RemittanceSchedule};

/// Arguments for `remit period`.
#[derive(Args, Debug)]
pub struct PeriodArgs {
    /// `monthly` or `quarterly`.
    #[arg(long, default_value = "monthly")]
    pub schedule: RemittanceSchedule,

    /// Reference date (YYYY-MM-DD). Defaults to today in UTC.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Show the period before the one containing the date.
    #[arg(long)]
    pub previous: bool,
}

/// Execute the period subcommand.
pub fn run_period(args: &PeriodArgs) -> Result<u8> {
    let period = resolve(args)?;
    println!(
        "{} {} {}",
        period.start(),
        period.end(),
        period.period_type().as_str()
    );
    Ok(0)
}

fn resolve(args: &PeriodArgs) -> Result<RemittancePeriod> {
    let today = args.date.unwrap_or_else(|| Utc::now().date_naive());
    let period = if args.previous {
        RemittancePeriod::previous(args.schedule, today)?
    } else {
        RemittancePeriod::current(args.schedule, today)?
    };
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn previous_month_crosses_year() {
        let p = resolve(&PeriodArgs {
            schedule: RemittanceSchedule::Monthly,
            date: Some(date("2024-01-15")),
            previous: true,
        })
        .unwrap();
        assert_eq!(p.start(), date("2023-12-01"));
        assert_eq!(p.end(), date("2023-12-31"));
    }

    #[test]
    fn current_quarter() {
        let p = resolve(&PeriodArgs {
            schedule: RemittanceSchedule::Quarterly,
            date: Some(date("2024-05-10")),
            previous: false,
        })
        .unwrap();
        assert_eq!(p.start(), date("2024-04-01"));
        assert_eq!(p.end(), date("2024-06-30"));
    }
}
