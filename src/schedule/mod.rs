use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{BillingError, Result};
use crate::types::BillingFrequency;

/// one calendar billing period with its due date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// year of the period's starting month
    pub year: i32,
    /// month of the period's starting month (1-12)
    pub month: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub due_date: NaiveDate,
}

/// compute the ordered billing periods for a lease
///
/// Periods are calendar-month aligned: each period ends on the last day of
/// the month reached by advancing `frequency` months minus one from the
/// period's starting month, so variable month lengths are handled exactly.
/// The due date is the due-day clamped to the last valid day of the
/// period's starting month. Periods never overlap and never gap.
pub fn billing_periods(
    start: NaiveDate,
    end: Option<NaiveDate>,
    frequency: BillingFrequency,
    due_day: u8,
) -> Result<Vec<BillingPeriod>> {
    if due_day < 1 || due_day > 31 {
        return Err(BillingError::InvalidDueDay { day: due_day });
    }

    // absent an end date the lease bills for one calendar year
    let effective_end = match end {
        Some(end) => end,
        None => add_months(start, 12)
            .pred_opt()
            .ok_or_else(|| BillingError::InvalidDate {
                message: format!("cannot derive default end date from {start}"),
            })?,
    };

    let months = frequency.months_per_period();
    let mut periods = Vec::new();
    let mut period_start = start;

    while period_start <= effective_end {
        let (end_year, end_month) = shift_month(period_start.year(), period_start.month(), months - 1);
        let period_end = last_day_of_month(end_year, end_month);
        let due_date = clamp_to_month(period_start.year(), period_start.month(), due_day as u32);

        periods.push(BillingPeriod {
            year: period_start.year(),
            month: period_start.month(),
            start: period_start,
            end: period_end,
            due_date,
        });

        period_start = period_end
            .succ_opt()
            .ok_or_else(|| BillingError::InvalidDate {
                message: format!("billing period overflow past {period_end}"),
            })?;
    }

    if periods.is_empty() {
        return Err(BillingError::InvalidLeaseDuration {
            start,
            end: effective_end,
        });
    }

    Ok(periods)
}

/// advance a date by whole calendar months, clamping the day
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let (year, month) = shift_month(date.year(), date.month(), months);
    clamp_to_month(year, month, date.day())
}

fn shift_month(year: i32, month: u32, months: u32) -> (i32, u32) {
    let zero_based = (month - 1) + months;
    (year + (zero_based / 12) as i32, zero_based % 12 + 1)
}

/// last calendar day of the given month
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = shift_month(year, month, 1);
    // the first of any representable month exists, as does its predecessor
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .unwrap_or(NaiveDate::MAX)
}

/// resolve a day-of-month within a month, rolling back past its last day
fn clamp_to_month(year: i32, month: u32, day: u32) -> NaiveDate {
    let last = last_day_of_month(year, month);
    NaiveDate::from_ymd_opt(year, month, day.min(last.day())).unwrap_or(last)
}
