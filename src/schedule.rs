use chrono::{Duration, Months, NaiveDate};

use crate::error::{Result, ScheduleError};
use crate::models::{CycleDuration, Frequency, Period};

/// Moves a date forward by one period. Monthly steps clamp to the end of
/// shorter months (Jan 31 -> Feb 29 in a leap year).
pub fn next_period_start(date: NaiveDate, frequency: Frequency) -> Result<NaiveDate> {
    let next = match frequency {
        Frequency::Weekly => date.checked_add_signed(Duration::days(7)),
        Frequency::Biweekly => date.checked_add_signed(Duration::days(14)),
        Frequency::Monthly => date.checked_add_months(Months::new(1)),
    };
    next.ok_or_else(|| {
        ScheduleError::invalid(format!("schedule overflows the calendar after {date}"))
    })
}

/// Builds the ordered periods of one cycle. Each monthly period starts one
/// calendar month after the previous period's start, so a clamped day
/// carries forward (Jan 31, Feb 29, Mar 29).
pub fn generate_periods(
    start_date: NaiveDate,
    frequency: Frequency,
    cycle_length: u32,
) -> Result<Vec<Period>> {
    if cycle_length == 0 {
        return Err(ScheduleError::invalid("cycle length must be positive"));
    }

    let mut periods = Vec::with_capacity(cycle_length as usize);
    let mut current = start_date;
    for index in 0..cycle_length as usize {
        let end_date = next_period_start(current, frequency)?;
        periods.push(Period {
            index,
            start_date: current,
            end_date,
        });
        current = end_date;
    }

    tracing::debug!(
        %start_date,
        %frequency,
        cycle_length,
        end_date = %current,
        "generated periods"
    );
    Ok(periods)
}

/// Number of periods in a cycle of the given duration.
pub fn cycle_length_for(duration: CycleDuration, frequency: Frequency) -> Result<u32> {
    duration
        .months()
        .checked_mul(frequency.periods_per_month())
        .ok_or_else(|| {
            ScheduleError::invalid(format!(
                "{} months of {frequency} periods is too long",
                duration.months()
            ))
        })
}
