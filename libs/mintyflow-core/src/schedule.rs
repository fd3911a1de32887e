//! Calendar math for recurring bills, premiums and transactions.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};

use crate::types::{BillInterval, Millis, PremiumFrequency, RecurrenceInterval};

/// Upper bound on steps taken when rolling a schedule forward.
const MAX_STEPS: usize = 1200;

/// Something that repeats on a calendar cadence.
pub trait Cadence {
    /// Timestamp one period after `from`.
    fn advance(&self, from: Millis) -> Millis;
}

enum Step {
    Days(i64),
    Months(u32),
}

fn step(from: Millis, step: Step) -> Millis {
    let Some(start) = DateTime::<Utc>::from_timestamp_millis(from) else {
        return from;
    };
    let next = match step {
        Step::Days(days) => start.checked_add_signed(Duration::days(days)),
        // chrono clamps to the last day of shorter months (Jan 31 + 1 month = Feb 28/29).
        Step::Months(months) => start.checked_add_months(Months::new(months)),
    };
    next.map(|dt| dt.timestamp_millis()).unwrap_or(from)
}

impl Cadence for RecurrenceInterval {
    fn advance(&self, from: Millis) -> Millis {
        match self {
            Self::Daily => step(from, Step::Days(1)),
            Self::Weekly => step(from, Step::Days(7)),
            Self::Monthly => step(from, Step::Months(1)),
            Self::Yearly => step(from, Step::Months(12)),
        }
    }
}

impl Cadence for BillInterval {
    fn advance(&self, from: Millis) -> Millis {
        match self {
            Self::Monthly => step(from, Step::Months(1)),
            Self::Quarterly => step(from, Step::Months(3)),
            Self::Yearly => step(from, Step::Months(12)),
        }
    }
}

impl Cadence for PremiumFrequency {
    fn advance(&self, from: Millis) -> Millis {
        match self {
            Self::Monthly => step(from, Step::Months(1)),
            Self::Quarterly => step(from, Step::Months(3)),
            Self::HalfYearly => step(from, Step::Months(6)),
            Self::Yearly => step(from, Step::Months(12)),
        }
    }
}

/// First occurrence of the cadence, anchored at `anchor`, that is not before `now`.
pub fn next_occurrence<C: Cadence>(cadence: &C, anchor: Millis, now: Millis) -> Millis {
    let mut current = anchor;
    for _ in 0..MAX_STEPS {
        if current >= now {
            break;
        }
        let next = cadence.advance(current);
        if next <= current {
            break;
        }
        current = next;
    }
    current
}

/// Next premium due date for a policy.
///
/// With a recorded payment the next premium is one period after it; otherwise
/// the schedule is rolled forward from the policy start date. Returns `None`
/// once the computed date falls after the policy end date.
pub fn next_premium_date(
    frequency: PremiumFrequency,
    start_date: Millis,
    last_paid: Option<Millis>,
    end_date: Option<Millis>,
    now: Millis,
) -> Option<Millis> {
    let next = match last_paid {
        Some(paid) => frequency.advance(paid),
        None => next_occurrence(&frequency, start_date, now),
    };
    match end_date {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

/// Start and end (inclusive) of the calendar month containing `now`, in UTC.
pub fn month_window(now: Millis) -> (Millis, Millis) {
    let date = DateTime::<Utc>::from_timestamp_millis(now)
        .map(|dt| dt.date_naive())
        .unwrap_or_default();
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
    let next_first = first.checked_add_months(Months::new(1)).unwrap_or(first);
    let start = Utc
        .from_utc_datetime(&first.and_hms_opt(0, 0, 0).unwrap_or_default())
        .timestamp_millis();
    let end = Utc
        .from_utc_datetime(&next_first.and_hms_opt(0, 0, 0).unwrap_or_default())
        .timestamp_millis()
        - 1;
    (start, end)
}
