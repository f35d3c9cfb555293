use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::limits::{CLOSING_HOUR, OPENING_HOUR};

/// The facility's civil timezone. Every business-hour and calendar-day rule is
/// evaluated here, regardless of how instants are stored.
pub const FACILITY_TZ: Tz = chrono_tz::America::Sao_Paulo;

/// Source of "now" for the engine and the sweeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

// ── Facility civil time ──────────────────────────────────────────

/// Local hour `[0, 23]` of `instant` in the facility timezone.
pub fn to_facility_hour(instant: DateTime<Utc>) -> u32 {
    instant.with_timezone(&FACILITY_TZ).hour()
}

/// True iff the local hour is in `[OPENING_HOUR, CLOSING_HOUR)`.
pub fn is_within_business_hours(instant: DateTime<Utc>) -> bool {
    let hour = to_facility_hour(instant);
    (OPENING_HOUR..CLOSING_HOUR).contains(&hour)
}

/// Calendar day of `instant` as seen at the facility.
pub fn facility_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&FACILITY_TZ).date_naive()
}

/// First instant of `day` at the facility.
///
/// Resolves a local midnight that falls in a DST gap to the earliest valid
/// instant after it.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    local_to_utc(day, NaiveTime::MIN)
}

/// First instant of the day after `day`; `day` covers `[start_of_day, end_of_day)`.
pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    match day.succ_opt() {
        Some(next) => start_of_day(next),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// Facility-local wall-clock time on `day`, mapped to UTC.
pub fn local_to_utc(day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let mut naive = day.and_time(time);
    // Walk forward out of a spring-forward gap; at most one hour in practice.
    for _ in 0..=120 {
        if let Some(local) = FACILITY_TZ.from_local_datetime(&naive).earliest() {
            return local.with_timezone(&Utc);
        }
        naive += Duration::minutes(1);
    }
    Utc.from_utc_datetime(&day.and_time(time))
}

/// Next instant strictly after `now` at which the facility-local clock reads `at`.
pub fn next_local_occurrence(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let mut day = facility_day(now);
    loop {
        let candidate = local_to_utc(day, at);
        if candidate > now {
            return candidate;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => return DateTime::<Utc>::MAX_UTC,
        }
    }
}
