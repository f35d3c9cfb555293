use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::clock::{facility_day, is_within_business_hours, FACILITY_TZ};
use crate::limits::*;
use crate::model::{Category, CourtId};

use super::error::msg;
use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowViolation {
    TooSoon,
    TooFar,
}

/// `start` must lie in `[now + 2h, now + 7d]`, both ends inclusive.
pub(crate) fn check_booking_window(
    now: DateTime<Utc>,
    start: DateTime<Utc>,
) -> Result<(), WindowViolation> {
    if start < now + MIN_BOOKING_LEAD {
        return Err(WindowViolation::TooSoon);
    }
    if start > now + MAX_BOOKING_HORIZON {
        return Err(WindowViolation::TooFar);
    }
    Ok(())
}

/// Window and business-hour rules for a new booking.
pub(crate) fn validate_new_slot(now: DateTime<Utc>, start: DateTime<Utc>) -> Result<(), EngineError> {
    match check_booking_window(now, start) {
        Err(WindowViolation::TooSoon) => return Err(EngineError::bad_request(msg::TOO_SOON)),
        Err(WindowViolation::TooFar) => return Err(EngineError::bad_request(msg::TOO_FAR)),
        Ok(()) => {}
    }
    if !is_within_business_hours(start) {
        return Err(EngineError::bad_request(msg::OUTSIDE_HOURS));
    }
    Ok(())
}

/// Same rules for moving a booking; the messages differ.
pub(crate) fn validate_moved_slot(now: DateTime<Utc>, start: DateTime<Utc>) -> Result<(), EngineError> {
    if check_booking_window(now, start).is_err() {
        return Err(EngineError::bad_request(msg::MOVE_OUT_OF_WINDOW));
    }
    if !is_within_business_hours(start) {
        return Err(EngineError::bad_request(msg::MOVE_OUTSIDE_HOURS));
    }
    Ok(())
}

/// RFC 3339 instant, or a naive `YYYY-MM-DDTHH:MM[:SS]` read as facility civil time.
pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .map_err(|_| EngineError::bad_request(msg::INVALID_INSTANT))?;
    naive
        .and_local_timezone(FACILITY_TZ)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| EngineError::bad_request(msg::INVALID_INSTANT))
}

/// A tournament date: plain `YYYY-MM-DD`, or an instant whose facility day is taken.
pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, EngineError> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day);
    }
    parse_instant(raw).map(facility_day)
}

/// Parse against the fixed A–D set, then against the tournament's own list if it has one.
pub(crate) fn parse_category(raw: &str, offered: Option<&[Category]>) -> Result<Category, EngineError> {
    let category: Category = raw
        .parse()
        .map_err(|()| EngineError::bad_request(msg::INVALID_CATEGORY))?;
    if let Some(offered) = offered
        && !offered.contains(&category)
    {
        return Err(EngineError::bad_request(msg::CATEGORY_NOT_OFFERED));
    }
    Ok(category)
}

pub(crate) fn parse_categories(raw: &[String]) -> Result<Vec<Category>, EngineError> {
    let mut categories = Vec::with_capacity(raw.len());
    for r in raw {
        let c = parse_category(r, None)?;
        if !categories.contains(&c) {
            categories.push(c);
        }
    }
    Ok(categories)
}

pub(crate) fn validate_tournament_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
        return Err(EngineError::bad_request(msg::INVALID_NAME));
    }
    Ok(())
}

/// Sorted, deduplicated court ids.
pub(crate) fn normalize_court_ids(ids: &[CourtId]) -> Result<Vec<CourtId>, EngineError> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() > MAX_COURTS_PER_TOURNAMENT {
        return Err(EngineError::bad_request(msg::TOO_MANY_COURTS));
    }
    Ok(ids)
}
