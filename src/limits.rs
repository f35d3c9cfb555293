use chrono::Duration;

// ── Booking window ───────────────────────────────────────────────

/// Minimum lead time between "now" and a reservation's start.
pub const MIN_BOOKING_LEAD: Duration = Duration::hours(2);

/// Furthest ahead a reservation may be placed.
pub const MAX_BOOKING_HORIZON: Duration = Duration::days(7);

/// First bookable facility-local hour (inclusive).
pub const OPENING_HOUR: u32 = 8;

/// Facility-local closing hour (exclusive).
pub const CLOSING_HOUR: u32 = 22;

// ── Tournaments ──────────────────────────────────────────────────

pub const DEFAULT_TOURNAMENT_TYPE: &str = "beach_tennis";

pub const MAX_NAME_LEN: usize = 256;

pub const MAX_COURTS_PER_TOURNAMENT: usize = 64;

// ── Seeding ──────────────────────────────────────────────────────

pub const SEED_COURT_NAMES: [&str; 2] = ["Quadra 1", "Quadra 2"];

pub const SEED_TOURNAMENT_NAME: &str = "Torneio de Beach Tennis";

pub const SEED_TOURNAMENT_MAX_PARTICIPANTS: u32 = 64;

pub const SEED_TOURNAMENT_MAX_PER_GENDER: u32 = 32;

// ── Journal ──────────────────────────────────────────────────────

/// Bound of the group-commit channel between writers and the journal task.
pub const JOURNAL_CHANNEL_CAPACITY: usize = 4096;

/// Largest encoded event accepted on replay; anything bigger is treated as corruption.
pub const MAX_EVENT_BYTES: usize = 16 * 1024 * 1024;

// ── Scheduler ────────────────────────────────────────────────────

/// How often the compaction task checks the journal.
pub const COMPACT_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Attempts per scheduled run before giving up until the next occurrence.
pub const TASK_MAX_ATTEMPTS: u32 = 4;

/// First retry delay; doubles per attempt.
pub const TASK_RETRY_BASE: std::time::Duration = std::time::Duration::from_secs(2);

pub const TASK_RETRY_CAP: std::time::Duration = std::time::Duration::from_secs(60);
