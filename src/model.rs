use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type CourtId = u64;
pub type UserId = u64;
pub type ReservationId = u64;
pub type TournamentId = u64;
pub type RegistrationId = u64;

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub id: CourtId,
    pub name: String,
}

/// Read-side view of an identity record. Owned by the identity subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub federated_id: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub federated_id: Option<String>,
    pub email_verified: bool,
}

/// Canonical form used to store and look up emails.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl NewUser {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            password_hash: None,
            federated_id: None,
            email_verified: false,
        }
    }
}

/// A single-instant booking of one court by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub court_id: CourtId,
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
}

/// Shared by tournaments and registrations; `Finished` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleStatus {
    #[default]
    #[serde(rename = "ativo")]
    Active,
    #[serde(rename = "finalizado")]
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => f.write_str("male"),
            Gender::Female => f.write_str("female"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderCaps {
    pub male: u32,
    pub female: u32,
}

impl GenderCaps {
    pub fn cap_for(&self, gender: Gender) -> u32 {
        match gender {
            Gender::Male => self.male,
            Gender::Female => self.female,
        }
    }
}

/// Skill bracket a registrant competes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    A,
    B,
    C,
    D,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::A, Category::B, Category::C, Category::D];
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Category::A),
            "B" => Ok(Category::B),
            "C" => Ok(Category::C),
            "D" => Ok(Category::D),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::A => "A",
            Category::B => "B",
            Category::C => "C",
            Category::D => "D",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    /// Facility-civil calendar day of the event.
    pub date: NaiveDate,
    pub kind: String,
    pub is_active: bool,
    pub is_registration_open: bool,
    pub status: LifecycleStatus,
    pub max_participants: Option<u32>,
    pub max_participants_by_gender: Option<GenderCaps>,
    pub categories: Option<Vec<Category>>,
    pub court_ids: Vec<CourtId>,
}

impl Tournament {
    pub fn uses_court(&self, court_id: CourtId) -> bool {
        self.court_ids.contains(&court_id)
    }

    /// Whether this tournament claims `day` for the one-active-per-day rule.
    pub fn occupies(&self, day: NaiveDate) -> bool {
        self.is_active && self.date == day
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    /// Email of the registrant, captured at registration for pairing checks.
    pub user_email: String,
    pub registered_at: DateTime<Utc>,
    pub category: Option<Category>,
    pub gender: Gender,
    pub partner_email: Option<String>,
    pub status: LifecycleStatus,
}

// ── Caller identity ──────────────────────────────────────────────

/// Authenticated caller, as supplied by the request layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
}

impl Principal {
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
        }
    }
}

// ── Request payloads (shape-validated upstream) ──────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReservation {
    pub court_id: CourtId,
    /// ISO-8601 instant.
    pub start_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReservation {
    pub start_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTournament {
    pub name: String,
    /// ISO date (`YYYY-MM-DD`) or ISO-8601 instant.
    pub date: String,
    pub court_ids: Vec<CourtId>,
    pub kind: Option<String>,
    pub is_registration_open: Option<bool>,
    pub max_participants: Option<u32>,
    pub max_participants_by_gender: Option<GenderCaps>,
    pub categories: Option<Vec<String>>,
}

/// Partial update: `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTournament {
    pub name: Option<String>,
    pub date: Option<String>,
    pub court_ids: Option<Vec<CourtId>>,
    pub kind: Option<String>,
    pub is_active: Option<bool>,
    pub is_registration_open: Option<bool>,
    pub max_participants: Option<u32>,
    pub max_participants_by_gender: Option<GenderCaps>,
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRegistration {
    pub tournament_id: TournamentId,
    pub category: Option<String>,
    pub partner_email: Option<String>,
    pub gender: Gender,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRegistration {
    pub category: Option<String>,
    pub partner_email: Option<String>,
}

// ── Store inputs ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub court_id: CourtId,
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTournament {
    pub name: String,
    pub date: NaiveDate,
    pub kind: String,
    pub is_registration_open: bool,
    pub max_participants: Option<u32>,
    pub max_participants_by_gender: Option<GenderCaps>,
    pub categories: Option<Vec<Category>>,
    pub court_ids: Vec<CourtId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRegistration {
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub user_email: String,
    pub registered_at: DateTime<Utc>,
    pub category: Option<Category>,
    pub gender: Gender,
    pub partner_email: Option<String>,
}

// ── Query views ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Reservation with its court attached, and its owner when requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationView {
    pub id: ReservationId,
    pub start_time: DateTime<Utc>,
    pub court: Court,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TournamentView {
    pub tournament: Tournament,
    pub courts: Vec<Court>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationView {
    pub registration: Registration,
    pub user: Option<UserSummary>,
    pub tournament: Option<Tournament>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TournamentDetails {
    pub tournament: Tournament,
    pub courts: Vec<Court>,
    pub registrations: Vec<RegistrationView>,
}

// ── Journal record ───────────────────────────────────────────────

/// Every state change the store accepts. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CourtCreated(Court),
    UserCreated(User),
    ReservationCreated(Reservation),
    ReservationMoved {
        id: ReservationId,
        start_time: DateTime<Utc>,
    },
    ReservationDeleted {
        id: ReservationId,
    },
    ReservationsPurged {
        before: DateTime<Utc>,
    },
    TournamentCreated(Tournament),
    TournamentUpdated(Tournament),
    TournamentDeleted {
        id: TournamentId,
    },
    TournamentFinalized {
        id: TournamentId,
    },
    RegistrationCreated(Registration),
    RegistrationUpdated(Registration),
    RegistrationDeleted {
        id: RegistrationId,
    },
    RegistrationFinalized {
        id: RegistrationId,
    },
}
