//! Capability-scoped storage, one trait per entity.
//!
//! The lifecycle code only talks to these traits. [`InMemoryStore`] implements
//! all of them; attached to a journal it is the durable store, detached it is
//! the fake used in tests. Uniqueness and capacity constraints are enforced on
//! write, inside the same commit that persists the record.

mod constraints;
mod journal;
mod memory;
mod wal;

pub use constraints::{capacity_conflict, pairing_conflict, CapacityConflict, PairingConflict};
pub use journal::Journal;
pub use memory::InMemoryStore;
pub use wal::Wal;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("unknown court: {0}")]
    UnknownCourt(CourtId),
    #[error("court {court_id} already booked at {start_time}")]
    SlotTaken {
        court_id: CourtId,
        start_time: DateTime<Utc>,
    },
    #[error("an active tournament already occupies {0}")]
    DateTaken(NaiveDate),
    #[error("user already registered in tournament")]
    AlreadyRegistered,
    #[error("tournament is finished")]
    TournamentFinished,
    #[error("registration capacity reached: {0:?}")]
    Capacity(CapacityConflict),
    #[error("partner pairing conflict: {0:?}")]
    Pairing(PairingConflict),
    #[error("email already registered: {0}")]
    EmailTaken(String),
    #[error("journal error: {0}")]
    Journal(String),
}

#[async_trait]
pub trait CourtStore: Send + Sync {
    async fn insert_court(&self, name: &str) -> Result<Court, StoreError>;
    async fn court(&self, id: CourtId) -> Result<Option<Court>, StoreError>;
    /// All courts, ordered by id.
    async fn courts(&self) -> Result<Vec<Court>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    /// Emails match after trimming and ignoring ASCII case.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Fails with [`StoreError::SlotTaken`] if the (court, instant) pair is booked.
    async fn insert_reservation(&self, new: NewReservation) -> Result<Reservation, StoreError>;
    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;
    async fn reservation_at(
        &self,
        court_id: CourtId,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Reservation>, StoreError>;
    /// Ordered by start time ascending.
    async fn reservations(&self) -> Result<Vec<Reservation>, StoreError>;
    /// Ordered by start time ascending.
    async fn reservations_by_user(&self, user_id: UserId) -> Result<Vec<Reservation>, StoreError>;
    async fn move_reservation(
        &self,
        id: ReservationId,
        start_time: DateTime<Utc>,
    ) -> Result<Reservation, StoreError>;
    /// Returns false if there was nothing to delete.
    async fn delete_reservation(&self, id: ReservationId) -> Result<bool, StoreError>;
    /// Deletes every reservation starting strictly before `cutoff`; returns how many.
    async fn delete_reservations_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Fails with [`StoreError::DateTaken`] if another active tournament has the same day.
    async fn insert_tournament(&self, new: NewTournament) -> Result<Tournament, StoreError>;
    async fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>, StoreError>;
    /// Ordered by id.
    async fn tournaments(&self) -> Result<Vec<Tournament>, StoreError>;
    async fn active_tournament_on(&self, day: NaiveDate) -> Result<Option<Tournament>, StoreError>;
    /// Replaces the row but keeps the stored status; a finished tournament stays closed.
    /// Returns the row as written.
    async fn update_tournament(&self, tournament: Tournament) -> Result<Tournament, StoreError>;
    /// Deletes the tournament and its registrations.
    async fn delete_tournament(&self, id: TournamentId) -> Result<bool, StoreError>;
    /// Marks the tournament finished and closes registration. False if already finished.
    async fn finalize_tournament(&self, id: TournamentId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Enforces one entry per user, gender and overall caps, and partner pairing.
    /// Fails with [`StoreError::TournamentFinished`] once the tournament is finished.
    async fn insert_registration(&self, new: NewRegistration) -> Result<Registration, StoreError>;
    async fn registration(&self, id: RegistrationId) -> Result<Option<Registration>, StoreError>;
    /// Oldest first.
    async fn registrations_for_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<Registration>, StoreError>;
    /// Registrations the user owns or is named partner in, newest first.
    async fn registrations_for_user(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<Vec<Registration>, StoreError>;
    /// Replaces the row but keeps the stored status. Returns the row as written.
    async fn update_registration(&self, registration: Registration) -> Result<Registration, StoreError>;
    async fn delete_registration(&self, id: RegistrationId) -> Result<bool, StoreError>;
    /// False if already finished.
    async fn finalize_registration(&self, id: RegistrationId) -> Result<bool, StoreError>;
}

/// Everything the engine needs from persistence.
pub trait Store: CourtStore + UserStore + ReservationStore + TournamentStore + RegistrationStore {}

impl<T> Store for T where T: CourtStore + UserStore + ReservationStore + TournamentStore + RegistrationStore {}
