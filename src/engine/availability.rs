use chrono::{DateTime, NaiveDate, Utc};

use crate::clock::facility_day;
use crate::model::*;

use super::{Engine, EngineError};

/// Why a (court, instant) pair can or cannot be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Free,
    /// An active tournament uses the court on that facility day.
    TournamentDay(TournamentId),
    Booked(ReservationId),
}

impl SlotStatus {
    pub fn is_free(&self) -> bool {
        matches!(self, SlotStatus::Free)
    }
}

impl Engine {
    /// Tournament blocking wins over an existing booking when both apply.
    ///
    /// Does not re-check the booking window or business hours.
    pub async fn slot_status(
        &self,
        court_id: CourtId,
        instant: DateTime<Utc>,
    ) -> Result<SlotStatus, EngineError> {
        if let Some(t) = self.store.active_tournament_on(facility_day(instant)).await?
            && t.uses_court(court_id)
        {
            return Ok(SlotStatus::TournamentDay(t.id));
        }
        if let Some(r) = self.store.reservation_at(court_id, instant).await? {
            return Ok(SlotStatus::Booked(r.id));
        }
        Ok(SlotStatus::Free)
    }

    pub async fn is_court_free(
        &self,
        court_id: CourtId,
        instant: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        Ok(self.slot_status(court_id, instant).await?.is_free())
    }

    /// True iff an active tournament on `day` includes the court.
    pub async fn is_court_reserved_for_tournament(
        &self,
        court_id: CourtId,
        day: NaiveDate,
    ) -> Result<bool, EngineError> {
        Ok(self
            .store
            .active_tournament_on(day)
            .await?
            .is_some_and(|t| t.uses_court(court_id)))
    }
}
