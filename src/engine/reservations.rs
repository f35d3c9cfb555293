use std::time::Instant;

use tracing::{debug, info};

use crate::model::*;
use crate::observability::{RESERVATIONS_CREATED_TOTAL, RESERVATIONS_REJECTED_TOTAL};
use crate::store::StoreError;

use super::availability::SlotStatus;
use super::conflict::{parse_instant, validate_moved_slot, validate_new_slot};
use super::error::msg;
use super::{record_outcome, Engine, EngineError};

impl Engine {
    /// Book `court_id` at one instant for the caller.
    pub async fn create_reservation(
        &self,
        caller: &Principal,
        req: CreateReservation,
    ) -> Result<ReservationView, EngineError> {
        let started = Instant::now();
        let result = self.try_create_reservation(caller, req).await;
        record_outcome("create_reservation", RESERVATIONS_REJECTED_TOTAL, started, &result);
        result
    }

    async fn try_create_reservation(
        &self,
        caller: &Principal,
        req: CreateReservation,
    ) -> Result<ReservationView, EngineError> {
        let start_time = parse_instant(&req.start_time)?;
        validate_new_slot(self.now(), start_time)?;

        let court = self
            .store
            .court(req.court_id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::COURT_NOT_FOUND))?;

        match self.slot_status(court.id, start_time).await? {
            SlotStatus::Free => {}
            SlotStatus::TournamentDay(_) => return Err(EngineError::bad_request(msg::TOURNAMENT_DAY)),
            SlotStatus::Booked(_) => return Err(EngineError::bad_request(msg::SLOT_TAKEN)),
        }

        let user = self
            .store
            .user_by_email(&caller.email)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::USER_NOT_FOUND))?;

        let reservation = self
            .store
            .insert_reservation(NewReservation {
                court_id: court.id,
                user_id: user.id,
                start_time,
            })
            .await?;

        metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {} created: court {} at {} by user {}",
            reservation.id, court.id, start_time, user.id
        );
        Ok(ReservationView {
            id: reservation.id,
            start_time: reservation.start_time,
            court,
            user: Some(UserSummary::from(&user)),
        })
    }

    /// Move one of the caller's reservations to another instant on the same court.
    pub async fn update_reservation(
        &self,
        caller: &Principal,
        id: ReservationId,
        req: UpdateReservation,
    ) -> Result<ReservationView, EngineError> {
        let started = Instant::now();
        let result = self.try_update_reservation(caller, id, req).await;
        record_outcome("update_reservation", RESERVATIONS_REJECTED_TOTAL, started, &result);
        result
    }

    async fn try_update_reservation(
        &self,
        caller: &Principal,
        id: ReservationId,
        req: UpdateReservation,
    ) -> Result<ReservationView, EngineError> {
        let reservation = self
            .store
            .reservation(id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::RESERVATION_NOT_FOUND))?;
        if reservation.user_id != caller.user_id {
            return Err(EngineError::bad_request(msg::NOT_OWNER_UPDATE_RESERVATION));
        }

        let start_time = parse_instant(&req.start_time)?;
        validate_moved_slot(self.now(), start_time)?;

        match self.slot_status(reservation.court_id, start_time).await? {
            SlotStatus::TournamentDay(_) => {
                return Err(EngineError::bad_request(msg::TOURNAMENT_DAY));
            }
            SlotStatus::Booked(holder) if holder != reservation.id => {
                return Err(EngineError::bad_request(msg::MOVE_SLOT_TAKEN));
            }
            _ => {}
        }

        let moved = if start_time == reservation.start_time {
            debug!("reservation {id} already at {start_time}");
            reservation
        } else {
            let moved = self
                .store
                .move_reservation(id, start_time)
                .await
                .map_err(|e| match e {
                    StoreError::SlotTaken { .. } => EngineError::bad_request(msg::MOVE_SLOT_TAKEN),
                    other => other.into(),
                })?;
            info!("reservation {id} moved to {start_time}");
            moved
        };

        let court = self
            .store
            .court(moved.court_id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::COURT_NOT_FOUND))?;
        let user = self.store.user(moved.user_id).await?;
        Ok(ReservationView {
            id: moved.id,
            start_time: moved.start_time,
            court,
            user: user.as_ref().map(UserSummary::from),
        })
    }

    pub async fn remove_reservation(
        &self,
        caller: &Principal,
        id: ReservationId,
    ) -> Result<(), EngineError> {
        let reservation = self
            .store
            .reservation(id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::RESERVATION_NOT_FOUND))?;
        if reservation.user_id != caller.user_id {
            return Err(EngineError::bad_request(msg::NOT_OWNER_DELETE_RESERVATION));
        }
        if !self.store.delete_reservation(id).await? {
            return Err(EngineError::not_found(msg::RESERVATION_NOT_FOUND));
        }
        info!("reservation {id} removed by user {}", caller.user_id);
        Ok(())
    }
}
