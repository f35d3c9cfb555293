use std::time::Instant;

use tracing::info;

use crate::clock::start_of_day;
use crate::model::*;
use crate::observability::{REGISTRATIONS_CREATED_TOTAL, REGISTRATIONS_REJECTED_TOTAL};
use crate::store::{capacity_conflict, pairing_conflict};

use super::conflict::parse_category;
use super::error::msg;
use super::{record_outcome, Engine, EngineError};

impl Engine {
    /// Enter the caller, optionally with a partner, into a tournament.
    pub async fn register(
        &self,
        caller: &Principal,
        req: CreateRegistration,
    ) -> Result<RegistrationView, EngineError> {
        let started = Instant::now();
        let result = self.try_register(caller, req).await;
        record_outcome("register", REGISTRATIONS_REJECTED_TOTAL, started, &result);
        result
    }

    async fn try_register(
        &self,
        caller: &Principal,
        req: CreateRegistration,
    ) -> Result<RegistrationView, EngineError> {
        let user = self.load_user(caller.user_id).await?;
        let tournament = self.load_open_tournament(req.tournament_id).await?;
        let others = self.store.registrations_for_tournament(tournament.id).await?;

        if others.iter().any(|r| r.user_id == user.id) {
            return Err(EngineError::bad_request(msg::ALREADY_REGISTERED));
        }
        if let Some(conflict) = capacity_conflict(&tournament, &others, req.gender) {
            return Err(EngineError::bad_request(conflict.message()));
        }
        if tournament.status == LifecycleStatus::Finished {
            return Err(EngineError::bad_request(msg::TOURNAMENT_FINISHED));
        }
        let category = req
            .category
            .as_deref()
            .map(|c| parse_category(c, tournament.categories.as_deref()))
            .transpose()?;
        let partner_email = match req.partner_email {
            Some(email) => Some(self.resolve_partner(&email).await?),
            None => None,
        };
        if let Some(conflict) = pairing_conflict(&others, &user.email, partner_email.as_deref()) {
            return Err(EngineError::bad_request(conflict.message()));
        }

        let registration = self
            .store
            .insert_registration(NewRegistration {
                tournament_id: tournament.id,
                user_id: user.id,
                user_email: user.email.clone(),
                registered_at: self.now(),
                category,
                gender: req.gender,
                partner_email,
            })
            .await?;

        metrics::counter!(REGISTRATIONS_CREATED_TOTAL).increment(1);
        info!(
            "registration {} created: user {} in tournament {} ({})",
            registration.id, user.id, tournament.id, registration.gender
        );
        Ok(RegistrationView {
            registration,
            user: Some(UserSummary::from(&user)),
            tournament: Some(tournament),
        })
    }

    /// Change category and/or partner of one of the caller's registrations.
    pub async fn update_registration(
        &self,
        caller: &Principal,
        id: RegistrationId,
        req: UpdateRegistration,
    ) -> Result<RegistrationView, EngineError> {
        let mut registration = self.load_registration(id).await?;
        if registration.user_id != caller.user_id {
            return Err(EngineError::bad_request(msg::NOT_OWNER_UPDATE_REGISTRATION));
        }
        let user = self.load_user(caller.user_id).await?;
        let tournament = self.load_open_tournament(registration.tournament_id).await?;

        if let Some(raw) = req.category.as_deref() {
            registration.category = Some(parse_category(raw, tournament.categories.as_deref())?);
        }
        if let Some(email) = req.partner_email {
            let partner = self.resolve_partner(&email).await?;
            let others: Vec<Registration> = self
                .store
                .registrations_for_tournament(tournament.id)
                .await?
                .into_iter()
                .filter(|r| r.id != registration.id)
                .collect();
            if let Some(conflict) = pairing_conflict(&others, &registration.user_email, Some(&partner)) {
                return Err(EngineError::bad_request(conflict.message()));
            }
            registration.partner_email = Some(partner);
        }

        let registration = self.store.update_registration(registration).await?;
        info!("registration {id} updated by user {}", user.id);
        Ok(RegistrationView {
            registration,
            user: Some(UserSummary::from(&user)),
            tournament: Some(tournament),
        })
    }

    /// Withdraw from a tournament. Not allowed once the tournament day has begun.
    pub async fn cancel_registration(
        &self,
        caller: &Principal,
        id: RegistrationId,
    ) -> Result<(), EngineError> {
        let registration = self.load_registration(id).await?;
        if registration.user_id != caller.user_id {
            return Err(EngineError::bad_request(msg::NOT_OWNER_CANCEL_REGISTRATION));
        }
        let tournament = self.load_tournament(registration.tournament_id).await?;
        if start_of_day(tournament.date) < self.now() {
            return Err(EngineError::bad_request(msg::CANCEL_AFTER_EVENT));
        }
        if !self.store.delete_registration(id).await? {
            return Err(EngineError::not_found(msg::REGISTRATION_NOT_FOUND));
        }
        info!("registration {id} cancelled by user {}", caller.user_id);
        Ok(())
    }

    pub(super) async fn load_user(&self, id: UserId) -> Result<User, EngineError> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::USER_NOT_FOUND))
    }

    pub(super) async fn load_registration(&self, id: RegistrationId) -> Result<Registration, EngineError> {
        self.store
            .registration(id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::REGISTRATION_NOT_FOUND))
    }

    /// Exists, is active, and accepts registrations.
    async fn load_open_tournament(&self, id: TournamentId) -> Result<Tournament, EngineError> {
        let tournament = self.load_tournament(id).await?;
        if !tournament.is_active {
            return Err(EngineError::bad_request(msg::TOURNAMENT_INACTIVE));
        }
        if !tournament.is_registration_open {
            return Err(EngineError::bad_request(msg::REGISTRATION_CLOSED));
        }
        Ok(tournament)
    }

    /// The partner must be a known user; returns their stored email.
    async fn resolve_partner(&self, email: &str) -> Result<String, EngineError> {
        let partner = self
            .store
            .user_by_email(email)
            .await?
            .ok_or_else(|| EngineError::bad_request(msg::PARTNER_NOT_FOUND))?;
        Ok(partner.email)
    }
}
