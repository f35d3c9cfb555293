use std::collections::HashMap;

use chrono::NaiveDate;

use crate::clock::start_of_day;
use crate::model::*;

use super::error::msg;
use super::{Engine, EngineError};

impl Engine {
    // ── Courts & users ───────────────────────────────────────────

    pub async fn find_courts(&self) -> Result<Vec<Court>, EngineError> {
        Ok(self.store.courts().await?)
    }

    pub async fn find_court(&self, id: CourtId) -> Result<Court, EngineError> {
        self.store
            .court(id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::COURT_NOT_FOUND))
    }

    pub async fn find_user(&self, id: UserId) -> Result<User, EngineError> {
        self.load_user(id).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, EngineError> {
        Ok(self.store.user_by_email(email).await?)
    }

    // ── Reservations ─────────────────────────────────────────────

    /// Every reservation, earliest first, with court and owner.
    pub async fn find_all_reservations(&self) -> Result<Vec<ReservationView>, EngineError> {
        let courts = self.court_index().await?;
        let mut users: HashMap<UserId, Option<UserSummary>> = HashMap::new();
        let mut views = Vec::new();
        for r in self.store.reservations().await? {
            let Some(court) = courts.get(&r.court_id) else {
                continue;
            };
            if !users.contains_key(&r.user_id) {
                let summary = self.store.user(r.user_id).await?.as_ref().map(UserSummary::from);
                users.insert(r.user_id, summary);
            }
            views.push(ReservationView {
                id: r.id,
                start_time: r.start_time,
                court: court.clone(),
                user: users.get(&r.user_id).cloned().flatten(),
            });
        }
        Ok(views)
    }

    /// The user's reservations, earliest first, with court.
    pub async fn find_reservations_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ReservationView>, EngineError> {
        let courts = self.court_index().await?;
        Ok(self
            .store
            .reservations_by_user(user_id)
            .await?
            .into_iter()
            .filter_map(|r| {
                courts.get(&r.court_id).map(|court| ReservationView {
                    id: r.id,
                    start_time: r.start_time,
                    court: court.clone(),
                    user: None,
                })
            })
            .collect())
    }

    // ── Tournaments ──────────────────────────────────────────────

    pub async fn find_tournaments(&self) -> Result<Vec<TournamentDetails>, EngineError> {
        let mut all = Vec::new();
        for t in self.store.tournaments().await? {
            all.push(self.tournament_details(t).await?);
        }
        Ok(all)
    }

    pub async fn find_tournament(&self, id: TournamentId) -> Result<TournamentDetails, EngineError> {
        let t = self.load_tournament(id).await?;
        self.tournament_details(t).await
    }

    /// The active tournament on a facility calendar day, if any.
    pub async fn find_tournament_by_date(
        &self,
        day: NaiveDate,
    ) -> Result<Option<TournamentView>, EngineError> {
        match self.store.active_tournament_on(day).await? {
            Some(tournament) => {
                let courts = self.courts_of(&tournament).await?;
                Ok(Some(TournamentView { tournament, courts }))
            }
            None => Ok(None),
        }
    }

    /// Earliest active tournament whose day has not started yet.
    pub async fn find_next_tournament(&self) -> Result<Option<TournamentView>, EngineError> {
        let now = self.now();
        let next = self
            .store
            .tournaments()
            .await?
            .into_iter()
            .filter(|t| t.is_active && start_of_day(t.date) > now)
            .min_by_key(|t| (t.date, t.id));
        match next {
            Some(tournament) => {
                let courts = self.courts_of(&tournament).await?;
                Ok(Some(TournamentView { tournament, courts }))
            }
            None => Ok(None),
        }
    }

    // ── Registrations ────────────────────────────────────────────

    /// Registrations the user owns or is named partner in, newest first.
    pub async fn find_registrations_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RegistrationView>, EngineError> {
        let user = self.load_user(user_id).await?;
        let mut views = Vec::new();
        for reg in self.store.registrations_for_user(user.id, &user.email).await? {
            let owner = self.store.user(reg.user_id).await?;
            let tournament = self.store.tournament(reg.tournament_id).await?;
            views.push(RegistrationView {
                registration: reg,
                user: owner.as_ref().map(UserSummary::from),
                tournament,
            });
        }
        Ok(views)
    }

    /// All registrations of a tournament, oldest first, with registrant.
    pub async fn find_registrations_by_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<RegistrationView>, EngineError> {
        self.registration_views(tournament_id).await
    }

    pub async fn find_registration(&self, id: RegistrationId) -> Result<RegistrationView, EngineError> {
        let registration = self.load_registration(id).await?;
        let user = self.store.user(registration.user_id).await?;
        let tournament = self.store.tournament(registration.tournament_id).await?;
        Ok(RegistrationView {
            registration,
            user: user.as_ref().map(UserSummary::from),
            tournament,
        })
    }

    async fn tournament_details(&self, tournament: Tournament) -> Result<TournamentDetails, EngineError> {
        let courts = self.courts_of(&tournament).await?;
        let registrations = self.registration_views(tournament.id).await?;
        Ok(TournamentDetails {
            tournament,
            courts,
            registrations,
        })
    }

    async fn registration_views(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<RegistrationView>, EngineError> {
        let mut views = Vec::new();
        for reg in self.store.registrations_for_tournament(tournament_id).await? {
            let user = self.store.user(reg.user_id).await?;
            views.push(RegistrationView {
                registration: reg,
                user: user.as_ref().map(UserSummary::from),
                tournament: None,
            });
        }
        Ok(views)
    }

    async fn court_index(&self) -> Result<HashMap<CourtId, Court>, EngineError> {
        Ok(self
            .store
            .courts()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect())
    }
}
