use tracing::info;

use crate::limits::DEFAULT_TOURNAMENT_TYPE;
use crate::model::*;

use super::conflict::{normalize_court_ids, parse_categories, parse_date, validate_tournament_name};
use super::error::msg;
use super::{Engine, EngineError};

impl Engine {
    pub async fn create_tournament(&self, req: CreateTournament) -> Result<TournamentView, EngineError> {
        validate_tournament_name(&req.name)?;
        let date = parse_date(&req.date)?;
        let categories = req.categories.as_deref().map(parse_categories).transpose()?;

        if self.store.active_tournament_on(date).await?.is_some() {
            return Err(EngineError::bad_request(msg::DATE_TAKEN));
        }
        let courts = self.resolve_courts(&req.court_ids).await?;

        let tournament = self
            .store
            .insert_tournament(NewTournament {
                name: req.name,
                date,
                kind: req.kind.unwrap_or_else(|| DEFAULT_TOURNAMENT_TYPE.to_string()),
                is_registration_open: req.is_registration_open.unwrap_or(true),
                max_participants: req.max_participants,
                max_participants_by_gender: req.max_participants_by_gender,
                categories,
                court_ids: courts.iter().map(|c| c.id).collect(),
            })
            .await?;

        info!(
            "tournament {} '{}' created for {} on {} courts",
            tournament.id,
            tournament.name,
            tournament.date,
            courts.len()
        );
        Ok(TournamentView { tournament, courts })
    }

    /// Partial update. Only supplied fields change; an unknown court rejects the whole update.
    pub async fn update_tournament(
        &self,
        id: TournamentId,
        req: UpdateTournament,
    ) -> Result<TournamentView, EngineError> {
        let mut tournament = self.load_tournament(id).await?;

        if let Some(name) = req.name {
            validate_tournament_name(&name)?;
            tournament.name = name;
        }
        if let Some(raw) = req.date {
            tournament.date = parse_date(&raw)?;
        }
        if let Some(kind) = req.kind {
            tournament.kind = kind;
        }
        if let Some(active) = req.is_active {
            tournament.is_active = active;
        }
        if let Some(open) = req.is_registration_open {
            tournament.is_registration_open = open;
        }
        if let Some(max) = req.max_participants {
            tournament.max_participants = Some(max);
        }
        if let Some(caps) = req.max_participants_by_gender {
            tournament.max_participants_by_gender = Some(caps);
        }
        if let Some(raw) = req.categories {
            tournament.categories = Some(parse_categories(&raw)?);
        }
        let courts = match req.court_ids {
            Some(ids) => {
                let courts = self.resolve_courts(&ids).await?;
                tournament.court_ids = courts.iter().map(|c| c.id).collect();
                courts
            }
            None => self.courts_of(&tournament).await?,
        };

        if tournament.is_active
            && let Some(other) = self.store.active_tournament_on(tournament.date).await?
            && other.id != tournament.id
        {
            return Err(EngineError::bad_request(msg::DATE_TAKEN));
        }

        let tournament = self.store.update_tournament(tournament).await?;
        info!("tournament {id} updated");
        Ok(TournamentView { tournament, courts })
    }

    /// Flip whether the tournament accepts registrations.
    pub async fn toggle_registration(&self, id: TournamentId) -> Result<TournamentView, EngineError> {
        let mut tournament = self.load_tournament(id).await?;
        tournament.is_registration_open = !tournament.is_registration_open;
        let tournament = self.store.update_tournament(tournament).await?;
        info!(
            "tournament {id} registration {}",
            if tournament.is_registration_open { "opened" } else { "closed" }
        );
        let courts = self.courts_of(&tournament).await?;
        Ok(TournamentView { tournament, courts })
    }

    /// Deletes the tournament together with its registrations.
    pub async fn remove_tournament(&self, id: TournamentId) -> Result<(), EngineError> {
        self.load_tournament(id).await?;
        if !self.store.delete_tournament(id).await? {
            return Err(EngineError::not_found(msg::TOURNAMENT_NOT_FOUND));
        }
        info!("tournament {id} removed");
        Ok(())
    }

    pub(super) async fn load_tournament(&self, id: TournamentId) -> Result<Tournament, EngineError> {
        self.store
            .tournament(id)
            .await?
            .ok_or_else(|| EngineError::not_found(msg::TOURNAMENT_NOT_FOUND))
    }

    /// Every id must resolve; returns the courts ordered by id.
    async fn resolve_courts(&self, ids: &[CourtId]) -> Result<Vec<Court>, EngineError> {
        let ids = normalize_court_ids(ids)?;
        let mut courts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.court(id).await? {
                Some(court) => courts.push(court),
                None => return Err(EngineError::bad_request(msg::UNKNOWN_COURTS)),
            }
        }
        Ok(courts)
    }

    pub(super) async fn courts_of(&self, tournament: &Tournament) -> Result<Vec<Court>, EngineError> {
        let mut courts = Vec::with_capacity(tournament.court_ids.len());
        for id in &tournament.court_ids {
            if let Some(court) = self.store.court(*id).await? {
                courts.push(court);
            }
        }
        Ok(courts)
    }
}
