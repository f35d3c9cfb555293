//! Startup seeding. Each routine checks for existing rows first and can be run on
//! every boot.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::limits::{
    DEFAULT_TOURNAMENT_TYPE, SEED_COURT_NAMES, SEED_TOURNAMENT_MAX_PARTICIPANTS,
    SEED_TOURNAMENT_MAX_PER_GENDER, SEED_TOURNAMENT_NAME,
};
use crate::model::*;
use crate::store::{Store, StoreError};

/// Create the default courts when the facility has none. Returns the courts created.
pub async fn seed_courts(store: &dyn Store) -> Result<Vec<Court>, StoreError> {
    if !store.courts().await?.is_empty() {
        debug!("seed: courts present, skipping");
        return Ok(Vec::new());
    }
    let mut created = Vec::with_capacity(SEED_COURT_NAMES.len());
    for name in SEED_COURT_NAMES {
        created.push(store.insert_court(name).await?);
    }
    info!("seed: created {} courts", created.len());
    Ok(created)
}

/// Create the default beach-tennis tournament on `date`, over every court,
/// unless an active tournament already holds that day.
pub async fn seed_tournament(
    store: &dyn Store,
    date: NaiveDate,
) -> Result<Option<Tournament>, StoreError> {
    if let Some(existing) = store.active_tournament_on(date).await? {
        debug!("seed: tournament {} already on {date}, skipping", existing.id);
        return Ok(None);
    }
    let court_ids = store.courts().await?.into_iter().map(|c| c.id).collect();
    let new = NewTournament {
        name: SEED_TOURNAMENT_NAME.to_string(),
        date,
        kind: DEFAULT_TOURNAMENT_TYPE.to_string(),
        is_registration_open: true,
        max_participants: Some(SEED_TOURNAMENT_MAX_PARTICIPANTS),
        max_participants_by_gender: Some(GenderCaps {
            male: SEED_TOURNAMENT_MAX_PER_GENDER,
            female: SEED_TOURNAMENT_MAX_PER_GENDER,
        }),
        categories: Some(Category::ALL.to_vec()),
        court_ids,
    };
    match store.insert_tournament(new).await {
        Ok(tournament) => {
            info!("seed: tournament {} created for {date}", tournament.id);
            Ok(Some(tournament))
        }
        // Lost a race against another writer for the same day.
        Err(StoreError::DateTaken(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
