use tracing::{info, warn};

use crate::clock::end_of_day;
use crate::model::*;

use super::{Engine, EngineError};

/// Outcome of one finalize pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub tournaments: usize,
    pub registrations: usize,
    /// Rows that failed to persist; the next pass picks them up again.
    pub failures: usize,
}

impl Engine {
    /// Delete every reservation starting strictly before now.
    pub async fn purge_past_reservations(&self) -> Result<usize, EngineError> {
        let now = self.now();
        let removed = self.store.delete_reservations_before(now).await?;
        if removed > 0 {
            info!("removed {removed} past reservations (before {now})");
        }
        Ok(removed)
    }

    /// Finish every tournament whose facility day has ended, and its registrations.
    ///
    /// A tournament already finished but holding unfinished registrations is
    /// processed again. One failing row does not stop the others.
    pub async fn finalize_past_tournaments(&self) -> Result<FinalizeReport, EngineError> {
        let now = self.now();
        let mut report = FinalizeReport::default();

        for tournament in self.store.tournaments().await? {
            if end_of_day(tournament.date) >= now {
                continue;
            }
            let registrations = match self.store.registrations_for_tournament(tournament.id).await {
                Ok(regs) => regs,
                Err(e) => {
                    warn!("finalize: cannot list registrations of tournament {}: {e}", tournament.id);
                    report.failures += 1;
                    continue;
                }
            };
            let pending: Vec<&Registration> = registrations
                .iter()
                .filter(|r| r.status != LifecycleStatus::Finished)
                .collect();
            if tournament.status == LifecycleStatus::Finished && pending.is_empty() {
                continue;
            }

            match self.store.finalize_tournament(tournament.id).await {
                Ok(true) => {
                    report.tournaments += 1;
                    info!("tournament {} '{}' finalized", tournament.id, tournament.name);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("finalize: tournament {} failed: {e}", tournament.id);
                    report.failures += 1;
                }
            }
            for reg in pending {
                match self.store.finalize_registration(reg.id).await {
                    Ok(true) => report.registrations += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("finalize: registration {} failed: {e}", reg.id);
                        report.failures += 1;
                    }
                }
            }
        }
        Ok(report)
    }
}
