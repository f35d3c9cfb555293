use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::model::*;

use super::constraints::{capacity_conflict, pairing_conflict};
use super::journal::Journal;
use super::wal::Wal;
use super::{
    CourtStore, RegistrationStore, ReservationStore, StoreError, TournamentStore, UserStore,
};

#[derive(Default)]
struct Sequence(AtomicU64);

impl Sequence {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make sure ids handed out later never collide with `seen`.
    fn observe(&self, seen: u64) {
        self.0.fetch_max(seen, Ordering::SeqCst);
    }
}

/// DashMap-backed implementation of every storage trait.
///
/// Reads go straight to the tables. Writes are turned into an [`Event`] and
/// pushed through [`InMemoryStore::commit`], which checks constraints, journals
/// the event when a journal is attached, then applies it, all under one gate so
/// no other write can slip between the check and the apply.
pub struct InMemoryStore {
    courts: DashMap<CourtId, Court>,
    users: DashMap<UserId, User>,
    user_emails: DashMap<String, UserId>,
    reservations: DashMap<ReservationId, Reservation>,
    /// (court, start) → reservation; the slot uniqueness index.
    slots: DashMap<(CourtId, DateTime<Utc>), ReservationId>,
    tournaments: DashMap<TournamentId, Tournament>,
    registrations: DashMap<RegistrationId, Registration>,

    court_seq: Sequence,
    user_seq: Sequence,
    reservation_seq: Sequence,
    tournament_seq: Sequence,
    registration_seq: Sequence,

    commit_gate: Mutex<()>,
    journal: Option<Journal>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Volatile store with no journal.
    pub fn new() -> Self {
        Self {
            courts: DashMap::new(),
            users: DashMap::new(),
            user_emails: DashMap::new(),
            reservations: DashMap::new(),
            slots: DashMap::new(),
            tournaments: DashMap::new(),
            registrations: DashMap::new(),
            court_seq: Sequence::default(),
            user_seq: Sequence::default(),
            reservation_seq: Sequence::default(),
            tournament_seq: Sequence::default(),
            registration_seq: Sequence::default(),
            commit_gate: Mutex::new(()),
            journal: None,
        }
    }

    /// Durable store: replay the journal at `path`, then keep appending to it.
    /// Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let mut store = Self::new();
        for event in &events {
            store.apply(event);
        }
        info!("replayed {} events from {}", events.len(), path.display());
        store.journal = Some(Journal::spawn(Wal::open(path)?));
        Ok(store)
    }

    /// Rewrite the journal as the minimal event list that recreates the current state.
    /// No-op without a journal.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let _gate = self.commit_gate.lock().await;
        journal.rewrite(self.snapshot_events()).await
    }

    /// Compact once more than `threshold` events were appended since the last compaction.
    pub async fn compact_if_needed(&self, threshold: u64) -> Result<bool, StoreError> {
        let Some(journal) = &self.journal else {
            return Ok(false);
        };
        if journal.appends_since_compact().await <= threshold {
            return Ok(false);
        }
        self.compact().await?;
        Ok(true)
    }

    fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        events.extend(sorted_values(&self.courts, |c| c.id).into_iter().map(Event::CourtCreated));
        events.extend(sorted_values(&self.users, |u| u.id).into_iter().map(Event::UserCreated));
        events.extend(
            sorted_values(&self.reservations, |r| r.id)
                .into_iter()
                .map(Event::ReservationCreated),
        );
        events.extend(
            sorted_values(&self.tournaments, |t| t.id)
                .into_iter()
                .map(Event::TournamentCreated),
        );
        events.extend(
            sorted_values(&self.registrations, |r| r.id)
                .into_iter()
                .map(Event::RegistrationCreated),
        );
        events
    }

    // ── Commit path ──────────────────────────────────────────────

    /// Check, journal, apply. Returns the number of rows the event touched;
    /// 0 means the event was a no-op and was not journaled.
    async fn commit(&self, event: Event) -> Result<usize, StoreError> {
        Ok(self.commit_event(event).await?.0)
    }

    /// [`commit`](Self::commit), also handing back the event as it was written.
    async fn commit_event(&self, event: Event) -> Result<(usize, Event), StoreError> {
        let _gate = self.commit_gate.lock().await;
        let event = self.reconcile(event);
        if !self.check(&event)? {
            return Ok((0, event));
        }
        if let Some(journal) = &self.journal {
            journal.append(&event).await?;
        }
        let touched = self.apply(&event);
        Ok((touched, event))
    }

    /// Whole-row updates never move lifecycle status; only the finalize events do.
    /// A row read before a finalize keeps the stored status, and a finished
    /// tournament stays closed for registration.
    fn reconcile(&self, event: Event) -> Event {
        match event {
            Event::TournamentUpdated(mut t) => {
                if let Some(stored) = self.tournaments.get(&t.id) {
                    t.status = stored.status;
                    if stored.status == LifecycleStatus::Finished {
                        t.is_registration_open = false;
                    }
                }
                Event::TournamentUpdated(t)
            }
            Event::RegistrationUpdated(mut reg) => {
                if let Some(stored) = self.registrations.get(&reg.id) {
                    reg.status = stored.status;
                }
                Event::RegistrationUpdated(reg)
            }
            other => other,
        }
    }

    /// Validate `event` against current state. `Ok(false)` marks an idempotent no-op.
    fn check(&self, event: &Event) -> Result<bool, StoreError> {
        match event {
            Event::CourtCreated(_) => Ok(true),
            Event::UserCreated(user) => {
                if self.user_emails.contains_key(&normalize_email(&user.email)) {
                    return Err(StoreError::EmailTaken(user.email.clone()));
                }
                Ok(true)
            }
            Event::ReservationCreated(r) => {
                if !self.courts.contains_key(&r.court_id) {
                    return Err(StoreError::NotFound("court"));
                }
                if !self.users.contains_key(&r.user_id) {
                    return Err(StoreError::NotFound("user"));
                }
                if self.slots.contains_key(&(r.court_id, r.start_time)) {
                    return Err(StoreError::SlotTaken {
                        court_id: r.court_id,
                        start_time: r.start_time,
                    });
                }
                Ok(true)
            }
            Event::ReservationMoved { id, start_time } => {
                let court_id = self
                    .reservations
                    .get(id)
                    .map(|r| r.court_id)
                    .ok_or(StoreError::NotFound("reservation"))?;
                match self.slots.get(&(court_id, *start_time)) {
                    Some(holder) if *holder != *id => Err(StoreError::SlotTaken {
                        court_id,
                        start_time: *start_time,
                    }),
                    _ => Ok(true),
                }
            }
            Event::ReservationDeleted { id } => Ok(self.reservations.contains_key(id)),
            Event::ReservationsPurged { before } => {
                Ok(self.reservations.iter().any(|r| r.start_time < *before))
            }
            Event::TournamentCreated(t) => {
                self.check_tournament(t)?;
                Ok(true)
            }
            Event::TournamentUpdated(t) => {
                if !self.tournaments.contains_key(&t.id) {
                    return Err(StoreError::NotFound("tournament"));
                }
                self.check_tournament(t)?;
                Ok(true)
            }
            Event::TournamentDeleted { id } => Ok(self.tournaments.contains_key(id)),
            Event::TournamentFinalized { id } => self
                .tournaments
                .get(id)
                .map(|t| t.status != LifecycleStatus::Finished)
                .ok_or(StoreError::NotFound("tournament")),
            Event::RegistrationCreated(reg) => {
                let tournament = self
                    .tournaments
                    .get(&reg.tournament_id)
                    .map(|t| t.clone())
                    .ok_or(StoreError::NotFound("tournament"))?;
                if tournament.status == LifecycleStatus::Finished {
                    return Err(StoreError::TournamentFinished);
                }
                let others = self.registrations_of(reg.tournament_id, None);
                if others.iter().any(|r| r.user_id == reg.user_id) {
                    return Err(StoreError::AlreadyRegistered);
                }
                if let Some(conflict) = capacity_conflict(&tournament, &others, reg.gender) {
                    return Err(StoreError::Capacity(conflict));
                }
                if let Some(conflict) =
                    pairing_conflict(&others, &reg.user_email, reg.partner_email.as_deref())
                {
                    return Err(StoreError::Pairing(conflict));
                }
                Ok(true)
            }
            Event::RegistrationUpdated(reg) => {
                if !self.registrations.contains_key(&reg.id) {
                    return Err(StoreError::NotFound("registration"));
                }
                let others = self.registrations_of(reg.tournament_id, Some(reg.id));
                if let Some(conflict) =
                    pairing_conflict(&others, &reg.user_email, reg.partner_email.as_deref())
                {
                    return Err(StoreError::Pairing(conflict));
                }
                Ok(true)
            }
            Event::RegistrationDeleted { id } => Ok(self.registrations.contains_key(id)),
            Event::RegistrationFinalized { id } => self
                .registrations
                .get(id)
                .map(|r| r.status != LifecycleStatus::Finished)
                .ok_or(StoreError::NotFound("registration")),
        }
    }

    fn check_tournament(&self, t: &Tournament) -> Result<(), StoreError> {
        if let Some(missing) = t.court_ids.iter().find(|id| !self.courts.contains_key(id)) {
            return Err(StoreError::UnknownCourt(*missing));
        }
        if t.is_active
            && self
                .tournaments
                .iter()
                .any(|other| other.id != t.id && other.occupies(t.date))
        {
            return Err(StoreError::DateTaken(t.date));
        }
        Ok(())
    }

    /// Apply an already-validated event. Also used for journal replay.
    fn apply(&self, event: &Event) -> usize {
        match event {
            Event::CourtCreated(court) => {
                self.court_seq.observe(court.id);
                self.courts.insert(court.id, court.clone());
                1
            }
            Event::UserCreated(user) => {
                self.user_seq.observe(user.id);
                self.user_emails.insert(normalize_email(&user.email), user.id);
                self.users.insert(user.id, user.clone());
                1
            }
            Event::ReservationCreated(r) => {
                self.reservation_seq.observe(r.id);
                self.slots.insert((r.court_id, r.start_time), r.id);
                self.reservations.insert(r.id, r.clone());
                1
            }
            Event::ReservationMoved { id, start_time } => {
                let Some(mut r) = self.reservations.get_mut(id) else {
                    return 0;
                };
                self.slots.remove(&(r.court_id, r.start_time));
                r.start_time = *start_time;
                self.slots.insert((r.court_id, *start_time), *id);
                1
            }
            Event::ReservationDeleted { id } => self.remove_reservation(*id) as usize,
            Event::ReservationsPurged { before } => {
                let expired: Vec<ReservationId> = self
                    .reservations
                    .iter()
                    .filter(|r| r.start_time < *before)
                    .map(|r| r.id)
                    .collect();
                expired
                    .into_iter()
                    .filter(|id| self.remove_reservation(*id))
                    .count()
            }
            Event::TournamentCreated(t) | Event::TournamentUpdated(t) => {
                self.tournament_seq.observe(t.id);
                self.tournaments.insert(t.id, t.clone());
                1
            }
            Event::TournamentDeleted { id } => {
                if self.tournaments.remove(id).is_none() {
                    return 0;
                }
                self.registrations.retain(|_, r| r.tournament_id != *id);
                1
            }
            Event::TournamentFinalized { id } => match self.tournaments.get_mut(id) {
                Some(mut t) => {
                    t.status = LifecycleStatus::Finished;
                    t.is_registration_open = false;
                    1
                }
                None => 0,
            },
            Event::RegistrationCreated(reg) | Event::RegistrationUpdated(reg) => {
                self.registration_seq.observe(reg.id);
                self.registrations.insert(reg.id, reg.clone());
                1
            }
            Event::RegistrationDeleted { id } => self.registrations.remove(id).is_some() as usize,
            Event::RegistrationFinalized { id } => match self.registrations.get_mut(id) {
                Some(mut r) => {
                    r.status = LifecycleStatus::Finished;
                    1
                }
                None => 0,
            },
        }
    }

    fn remove_reservation(&self, id: ReservationId) -> bool {
        match self.reservations.remove(&id) {
            Some((_, r)) => {
                self.slots.remove(&(r.court_id, r.start_time));
                true
            }
            None => false,
        }
    }

    fn registrations_of(
        &self,
        tournament_id: TournamentId,
        except: Option<RegistrationId>,
    ) -> Vec<Registration> {
        self.registrations
            .iter()
            .filter(|r| r.tournament_id == tournament_id && Some(r.id) != except)
            .map(|r| r.clone())
            .collect()
    }
}

fn sorted_values<K, V, F>(map: &DashMap<K, V>, key: F) -> Vec<V>
where
    K: Eq + std::hash::Hash,
    V: Clone,
    F: Fn(&V) -> u64,
{
    let mut values: Vec<V> = map.iter().map(|e| e.value().clone()).collect();
    values.sort_by_key(|v| key(v));
    values
}

// ── Trait implementations ────────────────────────────────────────

#[async_trait]
impl CourtStore for InMemoryStore {
    async fn insert_court(&self, name: &str) -> Result<Court, StoreError> {
        let court = Court {
            id: self.court_seq.next(),
            name: name.to_string(),
        };
        self.commit(Event::CourtCreated(court.clone())).await?;
        Ok(court)
    }

    async fn court(&self, id: CourtId) -> Result<Option<Court>, StoreError> {
        Ok(self.courts.get(&id).map(|c| c.clone()))
    }

    async fn courts(&self) -> Result<Vec<Court>, StoreError> {
        Ok(sorted_values(&self.courts, |c| c.id))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: self.user_seq.next(),
            email: normalize_email(&new.email),
            name: new.name,
            password_hash: new.password_hash,
            federated_id: new.federated_id,
            email_verified: new.email_verified,
        };
        self.commit(Event::UserCreated(user.clone())).await?;
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.user_emails.get(&normalize_email(email)).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn insert_reservation(&self, new: NewReservation) -> Result<Reservation, StoreError> {
        let reservation = Reservation {
            id: self.reservation_seq.next(),
            court_id: new.court_id,
            user_id: new.user_id,
            start_time: new.start_time,
        };
        self.commit(Event::ReservationCreated(reservation.clone())).await?;
        Ok(reservation)
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations.get(&id).map(|r| r.clone()))
    }

    async fn reservation_at(
        &self,
        court_id: CourtId,
        start_time: DateTime<Utc>,
    ) -> Result<Option<Reservation>, StoreError> {
        let Some(id) = self.slots.get(&(court_id, start_time)).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.reservations.get(&id).map(|r| r.clone()))
    }

    async fn reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        let mut all: Vec<Reservation> = self.reservations.iter().map(|r| r.clone()).collect();
        all.sort_by_key(|r| (r.start_time, r.id));
        Ok(all)
    }

    async fn reservations_by_user(&self, user_id: UserId) -> Result<Vec<Reservation>, StoreError> {
        let mut mine: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        mine.sort_by_key(|r| (r.start_time, r.id));
        Ok(mine)
    }

    async fn move_reservation(
        &self,
        id: ReservationId,
        start_time: DateTime<Utc>,
    ) -> Result<Reservation, StoreError> {
        self.commit(Event::ReservationMoved { id, start_time }).await?;
        self.reservations
            .get(&id)
            .map(|r| r.clone())
            .ok_or(StoreError::NotFound("reservation"))
    }

    async fn delete_reservation(&self, id: ReservationId) -> Result<bool, StoreError> {
        Ok(self.commit(Event::ReservationDeleted { id }).await? > 0)
    }

    async fn delete_reservations_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.commit(Event::ReservationsPurged { before: cutoff }).await
    }
}

#[async_trait]
impl TournamentStore for InMemoryStore {
    async fn insert_tournament(&self, new: NewTournament) -> Result<Tournament, StoreError> {
        let tournament = Tournament {
            id: self.tournament_seq.next(),
            name: new.name,
            date: new.date,
            kind: new.kind,
            is_active: true,
            is_registration_open: new.is_registration_open,
            status: LifecycleStatus::Active,
            max_participants: new.max_participants,
            max_participants_by_gender: new.max_participants_by_gender,
            categories: new.categories,
            court_ids: new.court_ids,
        };
        self.commit(Event::TournamentCreated(tournament.clone())).await?;
        Ok(tournament)
    }

    async fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>, StoreError> {
        Ok(self.tournaments.get(&id).map(|t| t.clone()))
    }

    async fn tournaments(&self) -> Result<Vec<Tournament>, StoreError> {
        Ok(sorted_values(&self.tournaments, |t| t.id))
    }

    async fn active_tournament_on(&self, day: NaiveDate) -> Result<Option<Tournament>, StoreError> {
        Ok(self
            .tournaments
            .iter()
            .filter(|t| t.occupies(day))
            .map(|t| t.clone())
            .min_by_key(|t| t.id))
    }

    async fn update_tournament(&self, tournament: Tournament) -> Result<Tournament, StoreError> {
        match self.commit_event(Event::TournamentUpdated(tournament)).await? {
            (_, Event::TournamentUpdated(written)) => Ok(written),
            _ => Err(StoreError::NotFound("tournament")),
        }
    }

    async fn delete_tournament(&self, id: TournamentId) -> Result<bool, StoreError> {
        Ok(self.commit(Event::TournamentDeleted { id }).await? > 0)
    }

    async fn finalize_tournament(&self, id: TournamentId) -> Result<bool, StoreError> {
        Ok(self.commit(Event::TournamentFinalized { id }).await? > 0)
    }
}

#[async_trait]
impl RegistrationStore for InMemoryStore {
    async fn insert_registration(&self, new: NewRegistration) -> Result<Registration, StoreError> {
        let registration = Registration {
            id: self.registration_seq.next(),
            tournament_id: new.tournament_id,
            user_id: new.user_id,
            user_email: new.user_email,
            registered_at: new.registered_at,
            category: new.category,
            gender: new.gender,
            partner_email: new.partner_email,
            status: LifecycleStatus::Active,
        };
        self.commit(Event::RegistrationCreated(registration.clone())).await?;
        Ok(registration)
    }

    async fn registration(&self, id: RegistrationId) -> Result<Option<Registration>, StoreError> {
        Ok(self.registrations.get(&id).map(|r| r.clone()))
    }

    async fn registrations_for_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<Registration>, StoreError> {
        let mut regs = self.registrations_of(tournament_id, None);
        regs.sort_by_key(|r| (r.registered_at, r.id));
        Ok(regs)
    }

    async fn registrations_for_user(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<Vec<Registration>, StoreError> {
        let mut regs: Vec<Registration> = self
            .registrations
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    || r.partner_email
                        .as_deref()
                        .is_some_and(|p| p.eq_ignore_ascii_case(email))
            })
            .map(|r| r.clone())
            .collect();
        regs.sort_by_key(|r| std::cmp::Reverse((r.registered_at, r.id)));
        Ok(regs)
    }

    async fn update_registration(&self, registration: Registration) -> Result<Registration, StoreError> {
        match self.commit_event(Event::RegistrationUpdated(registration)).await? {
            (_, Event::RegistrationUpdated(written)) => Ok(written),
            _ => Err(StoreError::NotFound("registration")),
        }
    }

    async fn delete_registration(&self, id: RegistrationId) -> Result<bool, StoreError> {
        Ok(self.commit(Event::RegistrationDeleted { id }).await? > 0)
    }

    async fn finalize_registration(&self, id: RegistrationId) -> Result<bool, StoreError> {
        Ok(self.commit(Event::RegistrationFinalized { id }).await? > 0)
    }
}
