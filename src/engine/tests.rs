use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::clock::{local_to_utc, ManualClock};
use crate::model::*;
use crate::store::{
    CourtStore, InMemoryStore, RegistrationStore, ReservationStore, Store, TournamentStore, UserStore,
};

// ── Fixture ──────────────────────────────────────────────

/// 2025-05-20 07:00 in São Paulo.
fn base_now() -> DateTime<Utc> {
    local(20, 7)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
}

/// May `d`, 2025 at `h`:00 facility time.
fn local(d: u32, h: u32) -> DateTime<Utc> {
    local_to_utc(day(d), NaiveTime::from_hms_opt(h, 0, 0).unwrap())
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

struct Fixture {
    engine: Arc<Engine>,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    c1: Court,
    c2: Court,
}

async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(base_now()));
    let engine = Arc::new(Engine::new(store.clone() as Arc<dyn Store>, clock.clone()));
    let c1 = store.insert_court("Quadra 1").await.unwrap();
    let c2 = store.insert_court("Quadra 2").await.unwrap();
    Fixture {
        engine,
        store,
        clock,
        c1,
        c2,
    }
}

impl Fixture {
    async fn user(&self, email: &str) -> Principal {
        let u = self.store.insert_user(NewUser::with_email(email)).await.unwrap();
        Principal::new(u.id, u.email)
    }

    async fn book(&self, who: &Principal, court: &Court, at: DateTime<Utc>) -> Result<ReservationView, EngineError> {
        self.engine
            .create_reservation(
                who,
                CreateReservation {
                    court_id: court.id,
                    start_time: iso(at),
                },
            )
            .await
    }

    async fn tournament(&self, d: u32, courts: &[&Court]) -> Tournament {
        self.engine
            .create_tournament(tournament_req(d, courts))
            .await
            .unwrap()
            .tournament
    }

    async fn enter(
        &self,
        who: &Principal,
        t: &Tournament,
        gender: Gender,
        partner: Option<&str>,
    ) -> Result<RegistrationView, EngineError> {
        self.engine
            .register(
                who,
                CreateRegistration {
                    tournament_id: t.id,
                    category: None,
                    partner_email: partner.map(Into::into),
                    gender,
                },
            )
            .await
    }
}

fn tournament_req(d: u32, courts: &[&Court]) -> CreateTournament {
    CreateTournament {
        name: format!("Torneio {d}"),
        date: day(d).to_string(),
        court_ids: courts.iter().map(|c| c.id).collect(),
        kind: None,
        is_registration_open: None,
        max_participants: None,
        max_participants_by_gender: None,
        categories: None,
    }
}

fn bad(message: &str) -> EngineError {
    EngineError::BadRequest(message.to_string())
}

// ── Reservations ─────────────────────────────────────────

#[tokio::test]
async fn engine_books_free_slot() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let start = base_now() + Duration::hours(3);
    assert_eq!(crate::clock::to_facility_hour(start), 10);

    let view = assert_ok!(f.book(&u, &f.c1, start).await);
    assert_eq!(view.court, f.c1);
    assert_eq!(view.user.unwrap().id, u.user_id);
    assert_eq!(view.start_time, start);
}

#[tokio::test]
async fn engine_rejects_double_booking() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let start = local(21, 10);

    f.book(&ana, &f.c1, start).await.unwrap();
    assert_eq!(f.book(&bia, &f.c1, start).await, Err(bad(msg::SLOT_TAKEN)));
    assert_eq!(f.engine.find_all_reservations().await.unwrap().len(), 1);

    // The other court at the same instant is free.
    f.book(&bia, &f.c2, start).await.unwrap();
}

#[tokio::test]
async fn engine_rejects_booking_on_tournament_day() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    f.tournament(22, &[&f.c1]).await;

    assert_eq!(f.book(&u, &f.c1, local(22, 10)).await, Err(bad(msg::TOURNAMENT_DAY)));
    assert!(!f.engine.is_court_free(f.c1.id, local(22, 10)).await.unwrap());
    assert!(f.engine.is_court_reserved_for_tournament(f.c1.id, day(22)).await.unwrap());

    // Other court, other day: free.
    f.book(&u, &f.c2, local(22, 10)).await.unwrap();
    f.book(&u, &f.c1, local(23, 10)).await.unwrap();
}

#[tokio::test]
async fn engine_tournament_block_wins_over_existing_booking() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let booked = f.book(&ana, &f.c1, local(22, 10)).await.unwrap();
    f.tournament(22, &[&f.c1]).await;

    assert!(matches!(
        f.engine.slot_status(f.c1.id, local(22, 10)).await.unwrap(),
        SlotStatus::TournamentDay(_)
    ));
    assert_eq!(f.book(&bia, &f.c1, local(22, 10)).await, Err(bad(msg::TOURNAMENT_DAY)));
    // The earlier booking is left alone.
    assert!(f.store.reservation(booked.id).await.unwrap().is_some());
}

#[tokio::test]
async fn engine_booking_window_bounds_are_inclusive() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    // 10:00 local, so both window edges land inside business hours.
    let now = local(20, 10);
    f.clock.set(now);

    assert_eq!(
        f.book(&u, &f.c1, now + Duration::hours(2) - Duration::minutes(1)).await,
        Err(bad(msg::TOO_SOON))
    );
    assert_eq!(
        f.book(&u, &f.c1, now + Duration::days(7) + Duration::seconds(1)).await,
        Err(bad(msg::TOO_FAR))
    );
    f.book(&u, &f.c1, now + Duration::hours(2)).await.unwrap();
    f.book(&u, &f.c1, now + Duration::days(7)).await.unwrap();
}

#[tokio::test]
async fn engine_rejects_outside_business_hours() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;

    for h in [0, 7, 22, 23] {
        assert_eq!(f.book(&u, &f.c1, local(21, h)).await, Err(bad(msg::OUTSIDE_HOURS)));
    }
    f.book(&u, &f.c1, local(21, 8)).await.unwrap();
    f.book(&u, &f.c1, local(21, 21)).await.unwrap();
    assert!(f.store.reservations().await.unwrap().iter().all(|r| {
        crate::clock::is_within_business_hours(r.start_time)
    }));
}

#[tokio::test]
async fn engine_rejected_booking_writes_nothing() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let _ = f.book(&u, &f.c1, base_now() + Duration::minutes(30)).await;
    let _ = f.book(&u, &f.c1, local(21, 23)).await;
    assert!(f.store.reservations().await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_booking_unknown_court_or_user() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let ghost_court = Court { id: 99, name: "Quadra 99".into() };
    assert_eq!(
        f.book(&u, &ghost_court, local(21, 10)).await,
        Err(EngineError::NotFound(msg::COURT_NOT_FOUND.into()))
    );

    let ghost_user = Principal::new(42, "ninguem@x.com");
    let err = assert_err!(f.book(&ghost_user, &f.c1, local(21, 10)).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), msg::USER_NOT_FOUND);
}

#[tokio::test]
async fn engine_booking_rejects_malformed_instant() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let result = f
        .engine
        .create_reservation(
            &u,
            CreateReservation {
                court_id: f.c1.id,
                start_time: "amanhã".into(),
            },
        )
        .await;
    assert_eq!(result, Err(bad(msg::INVALID_INSTANT)));
}

#[tokio::test]
async fn engine_concurrent_bookings_admit_one() {
    let f = fixture().await;
    let start = local(21, 10);
    let mut handles = Vec::new();
    for i in 0..16 {
        let u = f.user(&format!("u{i}@x.com")).await;
        let engine = f.engine.clone();
        let court_id = f.c1.id;
        handles.push(tokio::spawn(async move {
            engine
                .create_reservation(
                    &u,
                    CreateReservation {
                        court_id,
                        start_time: iso(start),
                    },
                )
                .await
        }));
    }

    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert_eq!(e, bad(msg::SLOT_TAKEN)),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(f.store.reservations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_update_reservation() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let r = f.book(&ana, &f.c1, local(21, 10)).await.unwrap();
    f.book(&bia, &f.c1, local(21, 12)).await.unwrap();

    let moved = f
        .engine
        .update_reservation(&ana, r.id, UpdateReservation { start_time: iso(local(21, 11)) })
        .await
        .unwrap();
    assert_eq!(moved.start_time, local(21, 11));
    assert!(f.engine.is_court_free(f.c1.id, local(21, 10)).await.unwrap());

    // Same instant again: no conflict with itself.
    f.engine
        .update_reservation(&ana, r.id, UpdateReservation { start_time: iso(local(21, 11)) })
        .await
        .unwrap();

    assert_eq!(
        f.engine
            .update_reservation(&ana, r.id, UpdateReservation { start_time: iso(local(21, 12)) })
            .await,
        Err(bad(msg::MOVE_SLOT_TAKEN))
    );
    assert_eq!(
        f.engine
            .update_reservation(&ana, r.id, UpdateReservation { start_time: iso(local(28, 12)) })
            .await,
        Err(bad(msg::MOVE_OUT_OF_WINDOW))
    );
    assert_eq!(
        f.engine
            .update_reservation(&ana, r.id, UpdateReservation { start_time: iso(local(21, 6)) })
            .await,
        Err(bad(msg::MOVE_OUTSIDE_HOURS))
    );

    f.tournament(23, &[&f.c1]).await;
    assert_eq!(
        f.engine
            .update_reservation(&ana, r.id, UpdateReservation { start_time: iso(local(23, 10)) })
            .await,
        Err(bad(msg::TOURNAMENT_DAY))
    );
}

#[tokio::test]
async fn engine_ownership_checked_before_payload() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let r = f.book(&ana, &f.c1, local(21, 10)).await.unwrap();

    for payload in ["garbage", "2025-05-21T23:00:00Z", "2025-05-21T14:00:00Z"] {
        assert_eq!(
            f.engine
                .update_reservation(&bia, r.id, UpdateReservation { start_time: payload.into() })
                .await,
            Err(bad(msg::NOT_OWNER_UPDATE_RESERVATION))
        );
    }
    assert_eq!(
        f.engine.remove_reservation(&bia, r.id).await,
        Err(bad(msg::NOT_OWNER_DELETE_RESERVATION))
    );
    assert!(f.store.reservation(r.id).await.unwrap().is_some());
}

#[tokio::test]
async fn engine_remove_reservation() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let r = f.book(&ana, &f.c1, local(21, 10)).await.unwrap();

    f.engine.remove_reservation(&ana, r.id).await.unwrap();
    assert_eq!(
        f.engine.remove_reservation(&ana, r.id).await,
        Err(EngineError::NotFound(msg::RESERVATION_NOT_FOUND.into()))
    );
    assert!(f.engine.is_court_free(f.c1.id, local(21, 10)).await.unwrap());
}

#[tokio::test]
async fn engine_reservation_listings() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    f.book(&ana, &f.c1, local(22, 10)).await.unwrap();
    f.book(&bia, &f.c2, local(21, 9)).await.unwrap();
    f.book(&ana, &f.c2, local(21, 15)).await.unwrap();

    let all = f.engine.find_all_reservations().await.unwrap();
    let starts: Vec<_> = all.iter().map(|r| r.start_time).collect();
    assert_eq!(starts, vec![local(21, 9), local(21, 15), local(22, 10)]);
    assert_eq!(all[0].user.as_ref().unwrap().email, "bia@x.com");

    let mine = f.engine.find_reservations_by_user(ana.user_id).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].court, f.c2);
    assert!(mine.iter().all(|r| r.user.is_none()));
}

// ── Retention sweep ──────────────────────────────────────

#[tokio::test]
async fn engine_purge_is_idempotent() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    f.book(&u, &f.c1, local(20, 10)).await.unwrap();
    f.book(&u, &f.c1, local(20, 11)).await.unwrap();
    f.book(&u, &f.c1, local(21, 10)).await.unwrap();

    f.clock.set(local(20, 12));
    assert_eq!(f.engine.purge_past_reservations().await.unwrap(), 2);
    assert_eq!(f.engine.purge_past_reservations().await.unwrap(), 0);
    assert_eq!(f.store.reservations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_purge_keeps_reservation_starting_now() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    f.book(&u, &f.c1, local(20, 10)).await.unwrap();
    f.clock.set(local(20, 10));
    assert_eq!(f.engine.purge_past_reservations().await.unwrap(), 0);
}

// ── Tournaments ──────────────────────────────────────────

#[tokio::test]
async fn engine_create_tournament_defaults() {
    let f = fixture().await;
    let view = f.engine.create_tournament(tournament_req(25, &[&f.c2, &f.c1])).await.unwrap();
    let t = view.tournament;
    assert_eq!(t.kind, "beach_tennis");
    assert!(t.is_active);
    assert!(t.is_registration_open);
    assert_eq!(t.status, LifecycleStatus::Active);
    assert_eq!(t.court_ids, vec![f.c1.id, f.c2.id]);
    assert_eq!(view.courts, vec![f.c1.clone(), f.c2.clone()]);
}

#[tokio::test]
async fn engine_one_active_tournament_per_day() {
    let f = fixture().await;
    f.tournament(25, &[&f.c1]).await;
    assert_eq!(
        f.engine.create_tournament(tournament_req(25, &[&f.c2])).await,
        Err(bad(msg::DATE_TAKEN))
    );

    // An instant late on the 25th in São Paulo is already the 26th in UTC.
    let mut req = tournament_req(25, &[&f.c2]);
    req.date = "2025-05-26T01:30:00Z".into();
    assert_eq!(f.engine.create_tournament(req).await, Err(bad(msg::DATE_TAKEN)));
}

#[tokio::test]
async fn engine_tournament_rejects_unknown_courts_and_categories() {
    let f = fixture().await;
    let mut req = tournament_req(25, &[&f.c1]);
    req.court_ids.push(77);
    assert_eq!(f.engine.create_tournament(req).await, Err(bad(msg::UNKNOWN_COURTS)));

    let mut req = tournament_req(25, &[&f.c1]);
    req.categories = Some(vec!["A".into(), "Z".into()]);
    assert_eq!(f.engine.create_tournament(req).await, Err(bad(msg::INVALID_CATEGORY)));
    assert!(f.engine.find_tournaments().await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_update_tournament_is_partial() {
    let f = fixture().await;
    let t = f.tournament(25, &[&f.c1]).await;

    let updated = f
        .engine
        .update_tournament(
            t.id,
            UpdateTournament {
                name: Some("Open de Inverno".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.tournament.name, "Open de Inverno");
    assert_eq!(updated.tournament.date, t.date);
    assert_eq!(updated.tournament.court_ids, t.court_ids);

    // One bad court rejects everything in the update.
    let rejected = f
        .engine
        .update_tournament(
            t.id,
            UpdateTournament {
                name: Some("Outro".into()),
                court_ids: Some(vec![f.c2.id, 99]),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(rejected, Err(bad(msg::UNKNOWN_COURTS)));
    let stored = f.store.tournament(t.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Open de Inverno");
    assert_eq!(stored.court_ids, vec![f.c1.id]);

    let reassigned = f
        .engine
        .update_tournament(
            t.id,
            UpdateTournament {
                court_ids: Some(vec![f.c2.id]),
                max_participants_by_gender: Some(GenderCaps { male: 4, female: 4 }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(reassigned.courts, vec![f.c2.clone()]);
    assert!(f.engine.is_court_free(f.c1.id, local(25, 10)).await.unwrap());
}

#[tokio::test]
async fn engine_update_tournament_keeps_dates_unique() {
    let f = fixture().await;
    let first = f.tournament(24, &[&f.c1]).await;
    let second = f.tournament(25, &[&f.c1]).await;

    let clash = f
        .engine
        .update_tournament(
            second.id,
            UpdateTournament {
                date: Some("2025-05-24".into()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(clash, Err(bad(msg::DATE_TAKEN)));

    f.engine
        .update_tournament(
            first.id,
            UpdateTournament {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    f.engine
        .update_tournament(
            second.id,
            UpdateTournament {
                date: Some("2025-05-24".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Inactive tournaments do not block courts.
    assert_eq!(
        f.engine.find_tournament_by_date(day(24)).await.unwrap().unwrap().tournament.id,
        second.id
    );
}

#[tokio::test]
async fn engine_toggle_registration() {
    let f = fixture().await;
    let t = f.tournament(25, &[&f.c1]).await;
    let closed = f.engine.toggle_registration(t.id).await.unwrap();
    assert!(!closed.tournament.is_registration_open);
    let reopened = f.engine.toggle_registration(t.id).await.unwrap();
    assert!(reopened.tournament.is_registration_open);
    assert_eq!(
        f.engine.toggle_registration(999).await,
        Err(EngineError::NotFound(msg::TOURNAMENT_NOT_FOUND.into()))
    );
}

#[tokio::test]
async fn engine_remove_tournament_cascades() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let t = f.tournament(25, &[&f.c1]).await;
    let reg = f.enter(&u, &t, Gender::Female, None).await.unwrap();
    assert_eq!(f.book(&u, &f.c1, local(25, 10)).await, Err(bad(msg::TOURNAMENT_DAY)));

    f.engine.remove_tournament(t.id).await.unwrap();
    assert_eq!(
        f.engine.find_registration(reg.registration.id).await,
        Err(EngineError::NotFound(msg::REGISTRATION_NOT_FOUND.into()))
    );
    assert_eq!(
        f.engine.remove_tournament(t.id).await,
        Err(EngineError::NotFound(msg::TOURNAMENT_NOT_FOUND.into()))
    );
    // The court is bookable again once the tournament is gone.
    f.book(&u, &f.c1, local(25, 10)).await.unwrap();
}

#[tokio::test]
async fn engine_find_next_tournament() {
    let f = fixture().await;
    let inactive = f.tournament(21, &[&f.c1]).await;
    f.engine
        .update_tournament(
            inactive.id,
            UpdateTournament {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let soon = f.tournament(22, &[&f.c1]).await;
    let later = f.tournament(25, &[&f.c2]).await;

    let next = f.engine.find_next_tournament().await.unwrap().unwrap();
    assert_eq!(next.tournament.id, soon.id);

    // Once the 22nd has begun it is no longer "next".
    f.clock.set(local(22, 1));
    let next = f.engine.find_next_tournament().await.unwrap().unwrap();
    assert_eq!(next.tournament.id, later.id);

    f.clock.set(local(26, 1));
    assert!(f.engine.find_next_tournament().await.unwrap().is_none());
}

#[tokio::test]
async fn engine_find_tournament_details() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let t = f.tournament(25, &[&f.c1, &f.c2]).await;
    f.enter(&ana, &t, Gender::Female, None).await.unwrap();

    let details = f.engine.find_tournament(t.id).await.unwrap();
    assert_eq!(details.courts.len(), 2);
    assert_eq!(details.registrations.len(), 1);
    assert_eq!(details.registrations[0].user.as_ref().unwrap().email, "ana@x.com");
    assert_eq!(
        f.engine.find_tournament(404).await,
        Err(EngineError::NotFound(msg::TOURNAMENT_NOT_FOUND.into()))
    );
}

// ── Registrations ────────────────────────────────────────

#[tokio::test]
async fn engine_gender_caps() {
    let f = fixture().await;
    let mut req = tournament_req(25, &[&f.c1]);
    req.max_participants_by_gender = Some(GenderCaps { male: 1, female: 1 });
    let t = f.engine.create_tournament(req).await.unwrap().tournament;

    let joao = f.user("joao@x.com").await;
    let pedro = f.user("pedro@x.com").await;
    let ana = f.user("ana@x.com").await;

    f.enter(&joao, &t, Gender::Male, None).await.unwrap();
    assert_eq!(
        f.enter(&pedro, &t, Gender::Male, None).await,
        Err(bad("O limite de inscrições masculinas foi atingido"))
    );
    f.enter(&ana, &t, Gender::Female, None).await.unwrap();
    assert_eq!(f.engine.find_registrations_by_tournament(t.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn engine_overall_cap() {
    let f = fixture().await;
    let mut req = tournament_req(25, &[&f.c1]);
    req.max_participants = Some(2);
    let t = f.engine.create_tournament(req).await.unwrap().tournament;

    for email in ["a@x.com", "b@x.com"] {
        let u = f.user(email).await;
        f.enter(&u, &t, Gender::Female, None).await.unwrap();
    }
    let late = f.user("c@x.com").await;
    assert_eq!(
        f.enter(&late, &t, Gender::Male, None).await,
        Err(bad("O limite de participantes do torneio foi atingido"))
    );
}

#[tokio::test]
async fn engine_concurrent_registrations_respect_gender_cap() {
    let f = fixture().await;
    let mut req = tournament_req(25, &[&f.c1]);
    req.max_participants_by_gender = Some(GenderCaps { male: 3, female: 3 });
    let t = f.engine.create_tournament(req).await.unwrap().tournament;

    let mut handles = Vec::new();
    for i in 0..12 {
        let u = f.user(&format!("m{i}@x.com")).await;
        let engine = f.engine.clone();
        let tournament_id = t.id;
        handles.push(tokio::spawn(async move {
            engine
                .register(
                    &u,
                    CreateRegistration {
                        tournament_id,
                        category: None,
                        partner_email: None,
                        gender: Gender::Male,
                    },
                )
                .await
        }));
    }
    let mut ok = 0;
    for h in handles {
        if h.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 3);
}

#[tokio::test]
async fn engine_registration_requires_open_active_tournament() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let t = f.tournament(25, &[&f.c1]).await;

    f.engine.toggle_registration(t.id).await.unwrap();
    assert_eq!(f.enter(&u, &t, Gender::Female, None).await, Err(bad(msg::REGISTRATION_CLOSED)));

    f.engine
        .update_tournament(
            t.id,
            UpdateTournament {
                is_active: Some(false),
                is_registration_open: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(f.enter(&u, &t, Gender::Female, None).await, Err(bad(msg::TOURNAMENT_INACTIVE)));

    let ghost = Tournament { id: 404, ..t };
    assert_eq!(
        f.enter(&u, &ghost, Gender::Female, None).await,
        Err(EngineError::NotFound(msg::TOURNAMENT_NOT_FOUND.into()))
    );
}

#[tokio::test]
async fn engine_registration_rejects_duplicates_and_bad_categories() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let mut req = tournament_req(25, &[&f.c1]);
    req.categories = Some(vec!["A".into(), "B".into()]);
    let t = f.engine.create_tournament(req).await.unwrap().tournament;

    let register = |category: &str| CreateRegistration {
        tournament_id: t.id,
        category: Some(category.into()),
        partner_email: None,
        gender: Gender::Female,
    };
    assert_eq!(f.engine.register(&u, register("X")).await, Err(bad(msg::INVALID_CATEGORY)));
    assert_eq!(f.engine.register(&u, register("C")).await, Err(bad(msg::CATEGORY_NOT_OFFERED)));

    let reg = f.engine.register(&u, register("B")).await.unwrap();
    assert_eq!(reg.registration.category, Some(Category::B));
    assert_eq!(reg.registration.status, LifecycleStatus::Active);
    assert_eq!(f.engine.register(&u, register("A")).await, Err(bad(msg::ALREADY_REGISTERED)));
}

#[tokio::test]
async fn engine_finished_tournament_refuses_registrations() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    let t = f.tournament(25, &[&f.c1]).await;
    f.store.finalize_tournament(t.id).await.unwrap();
    // Toggling cannot reopen a finished tournament.
    let view = f.engine.toggle_registration(t.id).await.unwrap();
    assert_eq!(view.tournament.status, LifecycleStatus::Finished);
    assert!(!view.tournament.is_registration_open);
    assert_eq!(f.enter(&u, &t, Gender::Female, None).await, Err(bad(msg::REGISTRATION_CLOSED)));
}

#[tokio::test]
async fn engine_partner_lookup_ignores_email_case() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("Bia@X.com").await;
    assert_eq!(bia.email, "bia@x.com");
    let t = f.tournament(25, &[&f.c1]).await;

    let reg = f.enter(&ana, &t, Gender::Female, Some(" BIA@x.com ")).await.unwrap().registration;
    assert_eq!(reg.partner_email.as_deref(), Some("bia@x.com"));
    assert!(f.engine.find_user_by_email("BIA@X.COM").await.unwrap().is_some());
    // bia is held as ana's partner whatever case ana typed.
    assert_eq!(
        f.enter(&bia, &t, Gender::Female, None).await,
        Err(bad("Este parceiro já está inscrito com outro jogador"))
    );
}

#[tokio::test]
async fn engine_partner_pairing_is_exclusive() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let carla = f.user("carla@x.com").await;
    let dani = f.user("dani@x.com").await;
    let t = f.tournament(25, &[&f.c1]).await;

    assert_eq!(
        f.enter(&ana, &t, Gender::Female, Some("nobody@x.com")).await,
        Err(bad(msg::PARTNER_NOT_FOUND))
    );
    f.enter(&ana, &t, Gender::Female, Some("bia@x.com")).await.unwrap();

    // bia is already ana's partner.
    assert_eq!(
        f.enter(&bia, &t, Gender::Female, None).await,
        Err(bad("Este parceiro já está inscrito com outro jogador"))
    );
    // Nobody else may claim bia, nor pick ana who holds her own entry.
    assert_eq!(
        f.enter(&carla, &t, Gender::Female, Some("bia@x.com")).await,
        Err(bad("O parceiro informado já foi escolhido por outro jogador"))
    );
    assert_eq!(
        f.enter(&carla, &t, Gender::Female, Some("ana@x.com")).await,
        Err(bad("O parceiro informado já está inscrito neste torneio"))
    );
    assert_eq!(
        f.enter(&carla, &t, Gender::Female, Some("carla@x.com")).await,
        Err(bad("Você não pode ser seu próprio parceiro"))
    );
    f.enter(&carla, &t, Gender::Female, Some("dani@x.com")).await.unwrap();
    assert!(f.enter(&dani, &t, Gender::Female, None).await.is_err());
}

#[tokio::test]
async fn engine_update_registration() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let carla = f.user("carla@x.com").await;
    let t = f.tournament(25, &[&f.c1]).await;
    let reg = f.enter(&ana, &t, Gender::Female, Some("bia@x.com")).await.unwrap();
    let id = reg.registration.id;

    assert_eq!(
        f.engine
            .update_registration(&bia, id, UpdateRegistration { category: Some("Z".into()), ..Default::default() })
            .await,
        Err(bad(msg::NOT_OWNER_UPDATE_REGISTRATION))
    );
    assert_eq!(
        f.engine
            .update_registration(&ana, id, UpdateRegistration { category: Some("Z".into()), ..Default::default() })
            .await,
        Err(bad(msg::INVALID_CATEGORY))
    );

    let updated = f
        .engine
        .update_registration(
            &ana,
            id,
            UpdateRegistration {
                category: Some("C".into()),
                partner_email: Some("carla@x.com".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.registration.category, Some(Category::C));
    assert_eq!(updated.registration.partner_email.as_deref(), Some("carla@x.com"));

    // bia is free again; carla is now taken.
    f.enter(&bia, &t, Gender::Female, None).await.unwrap();
    assert!(f.enter(&carla, &t, Gender::Female, None).await.is_err());
}

#[tokio::test]
async fn engine_cancel_registration() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let t = f.tournament(22, &[&f.c1]).await;
    let a = f.enter(&ana, &t, Gender::Female, None).await.unwrap().registration;
    let b = f.enter(&bia, &t, Gender::Female, None).await.unwrap().registration;

    assert_eq!(
        f.engine.cancel_registration(&bia, a.id).await,
        Err(bad(msg::NOT_OWNER_CANCEL_REGISTRATION))
    );

    f.clock.set(local(21, 23));
    f.engine.cancel_registration(&ana, a.id).await.unwrap();
    assert_eq!(
        f.engine.find_registration(a.id).await,
        Err(EngineError::NotFound(msg::REGISTRATION_NOT_FOUND.into()))
    );

    f.clock.set(local(22, 1));
    assert_eq!(
        f.engine.cancel_registration(&bia, b.id).await,
        Err(bad(msg::CANCEL_AFTER_EVENT))
    );
}

#[tokio::test]
async fn engine_registrations_by_user_include_partner_entries() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let t1 = f.tournament(24, &[&f.c1]).await;
    let t2 = f.tournament(25, &[&f.c1]).await;

    let own = f.enter(&bia, &t1, Gender::Female, None).await.unwrap().registration;
    f.clock.advance(Duration::minutes(5));
    let named = f.enter(&ana, &t2, Gender::Female, Some("bia@x.com")).await.unwrap().registration;

    let mine = f.engine.find_registrations_by_user(bia.user_id).await.unwrap();
    let ids: Vec<_> = mine.iter().map(|v| v.registration.id).collect();
    assert_eq!(ids, vec![named.id, own.id]);
    assert_eq!(mine[0].user.as_ref().unwrap().email, "ana@x.com");
    assert_eq!(mine[0].tournament.as_ref().unwrap().id, t2.id);

    let by_tournament = f.engine.find_registrations_by_tournament(t2.id).await.unwrap();
    assert_eq!(by_tournament.len(), 1);
}

// ── Finalize sweep ───────────────────────────────────────

#[tokio::test]
async fn engine_finalize_sweep() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let past = f.tournament(22, &[&f.c1]).await;
    let future = f.tournament(25, &[&f.c1]).await;
    f.enter(&ana, &past, Gender::Female, None).await.unwrap();
    f.enter(&bia, &past, Gender::Female, None).await.unwrap();
    f.enter(&ana, &future, Gender::Female, None).await.unwrap();

    // Late on the tournament day: not over yet.
    f.clock.set(local(22, 23));
    assert_eq!(f.engine.finalize_past_tournaments().await.unwrap(), FinalizeReport::default());

    f.clock.set(local(23, 0) + Duration::minutes(1));
    let report = f.engine.finalize_past_tournaments().await.unwrap();
    assert_eq!(
        report,
        FinalizeReport {
            tournaments: 1,
            registrations: 2,
            failures: 0
        }
    );

    let details = f.engine.find_tournament(past.id).await.unwrap();
    assert_eq!(details.tournament.status, LifecycleStatus::Finished);
    assert!(!details.tournament.is_registration_open);
    assert!(details
        .registrations
        .iter()
        .all(|r| r.registration.status == LifecycleStatus::Finished));
    let other = f.engine.find_tournament(future.id).await.unwrap();
    assert_eq!(other.tournament.status, LifecycleStatus::Active);

    let before = f.engine.find_tournaments().await.unwrap();
    assert_eq!(f.engine.finalize_past_tournaments().await.unwrap(), FinalizeReport::default());
    assert_eq!(f.engine.find_tournaments().await.unwrap(), before);
}

#[tokio::test]
async fn engine_finalize_heals_half_finished_tournament() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let t = f.tournament(22, &[&f.c1]).await;
    let reg = f.enter(&ana, &t, Gender::Female, None).await.unwrap().registration;
    f.store.finalize_tournament(t.id).await.unwrap();

    f.clock.set(local(24, 0));
    let report = f.engine.finalize_past_tournaments().await.unwrap();
    assert_eq!(report.tournaments, 0);
    assert_eq!(report.registrations, 1);
    let reg = f.engine.find_registration(reg.id).await.unwrap().registration;
    assert_eq!(reg.status, LifecycleStatus::Finished);
}

#[tokio::test]
async fn engine_stale_edits_after_finalize_keep_rows_finished() {
    let f = fixture().await;
    let ana = f.user("ana@x.com").await;
    let bia = f.user("bia@x.com").await;
    let t = f.tournament(22, &[&f.c1]).await;
    let reg = f.enter(&ana, &t, Gender::Female, None).await.unwrap().registration;

    // Rows read by an edit that commits only after the sweep ran.
    let mut stale_t = f.store.tournament(t.id).await.unwrap().unwrap();
    let mut stale_reg = f.store.registration(reg.id).await.unwrap().unwrap();
    f.clock.set(local(23, 1));
    let report = f.engine.finalize_past_tournaments().await.unwrap();
    assert_eq!((report.tournaments, report.registrations), (1, 1));

    stale_t.name = "Renomeado".into();
    stale_t.is_registration_open = true;
    let written = f.store.update_tournament(stale_t).await.unwrap();
    assert_eq!(written.name, "Renomeado");
    assert_eq!(written.status, LifecycleStatus::Finished);
    assert!(!written.is_registration_open);

    stale_reg.category = Some(Category::A);
    let written = f.store.update_registration(stale_reg).await.unwrap();
    assert_eq!(written.category, Some(Category::A));
    assert_eq!(written.status, LifecycleStatus::Finished);

    let details = f.engine.find_tournament(t.id).await.unwrap();
    assert_eq!(details.tournament.status, LifecycleStatus::Finished);
    assert_eq!(details.registrations[0].registration.status, LifecycleStatus::Finished);
    assert!(f.engine.find_next_tournament().await.unwrap().is_none());
    assert_eq!(f.enter(&bia, &t, Gender::Female, None).await, Err(bad(msg::REGISTRATION_CLOSED)));
}

// ── Lookups ──────────────────────────────────────────────

#[tokio::test]
async fn engine_court_and_user_lookups() {
    let f = fixture().await;
    let u = f.user("ana@x.com").await;
    assert_eq!(f.engine.find_courts().await.unwrap(), vec![f.c1.clone(), f.c2.clone()]);
    assert_eq!(f.engine.find_court(f.c2.id).await.unwrap(), f.c2);
    assert_eq!(
        f.engine.find_court(9).await,
        Err(EngineError::NotFound(msg::COURT_NOT_FOUND.into()))
    );
    assert_eq!(f.engine.find_user(u.user_id).await.unwrap().email, "ana@x.com");
    assert!(f.engine.find_user_by_email("bia@x.com").await.unwrap().is_none());
    assert!(f.engine.find_user_by_email("ana@x.com").await.unwrap().is_some());
}
