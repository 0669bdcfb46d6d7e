use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Booking, Interval, Slot, User};
use crate::services::availability::{self, Exclusion};
use crate::services::conflicts;

/// Message raised by the storage-level overlap triggers.
const OVERLAP_GUARD: &str = "slot_overlap";

pub fn list_bookings(conn: &Connection, user: &User) -> Result<Vec<Booking>, BookingError> {
    Ok(queries::get_bookings_for_user(conn, user.id)?)
}

/// Creates a booking with all of its slots, or nothing at all.
pub fn create_booking(
    conn: &mut Connection,
    user: &User,
    slots: &[Interval],
) -> Result<Booking, BookingError> {
    conflicts::validate_batch(slots)?;

    let tx = begin(conn)?;

    let mut booking = queries::insert_booking(&tx, user.id)?;
    for interval in slots {
        availability::check_available(&tx, interval, Exclusion::none())?;
        let slot = insert_slot_guarded(&tx, booking.id, interval)?;
        booking.slots.push(slot);
    }

    commit(tx)?;

    booking.slots.sort_by_key(|s| (s.start_time, s.id));
    tracing::info!(
        booking_id = booking.id,
        user_id = user.id,
        slots = booking.slots.len(),
        "booking created"
    );
    Ok(booking)
}

/// Only other bookings' slots are consulted by the availability check; the
/// storage guard still rejects overlap with the booking's own slots.
pub fn add_slot(
    conn: &mut Connection,
    booking: &Booking,
    interval: &Interval,
) -> Result<Slot, BookingError> {
    conflicts::validate_batch(std::slice::from_ref(interval))?;

    let tx = begin(conn)?;
    availability::check_available(&tx, interval, Exclusion::booking(booking.id))?;
    let slot = insert_slot_guarded(&tx, booking.id, interval)?;
    commit(tx)?;

    tracing::info!(booking_id = booking.id, slot_id = slot.id, "slot added");
    Ok(slot)
}

pub fn update_slot(
    conn: &mut Connection,
    slot: &Slot,
    interval: &Interval,
) -> Result<Slot, BookingError> {
    conflicts::validate_batch(std::slice::from_ref(interval))?;

    let tx = begin(conn)?;
    availability::check_available(&tx, interval, Exclusion::slot(slot.id))?;

    match queries::update_slot_interval(&tx, slot.id, interval) {
        Ok(true) => {}
        Ok(false) => {
            return Err(BookingError::Validation(format!(
                "slot {} no longer exists",
                slot.id
            )))
        }
        Err(e) if is_overlap_abort(&e) => {
            return Err(storage_conflict(&tx, interval, Exclusion::slot(slot.id)))
        }
        Err(e) => return Err(e.into()),
    }
    commit(tx)?;

    tracing::info!(booking_id = slot.booking_id, slot_id = slot.id, "slot updated");
    Ok(Slot {
        start_time: interval.start,
        end_time: interval.end,
        ..slot.clone()
    })
}

pub fn delete_booking(conn: &mut Connection, booking: &Booking) -> Result<(), BookingError> {
    let tx = begin(conn)?;
    queries::delete_booking(&tx, booking.id)?;
    commit(tx)?;

    tracing::info!(booking_id = booking.id, "booking deleted");
    Ok(())
}

// IMMEDIATE takes the write lock up front, so the availability check and the
// write that follows it cannot interleave with another writer.
fn begin(conn: &mut Connection) -> Result<Transaction<'_>, BookingError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| BookingError::Storage(e.into()))
}

fn commit(tx: Transaction<'_>) -> Result<(), BookingError> {
    tx.commit().map_err(|e| BookingError::Storage(e.into()))
}

fn insert_slot_guarded(
    conn: &Connection,
    booking_id: i64,
    interval: &Interval,
) -> Result<Slot, BookingError> {
    match queries::insert_slot(conn, booking_id, interval) {
        Ok(slot) => Ok(slot),
        Err(e) if is_overlap_abort(&e) => {
            Err(storage_conflict(conn, interval, Exclusion::none()))
        }
        Err(e) => Err(e.into()),
    }
}

fn is_overlap_abort(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains(OVERLAP_GUARD)
    )
}

fn storage_conflict(conn: &Connection, candidate: &Interval, exclude: Exclusion) -> BookingError {
    match availability::find_conflicts(conn, candidate, exclude) {
        Ok(existing) => {
            tracing::warn!(
                start = %candidate.start,
                end = %candidate.end,
                conflicts = existing.len(),
                "storage overlap guard rejected slot"
            );
            BookingError::Conflict {
                candidate: *candidate,
                existing,
            }
        }
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::NaiveDateTime;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn iv(start: &str, end: &str) -> Interval {
        let parse = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap();
        Interval::new(parse(start), parse(end))
    }

    fn book(conn: &mut Connection, user: &User, start: &str, end: &str) -> Booking {
        create_booking(conn, user, &[iv(start, end)]).unwrap()
    }

    #[test]
    fn test_create_booking_with_two_slots() {
        let mut conn = setup_db();
        let user = queries::create_user(&conn, "alice").unwrap();

        let slots = [
            iv("2025-01-02 10:00", "2025-01-02 11:00"),
            iv("2025-01-03 10:00", "2025-01-03 11:00"),
        ];
        let booking = create_booking(&mut conn, &user, &slots).unwrap();

        assert_eq!(booking.user_id, user.id);
        assert_eq!(booking.slots.len(), 2);
        assert!(booking.slots.iter().all(|s| s.booking_id == booking.id));

        let stored = queries::get_booking(&conn, booking.id).unwrap().unwrap();
        assert_eq!(stored.slots, booking.slots);
    }

    #[test]
    fn test_create_booking_empty_batch_rejected() {
        let mut conn = setup_db();
        let user = queries::create_user(&conn, "alice").unwrap();

        let err = create_booking(&mut conn, &user, &[]).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_eq!(queries::count_bookings(&conn).unwrap(), 0);
    }

    #[test]
    fn test_sub_second_slot_rejected_before_storage() {
        let mut conn = setup_db();
        let user = queries::create_user(&conn, "alice").unwrap();

        let day = chrono::NaiveDate::from_ymd_opt(2030, 1, 2).unwrap();
        let slot = Interval::new(
            day.and_hms_milli_opt(10, 0, 0, 200).unwrap(),
            day.and_hms_milli_opt(10, 0, 0, 700).unwrap(),
        );
        let err = create_booking(&mut conn, &user, &[slot]).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)), "got {err:?}");
        assert_eq!(queries::count_bookings(&conn).unwrap(), 0);
        assert_eq!(queries::count_slots(&conn).unwrap(), 0);
    }

    #[test]
    fn test_sub_second_slot_stored_at_whole_seconds() {
        let mut conn = setup_db();
        let user = queries::create_user(&conn, "alice").unwrap();

        let day = chrono::NaiveDate::from_ymd_opt(2030, 1, 2).unwrap();
        let slot = Interval::new(
            day.and_hms_milli_opt(10, 0, 0, 200).unwrap(),
            day.and_hms_milli_opt(10, 0, 1, 700).unwrap(),
        );
        let booking = create_booking(&mut conn, &user, &[slot]).unwrap();

        let stored = queries::get_slot(&conn, booking.slots[0].id).unwrap().unwrap();
        assert_eq!(stored.interval(), booking.slots[0].interval());
        assert_eq!(stored.start_time, day.and_hms_opt(10, 0, 0).unwrap());
        assert_eq!(stored.end_time, day.and_hms_opt(10, 0, 1).unwrap());
    }

    #[test]
    fn test_internal_overlap_persists_nothing() {
        let mut conn = setup_db();
        let user = queries::create_user(&conn, "alice").unwrap();

        let slots = [
            iv("2025-01-02 10:00", "2025-01-02 11:00"),
            iv("2025-01-02 10:59", "2025-01-02 12:00"),
        ];
        let err = create_booking(&mut conn, &user, &slots).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_eq!(queries::count_bookings(&conn).unwrap(), 0);
        assert_eq!(queries::count_slots(&conn).unwrap(), 0);
    }

    #[test]
    fn test_conflict_with_other_user_leaves_store_unchanged() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let bob = queries::create_user(&conn, "bob").unwrap();

        let existing = iv("2025-01-02 10:00", "2025-01-02 11:00");
        create_booking(&mut conn, &alice, &[existing]).unwrap();

        // The first slot is free, so the booking row and that slot get written
        // before the second slot hits the conflict.
        let slots = [iv("2025-01-01 10:00", "2025-01-01 11:00"), existing];
        let err = create_booking(&mut conn, &bob, &slots).unwrap_err();
        match err {
            BookingError::Conflict { candidate, existing: rows } => {
                assert_eq!(candidate, existing);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        assert_eq!(queries::count_bookings(&conn).unwrap(), 1);
        assert_eq!(queries::count_slots(&conn).unwrap(), 1);
        assert!(queries::get_bookings_for_user(&conn, bob.id).unwrap().is_empty());
    }

    #[test]
    fn test_touching_existing_slot_is_allowed() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let bob = queries::create_user(&conn, "bob").unwrap();

        book(&mut conn, &alice, "2025-01-02 10:00", "2025-01-02 11:00");
        let booking = book(&mut conn, &bob, "2025-01-02 11:00", "2025-01-02 12:00");
        assert_eq!(booking.slots.len(), 1);
    }

    #[test]
    fn test_add_slot() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let booking = book(&mut conn, &alice, "2025-01-02 10:00", "2025-01-02 11:00");

        let slot = add_slot(&mut conn, &booking, &iv("2025-01-02 14:00", "2025-01-02 15:00"))
            .unwrap();
        assert_eq!(slot.booking_id, booking.id);
        assert_eq!(queries::get_slots_for_booking(&conn, booking.id).unwrap().len(), 2);
    }

    #[test]
    fn test_add_slot_conflicting_with_other_booking() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let bob = queries::create_user(&conn, "bob").unwrap();
        book(&mut conn, &alice, "2025-01-02 10:00", "2025-01-02 11:00");
        let booking = book(&mut conn, &bob, "2025-01-05 10:00", "2025-01-05 11:00");

        let err = add_slot(&mut conn, &booking, &iv("2025-01-02 10:30", "2025-01-02 11:30"))
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict { .. }));
        assert_eq!(queries::count_slots(&conn).unwrap(), 2);
    }

    #[test]
    fn test_add_slot_overlapping_own_sibling_hits_storage_guard() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let booking = book(&mut conn, &alice, "2025-01-02 10:00", "2025-01-02 11:00");

        let err = add_slot(&mut conn, &booking, &iv("2025-01-02 10:30", "2025-01-02 11:30"))
            .unwrap_err();
        match err {
            BookingError::Conflict { existing, .. } => {
                assert_eq!(existing.len(), 1);
                assert_eq!(existing[0].booking_id, booking.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(queries::count_slots(&conn).unwrap(), 1);
    }

    #[test]
    fn test_update_slot_within_its_own_interval() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let booking = book(&mut conn, &alice, "2025-01-02 10:00", "2025-01-02 11:00");
        let slot = &booking.slots[0];

        let updated =
            update_slot(&mut conn, slot, &iv("2025-01-02 10:30", "2025-01-02 11:30")).unwrap();
        assert_eq!(updated.id, slot.id);

        let stored = queries::get_slot(&conn, slot.id).unwrap().unwrap();
        assert_eq!(stored.interval(), iv("2025-01-02 10:30", "2025-01-02 11:30"));
    }

    #[test]
    fn test_update_slot_conflict_keeps_original_interval() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let bob = queries::create_user(&conn, "bob").unwrap();
        book(&mut conn, &alice, "2025-01-02 10:00", "2025-01-02 11:00");
        let booking = book(&mut conn, &bob, "2025-01-02 12:00", "2025-01-02 13:00");
        let slot = &booking.slots[0];

        let err =
            update_slot(&mut conn, slot, &iv("2025-01-02 10:30", "2025-01-02 12:30")).unwrap_err();
        assert!(matches!(err, BookingError::Conflict { .. }));

        let stored = queries::get_slot(&conn, slot.id).unwrap().unwrap();
        assert_eq!(stored.interval(), iv("2025-01-02 12:00", "2025-01-02 13:00"));
    }

    #[test]
    fn test_update_slot_checked_against_siblings() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let slots = [
            iv("2025-01-02 10:00", "2025-01-02 11:00"),
            iv("2025-01-02 12:00", "2025-01-02 13:00"),
        ];
        let booking = create_booking(&mut conn, &alice, &slots).unwrap();

        let moved = iv("2025-01-02 10:30", "2025-01-02 12:30");
        let err = update_slot(&mut conn, &booking.slots[1], &moved).unwrap_err();
        assert!(matches!(err, BookingError::Conflict { .. }));
    }

    #[test]
    fn test_delete_booking_cascades_to_slots() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let slots = [
            iv("2025-01-02 10:00", "2025-01-02 11:00"),
            iv("2025-01-03 10:00", "2025-01-03 11:00"),
        ];
        let booking = create_booking(&mut conn, &alice, &slots).unwrap();

        delete_booking(&mut conn, &booking).unwrap();

        assert!(queries::get_booking(&conn, booking.id).unwrap().is_none());
        assert_eq!(queries::count_slots(&conn).unwrap(), 0);

        // The freed interval can be booked again.
        assert!(create_booking(&mut conn, &alice, &slots).is_ok());
    }

    #[test]
    fn test_list_bookings_only_returns_own() {
        let mut conn = setup_db();
        let alice = queries::create_user(&conn, "alice").unwrap();
        let bob = queries::create_user(&conn, "bob").unwrap();
        book(&mut conn, &alice, "2025-01-02 10:00", "2025-01-02 11:00");
        book(&mut conn, &bob, "2025-01-02 12:00", "2025-01-02 13:00");

        let bookings = list_bookings(&conn, &alice).unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].user_id, alice.id);
        assert_eq!(bookings[0].slots.len(), 1);
    }
}
