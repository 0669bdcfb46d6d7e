use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Interval, Slot};

/// Rows left out of an availability check.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exclusion {
    pub booking_id: Option<i64>,
    pub slot_id: Option<i64>,
}

impl Exclusion {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn booking(id: i64) -> Self {
        Self {
            booking_id: Some(id),
            slot_id: None,
        }
    }

    pub fn slot(id: i64) -> Self {
        Self {
            booking_id: None,
            slot_id: Some(id),
        }
    }
}

/// Persisted slots, across all users, that overlap `candidate`.
pub fn find_conflicts(
    conn: &Connection,
    candidate: &Interval,
    exclude: Exclusion,
) -> Result<Vec<Slot>, BookingError> {
    let rows =
        queries::get_slots_overlapping(conn, candidate, exclude.booking_id, exclude.slot_id)?;
    Ok(rows
        .into_iter()
        .filter(|slot| candidate.overlaps(&slot.interval()))
        .collect())
}

pub fn check_available(
    conn: &Connection,
    candidate: &Interval,
    exclude: Exclusion,
) -> Result<(), BookingError> {
    let existing = find_conflicts(conn, candidate, exclude)?;
    if existing.is_empty() {
        return Ok(());
    }

    tracing::warn!(
        start = %candidate.start,
        end = %candidate.end,
        conflicts = existing.len(),
        "slot conflicts with existing bookings"
    );
    Err(BookingError::Conflict {
        candidate: *candidate,
        existing,
    })
}
