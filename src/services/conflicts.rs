use chrono::NaiveDateTime;

use crate::errors::BookingError;
use crate::models::Interval;

// `End` sorts before `Start`, so at equal instants a slot closes before the
// next one opens and touching slots are not counted as overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    End,
    Start,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    at: NaiveDateTime,
    kind: EventKind,
}

/// Validates a batch of slots submitted together, before anything is persisted.
///
/// Every slot must have `start < end`, and no two slots in the batch may overlap.
pub fn validate_batch(slots: &[Interval]) -> Result<(), BookingError> {
    if slots.is_empty() {
        return Err(BookingError::Validation(
            "at least one slot is required".to_string(),
        ));
    }

    for slot in slots {
        if !slot.is_well_ordered() {
            return Err(BookingError::Validation(
                "end time must be after start time".to_string(),
            ));
        }
    }

    if has_internal_overlap(slots) {
        return Err(BookingError::Validation(
            "slots in the request overlap each other".to_string(),
        ));
    }

    Ok(())
}

/// Sweep-line scan over start/end events. Assumes every slot is well ordered.
pub fn has_internal_overlap(slots: &[Interval]) -> bool {
    let mut events: Vec<Event> = Vec::with_capacity(slots.len() * 2);
    for slot in slots {
        events.push(Event {
            at: slot.start,
            kind: EventKind::Start,
        });
        events.push(Event {
            at: slot.end,
            kind: EventKind::End,
        });
    }

    events.sort_by_key(|e| (e.at, e.kind));

    let mut active: i64 = 0;
    for event in &events {
        match event.kind {
            EventKind::Start => active += 1,
            EventKind::End => active -= 1,
        }
        if active > 1 {
            return true;
        }
    }
    false
}
