use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::interval::{format_timestamp, TIMESTAMP_FORMAT};
use crate::models::{Booking, Interval, Slot, User};

// ── Users ──

pub fn create_user(conn: &Connection, name: &str) -> anyhow::Result<User> {
    let api_token = uuid::Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO users (name, api_token) VALUES (?1, ?2)",
        params![name, api_token],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        api_token,
    })
}

pub fn get_user_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, name, api_token FROM users WHERE api_token = ?1",
        params![token],
        parse_user_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_user_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, name, api_token FROM users WHERE name = ?1 ORDER BY id LIMIT 1",
        params![name],
        parse_user_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        api_token: row.get(2)?,
    })
}

// ── Bookings ──

/// Inserts an empty booking row. Slots are attached separately.
pub fn insert_booking(conn: &Connection, user_id: i64) -> anyhow::Result<Booking> {
    let created_at_str = format_timestamp(&Utc::now().naive_utc());
    conn.execute(
        "INSERT INTO bookings (user_id, created_at) VALUES (?1, ?2)",
        params![user_id, created_at_str],
    )?;
    Ok(Booking {
        id: conn.last_insert_rowid(),
        user_id,
        created_at: NaiveDateTime::parse_from_str(&created_at_str, TIMESTAMP_FORMAT)?,
        slots: vec![],
    })
}

pub fn get_booking(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        "SELECT id, user_id, created_at FROM bookings WHERE id = ?1",
        params![id],
        parse_booking_row,
    );

    let mut booking = match result {
        Ok(booking) => booking,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    booking.slots = get_slots_for_booking(conn, booking.id)?;
    Ok(Some(booking))
}

pub fn get_bookings_for_user(conn: &Connection, user_id: i64) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, created_at FROM bookings WHERE user_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![user_id], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        let mut booking = row?;
        booking.slots = get_slots_for_booking(conn, booking.id)?;
        bookings.push(booking);
    }
    Ok(bookings)
}

/// Slots go with it through `ON DELETE CASCADE`.
pub fn delete_booking(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn count_bookings(conn: &Connection) -> anyhow::Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))?;
    Ok(count)
}

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let created_at_str: String = row.get(2)?;
    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: parse_stored(2, &created_at_str)?,
        slots: vec![],
    })
}

// ── Slots ──

pub fn insert_slot(
    conn: &Connection,
    booking_id: i64,
    interval: &Interval,
) -> anyhow::Result<Slot> {
    conn.execute(
        "INSERT INTO slots (booking_id, start_time, end_time) VALUES (?1, ?2, ?3)",
        params![
            booking_id,
            format_timestamp(&interval.start),
            format_timestamp(&interval.end),
        ],
    )?;
    Ok(Slot {
        id: conn.last_insert_rowid(),
        booking_id,
        start_time: interval.start,
        end_time: interval.end,
    })
}

pub fn update_slot_interval(
    conn: &Connection,
    id: i64,
    interval: &Interval,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET start_time = ?1, end_time = ?2 WHERE id = ?3",
        params![
            format_timestamp(&interval.start),
            format_timestamp(&interval.end),
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_slot(conn: &Connection, id: i64) -> anyhow::Result<Option<Slot>> {
    let result = conn.query_row(
        "SELECT id, booking_id, start_time, end_time FROM slots WHERE id = ?1",
        params![id],
        parse_slot_row,
    );

    match result {
        Ok(slot) => Ok(Some(slot)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_slots_for_booking(conn: &Connection, booking_id: i64) -> anyhow::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, start_time, end_time FROM slots
         WHERE booking_id = ?1 ORDER BY start_time ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], parse_slot_row)?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

/// Persisted slots whose interval intersects `[start, end)`, minus the excluded
/// booking's slots and the excluded slot.
pub fn get_slots_overlapping(
    conn: &Connection,
    interval: &Interval,
    exclude_booking_id: Option<i64>,
    exclude_slot_id: Option<i64>,
) -> anyhow::Result<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, start_time, end_time FROM slots
         WHERE start_time < ?1 AND end_time > ?2
           AND (?3 IS NULL OR booking_id != ?3)
           AND (?4 IS NULL OR id != ?4)
         ORDER BY start_time ASC, id ASC",
    )?;

    let rows = stmt.query_map(
        params![
            format_timestamp(&interval.end),
            format_timestamp(&interval.start),
            exclude_booking_id,
            exclude_slot_id,
        ],
        parse_slot_row,
    )?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

pub fn count_slots(conn: &Connection) -> anyhow::Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM slots", [], |row| row.get(0))?;
    Ok(count)
}

fn parse_slot_row(row: &rusqlite::Row) -> rusqlite::Result<Slot> {
    let start_str: String = row.get(2)?;
    let end_str: String = row.get(3)?;
    Ok(Slot {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        start_time: parse_stored(2, &start_str)?,
        end_time: parse_stored(3, &end_str)?,
    })
}

fn parse_stored(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
