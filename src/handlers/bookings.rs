use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::{authenticate, ensure_owner};
use crate::models::interval::{format_timestamp, parse_timestamp};
use crate::models::{Booking, Interval, Slot};
use crate::services::booking;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SlotPayload {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Deserialize)]
pub struct StoreBookingRequest {
    pub slots: Option<Vec<SlotPayload>>,
}

#[derive(Serialize)]
pub struct SlotResponse {
    id: i64,
    booking_id: i64,
    start_time: String,
    end_time: String,
}

#[derive(Serialize)]
pub struct BookingResponse {
    id: i64,
    user_id: i64,
    created_at: String,
    slots: Vec<SlotResponse>,
}

impl From<Slot> for SlotResponse {
    fn from(s: Slot) -> Self {
        SlotResponse {
            id: s.id,
            booking_id: s.booking_id,
            start_time: format_timestamp(&s.start_time),
            end_time: format_timestamp(&s.end_time),
        }
    }
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        BookingResponse {
            id: b.id,
            user_id: b.user_id,
            created_at: format_timestamp(&b.created_at),
            slots: b.slots.into_iter().map(SlotResponse::from).collect(),
        }
    }
}

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let db = state.conn()?;
    let user = authenticate(&headers, &db)?;

    let bookings = booking::list_bookings(&db, &user)?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<StoreBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let mut db = state.conn()?;
    let user = authenticate(&headers, &db)?;
    let Json(body) = body.map_err(malformed_body)?;

    let not_before = earliest_start(&state);
    let mut errors = BTreeMap::new();
    let slots = match body.slots.as_deref() {
        None | Some([]) => {
            errors.insert(
                "slots".to_string(),
                vec!["at least one slot is required".to_string()],
            );
            vec![]
        }
        Some(payloads) => payloads
            .iter()
            .enumerate()
            .filter_map(|(i, p)| validate_slot(&format!("slots.{i}."), p, not_before, &mut errors))
            .collect(),
    };
    reject_invalid(errors)?;

    let created = booking::create_booking(&mut db, &user, &slots)?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

// POST /api/bookings/:booking/slots
pub async fn add_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<i64>,
    body: Result<Json<SlotPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<SlotResponse>), AppError> {
    let mut db = state.conn()?;
    let user = authenticate(&headers, &db)?;
    let target = load_booking(&db, booking_id)?;
    ensure_owner(&user, &target)?;
    let Json(body) = body.map_err(malformed_body)?;

    let interval = validate_single(&body, earliest_start(&state))?;

    let slot = booking::add_slot(&mut db, &target, &interval)?;
    Ok((StatusCode::CREATED, Json(slot.into())))
}

// PATCH /api/bookings/:booking/slots/:slot
pub async fn update_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((booking_id, slot_id)): Path<(i64, i64)>,
    body: Result<Json<SlotPayload>, JsonRejection>,
) -> Result<Json<SlotResponse>, AppError> {
    let mut db = state.conn()?;
    let user = authenticate(&headers, &db)?;
    let target = load_booking(&db, booking_id)?;
    ensure_owner(&user, &target)?;
    let Json(body) = body.map_err(malformed_body)?;

    let slot = target
        .slots
        .iter()
        .find(|s| s.id == slot_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("slot {slot_id} in booking {booking_id}")))?;

    let interval = validate_single(&body, None)?;

    let updated = booking::update_slot(&mut db, &slot, &interval)?;
    Ok(Json(updated.into()))
}

// DELETE /api/bookings/:booking
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut db = state.conn()?;
    let user = authenticate(&headers, &db)?;
    let target = load_booking(&db, booking_id)?;
    ensure_owner(&user, &target)?;

    booking::delete_booking(&mut db, &target)?;
    Ok(Json(serde_json::json!({
        "message": "Booking deleted",
        "deleted_booking_id": target.id,
    })))
}

fn load_booking(conn: &Connection, id: i64) -> Result<Booking, AppError> {
    queries::get_booking(conn, id)?.ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

fn earliest_start(state: &AppState) -> Option<NaiveDateTime> {
    if state.config.allow_past_slots {
        None
    } else {
        Some(Utc::now().naive_utc())
    }
}

fn validate_single(
    payload: &SlotPayload,
    not_before: Option<NaiveDateTime>,
) -> Result<Interval, AppError> {
    let mut errors = BTreeMap::new();
    let interval = validate_slot("", payload, not_before, &mut errors);
    reject_invalid(errors)?;
    interval.ok_or_else(|| AppError::validation("invalid slot"))
}

/// Field-level checks on one slot payload. Messages are collected under
/// `{prefix}start_time` / `{prefix}end_time`.
fn validate_slot(
    prefix: &str,
    payload: &SlotPayload,
    not_before: Option<NaiveDateTime>,
    errors: &mut BTreeMap<String, Vec<String>>,
) -> Option<Interval> {
    let start_key = format!("{prefix}start_time");
    let end_key = format!("{prefix}end_time");

    let start = parse_field(&start_key, payload.start_time.as_deref(), errors);
    let end = parse_field(&end_key, payload.end_time.as_deref(), errors);

    if let (Some(start), Some(not_before)) = (start, not_before) {
        if start < not_before {
            errors
                .entry(start_key)
                .or_default()
                .push("start time must not be in the past".to_string());
            return None;
        }
    }

    let (start, end) = (start?, end?);
    if end <= start {
        errors
            .entry(end_key)
            .or_default()
            .push("end time must be after start time".to_string());
        return None;
    }
    Some(Interval::new(start, end))
}

fn parse_field(
    key: &str,
    value: Option<&str>,
    errors: &mut BTreeMap<String, Vec<String>>,
) -> Option<NaiveDateTime> {
    let message = match value {
        None => "this field is required",
        Some(v) => match parse_timestamp(v) {
            Ok(dt) => return Some(dt),
            Err(_) => "not a valid date-time",
        },
    };
    errors
        .entry(key.to_string())
        .or_default()
        .push(message.to_string());
    None
}

/// Body extraction failures (bad JSON, wrong field types, missing content
/// type) are reported like any other invalid input.
fn malformed_body(rejection: JsonRejection) -> AppError {
    let mut errors = BTreeMap::new();
    errors.insert("body".to_string(), vec![rejection.body_text()]);
    AppError::Validation {
        message: "the given data was invalid".to_string(),
        errors,
    }
}

fn reject_invalid(errors: BTreeMap<String, Vec<String>>) -> Result<(), AppError> {
    if errors.is_empty() {
        return Ok(());
    }
    Err(AppError::Validation {
        message: "the given data was invalid".to_string(),
        errors,
    })
}
