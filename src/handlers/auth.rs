use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, User};

/// Resolves the bearer token on the request to a user.
pub fn authenticate(headers: &HeaderMap, conn: &Connection) -> Result<User, AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized("Token required"))?;

    queries::get_user_by_token(conn, token)?.ok_or(AppError::Unauthorized("Invalid token"))
}

pub fn ensure_owner(user: &User, booking: &Booking) -> Result<(), AppError> {
    if booking.is_owned_by(user) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = user.id,
            booking_id = booking.id,
            "access to foreign booking denied"
        );
        Err(AppError::Forbidden)
    }
}
