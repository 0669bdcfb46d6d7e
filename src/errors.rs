use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::interval::format_timestamp;
use crate::models::{Interval, Slot};

/// Failures raised by the booking core.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("time slot overlaps an existing booking")]
    Conflict {
        candidate: Interval,
        existing: Vec<Slot>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("{message}")]
    Validation {
        message: String,
        errors: BTreeMap<String, Vec<String>>,
    },

    #[error("time slot overlaps an existing booking")]
    Conflict {
        candidate: Interval,
        existing: Vec<Slot>,
    },

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(message) => AppError::validation(message),
            BookingError::Conflict {
                candidate,
                existing,
            } => AppError::Conflict {
                candidate,
                existing,
            },
            BookingError::Storage(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = match &self {
            AppError::Validation { message, errors } if !errors.is_empty() => {
                serde_json::json!({ "error": message, "errors": errors })
            }
            AppError::Conflict {
                candidate,
                existing,
            } => {
                let existing: Vec<serde_json::Value> = existing
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "id": s.id,
                            "booking_id": s.booking_id,
                            "start_time": format_timestamp(&s.start_time),
                            "end_time": format_timestamp(&s.end_time),
                        })
                    })
                    .collect();
                serde_json::json!({
                    "error": self.to_string(),
                    "conflicting_slot": {
                        "start_time": format_timestamp(&candidate.start),
                        "end_time": format_timestamp(&candidate.end),
                    },
                    "existing_slots": existing,
                })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}
