//! Error taxonomy surfaced by the reminder service.
//!
//! Only validation problems reach the caller with detail. Everything else is
//! logged where it happens and reported as an opaque internal error.

use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

// ---

#[derive(Error, Debug)]
pub enum ReminderError {
    /// A required field is missing or invalid. Nothing was persisted.
    #[error("{0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

pub(crate) const INVALID_MINUTES_BEFORE: &str =
    "please specify minutesBefore as a positive number of minutes";

impl ReminderError {
    pub fn missing(field: &str) -> Self {
        Self::Validation(format!("please specify {field}"))
    }

    /// A field was present but had the wrong shape.
    pub fn invalid(field: &str) -> Self {
        match field {
            "minutesBefore" => Self::Validation(INVALID_MINUTES_BEFORE.to_string()),
            _ => Self::Validation(format!("please specify {field} with a valid value")),
        }
    }
}

/// Body decode failures are caller mistakes, reported like any other
/// validation problem. The offending field is named when axum reports a path.
impl From<JsonRejection> for ReminderError {
    fn from(rejection: JsonRejection) -> Self {
        // ---
        let detail = rejection.body_text();
        let field = match &rejection {
            JsonRejection::JsonDataError(_) => detail
                .split_once("target type: ")
                .and_then(|(_, rest)| rest.split_once(": "))
                .map(|(path, _)| path.trim())
                .filter(|path| !path.is_empty() && !path.contains(char::is_whitespace)),
            _ => None,
        };

        match field {
            Some(field) => Self::invalid(field),
            None => Self::Validation(format!(
                "please specify a valid JSON reminder request: {detail}"
            )),
        }
    }
}

impl IntoResponse for ReminderError {
    fn into_response(self) -> axum::response::Response {
        // ---
        match self {
            Self::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            Self::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_invalid_names_the_field() {
        assert_eq!(
            ReminderError::invalid("minutesBefore").to_string(),
            INVALID_MINUTES_BEFORE
        );
        assert_eq!(
            ReminderError::invalid("departureTime").to_string(),
            "please specify departureTime with a valid value"
        );
    }
}
