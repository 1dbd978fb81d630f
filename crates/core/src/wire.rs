//! Backend JSON shape of a booking and the mapping into domain types.
//!
//! This is the only place that knows about the backend's loose status strings,
//! including `CONFIRMED`, which older screens still send for `ACCEPTED`.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::booking::{
    Booking, BookingId, BookingRequest, BookingState, BookingStatus, BookingValidationError,
    BookingWindow, EventId, SubjectId, SubjectType,
};
use crate::lifecycle::PenaltyDecision;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: String,
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub amount: f64,
    #[serde(default)]
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum WireError {
    #[error("malformed booking document: {0}")]
    Malformed(String),
    #[error("unknown booking status `{0}`")]
    UnknownStatus(String),
    #[error("invalid {field}: `{value}` is not a non-negative finite number")]
    InvalidAmount { field: &'static str, value: String },
    #[error(transparent)]
    Validation(#[from] BookingValidationError),
}

/// Maps a backend status string onto the closed status set.
pub fn parse_status(value: &str) -> Result<BookingStatus, WireError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "PENDING" => Ok(BookingStatus::Pending),
        "ACCEPTED" | "CONFIRMED" => Ok(BookingStatus::Accepted),
        "REJECTED" => Ok(BookingStatus::Rejected),
        "CANCELLED" | "CANCELED" => Ok(BookingStatus::Cancelled),
        _ => Err(WireError::UnknownStatus(value.to_string())),
    }
}

pub fn parse_record(json: &str) -> Result<BookingRecord, WireError> {
    serde_json::from_str(json).map_err(|error| WireError::Malformed(error.to_string()))
}

/// Converts a backend record into a validated booking. Missing timestamps
/// default to `received_at`.
pub fn ingest(record: BookingRecord, received_at: DateTime<Utc>) -> Result<Booking, WireError> {
    let status = parse_status(&record.status)?;
    let subject_type = record.subject_type.parse::<SubjectType>()?;
    let amount = decimal_amount("amount", record.amount)?;
    let window = BookingWindow::new(record.start_time, record.end_time)?;

    let penalty = match record.penalty_applied {
        Some(penalty_applied) => Some(PenaltyDecision {
            penalty_applied,
            penalty_amount: match record.penalty_amount {
                Some(value) => decimal_amount("penalty_amount", value)?,
                None => Decimal::ZERO,
            },
        }),
        None => None,
    };

    let booking = Booking::restore(
        BookingId(record.id),
        BookingRequest {
            subject_type,
            subject_id: SubjectId(record.subject_id),
            event_id: record.event_id.filter(|id| !id.trim().is_empty()).map(EventId),
            window,
            amount,
            requested_by: record.requested_by,
        },
        BookingState {
            status,
            cancellation_reason: record.cancellation_reason,
            penalty,
            created_at: record.created_at.unwrap_or(received_at),
            updated_at: record.updated_at.unwrap_or(received_at),
        },
    )?;
    Ok(booking)
}

/// Outbound records always carry canonical status strings.
pub fn to_record(booking: &Booking) -> BookingRecord {
    BookingRecord {
        id: booking.id().0.clone(),
        subject_type: booking.subject_type().as_str().to_string(),
        subject_id: booking.subject_id().0.clone(),
        event_id: booking.event_id().map(|id| id.0.clone()),
        status: booking.status().as_str().to_string(),
        start_time: booking.start_time(),
        end_time: booking.end_time(),
        amount: booking.amount().to_f64().unwrap_or_default(),
        requested_by: booking.requested_by().to_string(),
        cancellation_reason: booking.cancellation_reason().map(str::to_string),
        penalty_applied: booking.penalty().map(|penalty| penalty.penalty_applied),
        penalty_amount: booking
            .penalty()
            .map(|penalty| penalty.penalty_amount.to_f64().unwrap_or_default()),
        created_at: Some(booking.created_at()),
        updated_at: Some(booking.updated_at()),
    }
}

fn decimal_amount(field: &'static str, value: f64) -> Result<Decimal, WireError> {
    Decimal::from_f64(value)
        .filter(|amount| *amount >= Decimal::ZERO)
        .ok_or_else(|| WireError::InvalidAmount { field, value: value.to_string() })
}
