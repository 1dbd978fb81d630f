use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::PenaltyDecision;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of resource a booking reserves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectType {
    Venue,
    Service,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Venue => "VENUE",
            Self::Service => "SERVICE",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = BookingValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "VENUE" => Ok(Self::Venue),
            "SERVICE" => Ok(Self::Service),
            _ => Err(BookingValidationError::UnknownSubjectType(value.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// `REJECTED` and `CANCELLED` admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Rejected)
                | (Self::Accepted, Self::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open `[start, end)` window of the booked event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BookingWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl BookingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BookingValidationError> {
        if end <= start {
            return Err(BookingValidationError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn overlaps(&self, other: &BookingWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BookingValidationError {
    #[error("booking window must end after it starts (start {start}, end {end})")]
    InvalidWindow { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error("booking amount must be non-negative, got {0}")]
    InvalidAmount(Decimal),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("unknown subject type `{0}` (expected VENUE|SERVICE)")]
    UnknownSubjectType(String),
    #[error("a {status} booking cannot carry {field}")]
    InconsistentState { status: BookingStatus, field: &'static str },
}

/// Everything the requester supplies when asking for a venue or service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookingRequest {
    pub subject_type: SubjectType,
    pub subject_id: SubjectId,
    pub event_id: Option<EventId>,
    pub window: BookingWindow,
    pub amount: Decimal,
    pub requested_by: String,
}

/// Lifecycle fields of a booking that already exists in the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingState {
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub penalty: Option<PenaltyDecision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A reservation of one venue or service for an event window.
///
/// Fields are private: the amount is fixed at creation and the status only
/// moves through [`crate::lifecycle::BookingLifecycle`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Booking {
    id: BookingId,
    subject_type: SubjectType,
    subject_id: SubjectId,
    event_id: Option<EventId>,
    status: BookingStatus,
    window: BookingWindow,
    amount: Decimal,
    requested_by: String,
    cancellation_reason: Option<String>,
    penalty: Option<PenaltyDecision>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a new `PENDING` booking from a request.
    pub fn request(
        id: BookingId,
        request: BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Self, BookingValidationError> {
        if request.requested_by.trim().is_empty() {
            return Err(BookingValidationError::MissingField("requested_by"));
        }
        Self::restore(
            id,
            request,
            BookingState {
                status: BookingStatus::Pending,
                cancellation_reason: None,
                penalty: None,
                created_at: now,
                updated_at: now,
            },
        )
    }

    /// Rebuilds a booking loaded from storage or the backend, checking that
    /// its lifecycle fields agree with its status.
    pub fn restore(
        id: BookingId,
        request: BookingRequest,
        state: BookingState,
    ) -> Result<Self, BookingValidationError> {
        if id.0.trim().is_empty() {
            return Err(BookingValidationError::MissingField("id"));
        }
        if request.subject_id.0.trim().is_empty() {
            return Err(BookingValidationError::MissingField("subject_id"));
        }
        if request.amount < Decimal::ZERO {
            return Err(BookingValidationError::InvalidAmount(request.amount));
        }

        let status = state.status;
        if state.cancellation_reason.is_some()
            && !matches!(status, BookingStatus::Rejected | BookingStatus::Cancelled)
        {
            return Err(BookingValidationError::InconsistentState {
                status,
                field: "a cancellation reason",
            });
        }
        if state.penalty.is_some() && status != BookingStatus::Cancelled {
            return Err(BookingValidationError::InconsistentState { status, field: "a penalty" });
        }

        Ok(Self {
            id,
            subject_type: request.subject_type,
            subject_id: request.subject_id,
            event_id: request.event_id,
            status,
            window: request.window,
            amount: request.amount,
            requested_by: request.requested_by,
            cancellation_reason: state.cancellation_reason,
            penalty: state.penalty,
            created_at: state.created_at,
            updated_at: state.updated_at,
        })
    }

    /// The requester-supplied terms this booking was created with.
    pub fn terms(&self) -> BookingRequest {
        BookingRequest {
            subject_type: self.subject_type,
            subject_id: self.subject_id.clone(),
            event_id: self.event_id.clone(),
            window: self.window,
            amount: self.amount,
            requested_by: self.requested_by.clone(),
        }
    }

    pub fn state(&self) -> BookingState {
        BookingState {
            status: self.status,
            cancellation_reason: self.cancellation_reason.clone(),
            penalty: self.penalty,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> &BookingId {
        &self.id
    }

    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub fn event_id(&self) -> Option<&EventId> {
        self.event_id.as_ref()
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn window(&self) -> &BookingWindow {
        &self.window
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.window.start
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.window.end
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn penalty(&self) -> Option<&PenaltyDecision> {
        self.penalty.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns a copy with new lifecycle fields. Callers check legality first.
    pub(crate) fn advance(
        &self,
        status: BookingStatus,
        cancellation_reason: Option<String>,
        penalty: Option<PenaltyDecision>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            cancellation_reason,
            penalty,
            updated_at: now,
            ..self.clone()
        }
    }
}
