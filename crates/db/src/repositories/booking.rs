use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use eventdesk_core::domain::booking::{
    Booking, BookingId, BookingRequest, BookingState, BookingStatus, BookingWindow, EventId,
    SubjectId, SubjectType,
};
use eventdesk_core::lifecycle::PenaltyDecision;
use eventdesk_core::wire::parse_status;

use super::{check_edge, BookingRepository, RepositoryError};
use crate::DbPool;

const BOOKING_COLUMNS: &str = "id, subject_type, subject_id, event_id, status, start_time,
     end_time, amount, requested_by, cancellation_reason, penalty_applied, penalty_amount,
     created_at, updated_at";

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<Booking, RepositoryError> {
    let id: String = decode(row, "id")?;
    let subject_type: String = decode(row, "subject_type")?;
    let subject_id: String = decode(row, "subject_id")?;
    let event_id: Option<String> = decode(row, "event_id")?;
    let status: String = decode(row, "status")?;
    let start_time: String = decode(row, "start_time")?;
    let end_time: String = decode(row, "end_time")?;
    let amount: String = decode(row, "amount")?;
    let requested_by: String = decode(row, "requested_by")?;
    let cancellation_reason: Option<String> = decode(row, "cancellation_reason")?;
    let penalty_applied: Option<bool> = decode(row, "penalty_applied")?;
    let penalty_amount: Option<String> = decode(row, "penalty_amount")?;
    let created_at: String = decode(row, "created_at")?;
    let updated_at: String = decode(row, "updated_at")?;

    let status = parse_status(&status).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject_type = subject_type
        .parse::<SubjectType>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let window = BookingWindow::new(
        parse_timestamp("start_time", &start_time)?,
        parse_timestamp("end_time", &end_time)?,
    )
    .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let penalty = match penalty_applied {
        Some(penalty_applied) => Some(PenaltyDecision {
            penalty_applied,
            penalty_amount: match penalty_amount {
                Some(value) => parse_decimal("penalty_amount", &value)?,
                None => Decimal::ZERO,
            },
        }),
        None => None,
    };

    Booking::restore(
        BookingId(id),
        BookingRequest {
            subject_type,
            subject_id: SubjectId(subject_id),
            event_id: event_id.map(EventId),
            window,
            amount: parse_decimal("amount", &amount)?,
            requested_by,
        },
        BookingState {
            status,
            cancellation_reason,
            penalty,
            created_at: parse_timestamp("created_at", &created_at)?,
            updated_at: parse_timestamp("updated_at", &updated_at)?,
        },
    )
    .map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM booking WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_booking(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, booking: Booking) -> Result<(), RepositoryError> {
        let penalty = booking.penalty();

        let result = sqlx::query(
            "INSERT INTO booking (id, subject_type, subject_id, event_id, status, start_time,
                                  end_time, amount, requested_by, cancellation_reason,
                                  penalty_applied, penalty_amount, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&booking.id().0)
        .bind(booking.subject_type().as_str())
        .bind(&booking.subject_id().0)
        .bind(booking.event_id().map(|id| id.0.as_str()))
        .bind(booking.status().as_str())
        .bind(booking.start_time().to_rfc3339())
        .bind(booking.end_time().to_rfc3339())
        .bind(booking.amount().to_string())
        .bind(booking.requested_by())
        .bind(booking.cancellation_reason())
        .bind(penalty.map(|p| p.penalty_applied))
        .bind(penalty.map(|p| p.penalty_amount.to_string()))
        .bind(booking.created_at().to_rfc3339())
        .bind(booking.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AlreadyExists(booking.id().clone()));
        }
        Ok(())
    }

    async fn save_transition(
        &self,
        booking: Booking,
        from: BookingStatus,
    ) -> Result<(), RepositoryError> {
        check_edge(&booking, from)?;
        let penalty = booking.penalty();

        // Booking terms are written once; a transition only moves the lifecycle columns.
        let result = sqlx::query(
            "UPDATE booking
             SET status = ?, cancellation_reason = ?, penalty_applied = ?, penalty_amount = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(booking.status().as_str())
        .bind(booking.cancellation_reason())
        .bind(penalty.map(|p| p.penalty_applied))
        .bind(penalty.map(|p| p.penalty_amount.to_string()))
        .bind(booking.updated_at().to_rfc3339())
        .bind(&booking.id().0)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::StaleStatus { id: booking.id().clone(), expected: from });
        }
        Ok(())
    }

    async fn list_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: &SubjectId,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM booking
             WHERE subject_type = ? AND subject_id = ?
             ORDER BY start_time ASC, id ASC"
        ))
        .bind(subject_type.as_str())
        .bind(&subject_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect::<Result<Vec<_>, _>>()
    }
}
