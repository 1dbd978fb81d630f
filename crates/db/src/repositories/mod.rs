use async_trait::async_trait;
use thiserror::Error;

use eventdesk_core::domain::booking::{Booking, BookingId, BookingStatus, SubjectId, SubjectType};

pub mod booking;
pub mod memory;

pub use booking::SqlBookingRepository;
pub use memory::InMemoryBookingRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("booking `{0}` already exists")]
    AlreadyExists(BookingId),
    #[error("booking `{id}` is no longer {expected}")]
    StaleStatus { id: BookingId, expected: BookingStatus },
    #[error("cannot store booking `{id}` moving from {from} to {to}")]
    IllegalTransition { id: BookingId, from: BookingStatus, to: BookingStatus },
}

pub(crate) fn check_edge(booking: &Booking, from: BookingStatus) -> Result<(), RepositoryError> {
    if from.can_transition_to(booking.status()) {
        return Ok(());
    }
    Err(RepositoryError::IllegalTransition {
        id: booking.id().clone(),
        from,
        to: booking.status(),
    })
}

/// Storage for bookings.
///
/// `save` only inserts. `save_transition` updates the lifecycle fields of a
/// stored booking, and only while its stored status is still `from`; the
/// subject, window, amount and requester stay as first stored.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError>;
    async fn save(&self, booking: Booking) -> Result<(), RepositoryError>;
    async fn save_transition(
        &self,
        booking: Booking,
        from: BookingStatus,
    ) -> Result<(), RepositoryError>;
    async fn list_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: &SubjectId,
    ) -> Result<Vec<Booking>, RepositoryError>;
}
