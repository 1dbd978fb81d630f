use std::collections::HashMap;

use tokio::sync::RwLock;

use eventdesk_core::domain::booking::{
    Booking, BookingId, BookingState, BookingStatus, SubjectId, SubjectType,
};

use super::{check_edge, BookingRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<String, Booking>>,
}

#[async_trait::async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id.0).cloned())
    }

    async fn save(&self, booking: Booking) -> Result<(), RepositoryError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id().0) {
            return Err(RepositoryError::AlreadyExists(booking.id().clone()));
        }
        bookings.insert(booking.id().0.clone(), booking);
        Ok(())
    }

    async fn save_transition(
        &self,
        booking: Booking,
        from: BookingStatus,
    ) -> Result<(), RepositoryError> {
        check_edge(&booking, from)?;

        let mut bookings = self.bookings.write().await;
        let stale = || RepositoryError::StaleStatus { id: booking.id().clone(), expected: from };
        let stored = bookings
            .get(&booking.id().0)
            .filter(|stored| stored.status() == from)
            .ok_or_else(stale)?;
        let merged = Booking::restore(
            stored.id().clone(),
            stored.terms(),
            BookingState { created_at: stored.created_at(), ..booking.state() },
        )
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        bookings.insert(merged.id().0.clone(), merged);
        Ok(())
    }

    async fn list_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: &SubjectId,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = self.bookings.read().await;
        let mut found: Vec<Booking> = bookings
            .values()
            .filter(|booking| {
                booking.subject_type() == subject_type && booking.subject_id() == subject_id
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.start_time().cmp(&b.start_time()).then_with(|| a.id().0.cmp(&b.id().0))
        });
        Ok(found)
    }
}
