use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use eventdesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use eventdesk_core::availability::conflicts;
use eventdesk_core::domain::booking::{
    Booking, BookingId, BookingRequest, BookingStatus, BookingValidationError,
};
use eventdesk_core::lifecycle::{
    BookingAction, BookingLifecycle, LifecycleError, TransitionOutcome,
};

use crate::repositories::{BookingRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("booking `{0}` was not found")]
    NotFound(BookingId),
    #[error("{subject} is already held for that window by {}", .conflicting.join(", "))]
    Unavailable { subject: String, conflicting: Vec<String> },
    #[error(transparent)]
    Validation(#[from] BookingValidationError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Runs booking requests and transitions against a repository.
///
/// Transitions are stored with a compare-and-set on the status they started
/// from. When two transitions on one booking race, the loser fails with
/// `InvalidTransition` against the status the winner stored.
pub struct BookingService<R, S> {
    repository: R,
    lifecycle: BookingLifecycle,
    audit: S,
}

impl<R, S> BookingService<R, S>
where
    R: BookingRepository,
    S: AuditSink,
{
    pub fn new(repository: R, lifecycle: BookingLifecycle, audit: S) -> Self {
        Self { repository, lifecycle, audit }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn lifecycle(&self) -> &BookingLifecycle {
        &self.lifecycle
    }

    /// Stores a new `PENDING` booking unless the window is already held.
    pub async fn request(
        &self,
        request: BookingRequest,
        audit: &AuditContext,
        now: DateTime<Utc>,
    ) -> Result<Booking, ServiceError> {
        let existing =
            self.repository.list_for_subject(request.subject_type, &request.subject_id).await?;
        let held_by: Vec<String> =
            conflicts(&existing, request.subject_type, &request.subject_id, &request.window)
                .into_iter()
                .map(|booking| booking.id().0.clone())
                .collect();

        if !held_by.is_empty() {
            warn!(
                event_name = "booking.service.request_unavailable",
                correlation_id = %audit.correlation_id,
                subject_type = %request.subject_type,
                subject_id = %request.subject_id.0,
                conflicts = held_by.len(),
                "booking window unavailable"
            );
            self.audit.emit(
                AuditEvent::new(
                    None,
                    audit.correlation_id.clone(),
                    "booking.request_unavailable",
                    AuditCategory::Availability,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("subject_type", request.subject_type.as_str())
                .with_metadata("subject_id", request.subject_id.0.clone())
                .with_metadata("conflicts", held_by.join(",")),
            );
            return Err(ServiceError::Unavailable {
                subject: format!("{} {}", request.subject_type, request.subject_id.0),
                conflicting: held_by,
            });
        }

        let id = BookingId(format!("BK-{}", Uuid::new_v4().simple()));
        let booking = Booking::request(id, request, now)?;
        self.repository.save(booking.clone()).await?;

        info!(
            event_name = "booking.service.requested",
            booking_id = %booking.id(),
            correlation_id = %audit.correlation_id,
            subject_type = %booking.subject_type(),
            amount = %booking.amount(),
            "booking requested"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(booking.id().clone()),
                audit.correlation_id.clone(),
                "booking.requested",
                AuditCategory::Persistence,
                audit.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("subject_type", booking.subject_type().as_str())
            .with_metadata("amount", booking.amount().to_string()),
        );

        Ok(booking)
    }

    pub async fn accept(
        &self,
        id: &BookingId,
        audit: &AuditContext,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, ServiceError> {
        self.apply(id, BookingAction::Accept, None, audit, now).await
    }

    pub async fn reject(
        &self,
        id: &BookingId,
        reason: &str,
        audit: &AuditContext,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, ServiceError> {
        self.apply(id, BookingAction::Reject, Some(reason), audit, now).await
    }

    pub async fn cancel(
        &self,
        id: &BookingId,
        reason: &str,
        audit: &AuditContext,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, ServiceError> {
        self.apply(id, BookingAction::Cancel, Some(reason), audit, now).await
    }

    async fn apply(
        &self,
        id: &BookingId,
        action: BookingAction,
        reason: Option<&str>,
        audit: &AuditContext,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let booking = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;

        let outcome =
            self.lifecycle.apply_with_audit(&booking, action, reason, now, &self.audit, audit)?;
        match self.repository.save_transition(outcome.booking.clone(), outcome.from).await {
            Ok(()) => {}
            Err(RepositoryError::StaleStatus { .. }) => {
                return Err(self.lost_race(id, action, outcome.from, audit).await);
            }
            Err(error) => return Err(error.into()),
        }

        info!(
            event_name = "booking.service.transitioned",
            booking_id = %id,
            correlation_id = %audit.correlation_id,
            from = %outcome.from,
            to = %outcome.to,
            "booking transition stored"
        );
        Ok(outcome)
    }

    async fn lost_race(
        &self,
        id: &BookingId,
        action: BookingAction,
        from: BookingStatus,
        audit: &AuditContext,
    ) -> ServiceError {
        let current = match self.repository.find_by_id(id).await {
            Ok(Some(stored)) => stored.status(),
            Ok(None) => return ServiceError::NotFound(id.clone()),
            Err(error) => return error.into(),
        };

        warn!(
            event_name = "booking.service.transition_conflict",
            booking_id = %id,
            correlation_id = %audit.correlation_id,
            expected = %from,
            current = %current,
            action = %action,
            "booking changed before the transition was stored"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                audit.correlation_id.clone(),
                "booking.transition_conflict",
                AuditCategory::Persistence,
                audit.actor.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("expected", from.as_str())
            .with_metadata("current", current.as_str())
            .with_metadata("action", action.as_str()),
        );

        LifecycleError::InvalidTransition { status: current, action }.into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::Barrier;

    use eventdesk_core::audit::{AuditContext, InMemoryAuditSink};
    use eventdesk_core::domain::booking::{
        Booking, BookingId, BookingRequest, BookingStatus, BookingWindow, SubjectId, SubjectType,
    };
    use eventdesk_core::lifecycle::{
        BookingLifecycle, LifecycleError, PenaltyPolicy, PenaltySchedule,
    };

    use super::{BookingService, ServiceError};
    use crate::repositories::{BookingRepository, InMemoryBookingRepository, RepositoryError};

    /// Holds the first two reads until both have loaded their snapshot.
    struct InterleavedReads {
        inner: InMemoryBookingRepository,
        reads: AtomicUsize,
        barrier: Barrier,
    }

    #[async_trait::async_trait]
    impl BookingRepository for InterleavedReads {
        async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
            let found = self.inner.find_by_id(id).await?;
            if self.reads.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait().await;
            }
            Ok(found)
        }

        async fn save(&self, booking: Booking) -> Result<(), RepositoryError> {
            self.inner.save(booking).await
        }

        async fn save_transition(
            &self,
            booking: Booking,
            from: BookingStatus,
        ) -> Result<(), RepositoryError> {
            self.inner.save_transition(booking, from).await
        }

        async fn list_for_subject(
            &self,
            subject_type: SubjectType,
            subject_id: &SubjectId,
        ) -> Result<Vec<Booking>, RepositoryError> {
            self.inner.list_for_subject(subject_type, subject_id).await
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, d, 0, 0, 0).unwrap()
    }

    fn request(subject: &str, start: u32, end: u32) -> BookingRequest {
        BookingRequest {
            subject_type: SubjectType::Service,
            subject_id: SubjectId(subject.to_string()),
            event_id: None,
            window: BookingWindow::new(day(start), day(end)).unwrap(),
            amount: Decimal::new(1200, 0),
            requested_by: "organizer-1".to_string(),
        }
    }

    type TestService = BookingService<InMemoryBookingRepository, InMemoryAuditSink>;

    fn service() -> (TestService, InMemoryAuditSink) {
        let policy = PenaltyPolicy::new(7, Decimal::new(2, 1)).unwrap();
        let sink = InMemoryAuditSink::default();
        let service = BookingService::new(
            InMemoryBookingRepository::default(),
            BookingLifecycle::new(PenaltySchedule { venue: policy, service: policy }),
            sink.clone(),
        );
        (service, sink)
    }

    fn ctx() -> AuditContext {
        AuditContext::new(None, "req-1", "provider-3")
    }

    #[tokio::test]
    async fn request_accept_cancel_charges_the_late_penalty() {
        let (service, sink) = service();
        let booking =
            service.request(request("catering-1", 20, 21), &ctx(), day(1)).await.unwrap();
        assert_eq!(booking.status(), BookingStatus::Pending);

        let accepted = service.accept(booking.id(), &ctx(), day(2)).await.unwrap();
        assert_eq!(accepted.to, BookingStatus::Accepted);

        let cancelled =
            service.cancel(booking.id(), "guest count dropped", &ctx(), day(15)).await.unwrap();
        assert_eq!(cancelled.from, BookingStatus::Accepted);
        let penalty = cancelled.booking.penalty().copied().unwrap();
        assert!(penalty.penalty_applied);
        assert_eq!(penalty.penalty_amount, Decimal::new(240, 0));

        let stored = service.repository().find_by_id(booking.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Cancelled);
        assert_eq!(stored.amount(), Decimal::new(1200, 0));

        let types: Vec<String> = sink.events().into_iter().map(|event| event.event_type).collect();
        assert_eq!(
            types,
            vec!["booking.requested", "booking.transition_applied", "booking.transition_applied"]
        );
    }

    #[tokio::test]
    async fn second_cancel_fails_without_recomputing() {
        let (service, _sink) = service();
        let booking = service.request(request("dj-1", 20, 21), &ctx(), day(1)).await.unwrap();
        service.accept(booking.id(), &ctx(), day(2)).await.unwrap();
        let first = service.cancel(booking.id(), "moved", &ctx(), day(10)).await.unwrap();

        let error = service.cancel(booking.id(), "again", &ctx(), day(19)).await.unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Lifecycle(LifecycleError::InvalidTransition {
                status: BookingStatus::Cancelled,
                ..
            })
        ));

        let stored = service.repository().find_by_id(booking.id()).await.unwrap().unwrap();
        assert_eq!(stored.penalty(), first.booking.penalty());
        assert_eq!(stored.cancellation_reason(), Some("moved"));
    }

    #[tokio::test]
    async fn reject_requires_a_reason_and_leaves_the_booking_pending() {
        let (service, sink) = service();
        let booking = service.request(request("dj-1", 20, 21), &ctx(), day(1)).await.unwrap();

        let error = service.reject(booking.id(), "  ", &ctx(), day(2)).await.unwrap_err();
        assert!(matches!(error, ServiceError::Lifecycle(LifecycleError::MissingReason { .. })));

        let stored = service.repository().find_by_id(booking.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Pending);
        assert_eq!(
            sink.events().last().map(|event| event.event_type.clone()),
            Some("booking.transition_rejected".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let (service, _sink) = service();
        let error =
            service.accept(&BookingId("BK-missing".to_string()), &ctx(), day(2)).await.unwrap_err();
        assert!(matches!(error, ServiceError::NotFound(ref id) if id.0 == "BK-missing"));
    }

    #[tokio::test]
    async fn overlapping_request_is_refused_until_the_slot_frees_up() {
        let (service, sink) = service();
        let first = service.request(request("hall-a", 20, 22), &ctx(), day(1)).await.unwrap();

        let error =
            service.request(request("hall-a", 21, 23), &ctx(), day(1)).await.unwrap_err();
        let expected = vec![first.id().0.clone()];
        assert!(matches!(
            error,
            ServiceError::Unavailable { ref conflicting, .. } if conflicting == &expected
        ));
        assert_eq!(
            sink.events().last().map(|event| event.event_type.clone()),
            Some("booking.request_unavailable".to_string())
        );

        let touching = service.request(request("hall-a", 22, 23), &ctx(), day(1)).await;
        assert!(touching.is_ok());

        service.reject(first.id(), "double booked", &ctx(), day(2)).await.unwrap();
        let retry = service.request(request("hall-a", 21, 22), &ctx(), day(2)).await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn racing_cancels_store_one_penalty() {
        let policy = PenaltyPolicy::new(7, Decimal::new(2, 1)).unwrap();
        let sink = InMemoryAuditSink::default();
        let service = BookingService::new(
            InterleavedReads {
                inner: InMemoryBookingRepository::default(),
                reads: AtomicUsize::new(2),
                barrier: Barrier::new(2),
            },
            BookingLifecycle::new(PenaltySchedule { venue: policy, service: policy }),
            sink.clone(),
        );
        let booking = service.request(request("dj-1", 20, 21), &ctx(), day(1)).await.unwrap();
        service.accept(booking.id(), &ctx(), day(2)).await.unwrap();
        service.repository().reads.store(0, Ordering::SeqCst);

        let (early_ctx, late_ctx) = (ctx(), ctx());
        let (early, late) = tokio::join!(
            service.cancel(booking.id(), "early", &early_ctx, day(10)),
            service.cancel(booking.id(), "late", &late_ctx, day(19)),
        );

        let (winner, loser) = match (early, late) {
            (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
            other => panic!("exactly one cancel should be stored: {other:?}"),
        };
        assert!(matches!(
            loser,
            ServiceError::Lifecycle(LifecycleError::InvalidTransition {
                status: BookingStatus::Cancelled,
                ..
            })
        ));

        let stored = service.repository().find_by_id(booking.id()).await.unwrap().unwrap();
        assert_eq!(stored.penalty(), winner.booking.penalty());
        assert_eq!(stored.cancellation_reason(), winner.booking.cancellation_reason());
        assert_eq!(
            sink.events().last().map(|event| event.event_type.clone()),
            Some("booking.transition_conflict".to_string())
        );
    }
}
