use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::booking::{Booking, BookingStatus};
use crate::lifecycle::penalty::{compute_cancellation_penalty, PenaltyPolicy, PenaltySchedule};
use crate::lifecycle::states::{BookingAction, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid booking transition from {status} using {action}")]
    InvalidTransition { status: BookingStatus, action: BookingAction },
    #[error("a reason is required to {action} a booking")]
    MissingReason { action: BookingAction },
    #[error("invalid {field}: {value} is out of range")]
    InvalidAmount { field: &'static str, value: Decimal },
}

/// Booking state machine with per-category cancellation penalties.
///
/// ```text
/// PENDING --(ACCEPT)--> ACCEPTED --(CANCEL)--> CANCELLED
/// PENDING --(REJECT)--> REJECTED
/// ```
#[derive(Clone, Debug, Default)]
pub struct BookingLifecycle {
    schedule: PenaltySchedule,
}

impl BookingLifecycle {
    pub fn new(schedule: PenaltySchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &PenaltySchedule {
        &self.schedule
    }

    pub fn apply(
        &self,
        booking: &Booking,
        action: BookingAction,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let policy = self.schedule.for_subject(booking.subject_type());
        let result = transition_booking(booking, action, reason, now, policy);
        match &result {
            Ok(outcome) => debug!(
                event_name = "booking.lifecycle.transition_applied",
                booking_id = %booking.id(),
                from = %outcome.from,
                to = %outcome.to,
                action = %action,
                "booking transition applied"
            ),
            Err(error) => debug!(
                event_name = "booking.lifecycle.transition_rejected",
                booking_id = %booking.id(),
                status = %booking.status(),
                action = %action,
                error = %error,
                "booking transition rejected"
            ),
        }
        result
    }

    pub fn transition(
        &self,
        booking: &Booking,
        action: BookingAction,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Booking, LifecycleError> {
        self.apply(booking, action, reason, now).map(|outcome| outcome.booking)
    }

    pub fn apply_with_audit<S>(
        &self,
        booking: &Booking,
        action: BookingAction,
        reason: Option<&str>,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, LifecycleError>
    where
        S: AuditSink,
    {
        let result = self.apply(booking, action, reason, now);
        match &result {
            Ok(outcome) => {
                let mut event = AuditEvent::new(
                    Some(booking.id().clone()),
                    audit.correlation_id.clone(),
                    "booking.transition_applied",
                    AuditCategory::Lifecycle,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("action", action.as_str());
                if let Some(penalty) = outcome.booking.penalty() {
                    event = event
                        .with_metadata("penalty_applied", penalty.penalty_applied.to_string())
                        .with_metadata("penalty_amount", penalty.penalty_amount.to_string());
                }
                sink.emit(event);
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        Some(booking.id().clone()),
                        audit.correlation_id.clone(),
                        "booking.transition_rejected",
                        AuditCategory::Lifecycle,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("status", booking.status().as_str())
                    .with_metadata("action", action.as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

/// Applies `action` to `booking` using an explicit penalty policy.
pub fn transition(
    booking: &Booking,
    action: BookingAction,
    reason: Option<&str>,
    now: DateTime<Utc>,
    policy: &PenaltyPolicy,
) -> Result<Booking, LifecycleError> {
    transition_booking(booking, action, reason, now, policy).map(|outcome| outcome.booking)
}

fn transition_booking(
    booking: &Booking,
    action: BookingAction,
    reason: Option<&str>,
    now: DateTime<Utc>,
    policy: &PenaltyPolicy,
) -> Result<TransitionOutcome, LifecycleError> {
    let from = booking.status();
    let to = action.target();
    if !from.can_transition_to(to) {
        return Err(LifecycleError::InvalidTransition { status: from, action });
    }

    let reason =
        action.requires_reason().then(|| require_reason(action, reason)).transpose()?;
    let penalty = match action {
        BookingAction::Cancel => Some(compute_cancellation_penalty(booking, now, policy)?),
        BookingAction::Accept | BookingAction::Reject => None,
    };
    let next = booking.advance(to, reason, penalty, now);

    Ok(TransitionOutcome { from, to, action, booking: next })
}

fn require_reason(action: BookingAction, reason: Option<&str>) -> Result<String, LifecycleError> {
    reason
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string)
        .ok_or(LifecycleError::MissingReason { action })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::booking::{
        Booking, BookingId, BookingRequest, BookingStatus, BookingWindow, SubjectId, SubjectType,
    };
    use crate::lifecycle::engine::{transition, BookingLifecycle, LifecycleError};
    use crate::lifecycle::penalty::{PenaltyPolicy, PenaltySchedule};
    use crate::lifecycle::states::BookingAction;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, d, 0, 0, 0).unwrap()
    }

    fn pending(subject_type: SubjectType) -> Booking {
        Booking::request(
            BookingId("B-2024-0042".to_string()),
            BookingRequest {
                subject_type,
                subject_id: SubjectId("venue-riverside".to_string()),
                event_id: None,
                window: BookingWindow::new(day(20), day(21)).unwrap(),
                amount: Decimal::new(1200, 0),
                requested_by: "organizer-3".to_string(),
            },
            day(1),
        )
        .expect("valid booking")
    }

    fn lifecycle() -> BookingLifecycle {
        let policy = PenaltyPolicy::new(7, Decimal::new(2, 1)).unwrap();
        BookingLifecycle::new(PenaltySchedule { venue: policy, service: policy })
    }

    fn accepted() -> Booking {
        lifecycle()
            .transition(&pending(SubjectType::Venue), BookingAction::Accept, None, day(2))
            .expect("pending -> accepted")
    }

    #[test]
    fn accepting_a_pending_booking_sets_no_penalty_fields() {
        let booking = pending(SubjectType::Venue);
        let outcome =
            lifecycle().apply(&booking, BookingAction::Accept, None, day(2)).expect("accept");

        assert_eq!(outcome.from, BookingStatus::Pending);
        assert_eq!(outcome.to, BookingStatus::Accepted);
        assert!(outcome.booking.penalty().is_none());
        assert!(outcome.booking.cancellation_reason().is_none());
        assert_eq!(outcome.booking.updated_at(), day(2));
        assert_eq!(booking.status(), BookingStatus::Pending, "input is never mutated");
    }

    #[test]
    fn rejecting_without_a_reason_is_a_validation_error() {
        let booking = pending(SubjectType::Service);

        assert_eq!(
            lifecycle().transition(&booking, BookingAction::Reject, None, day(2)),
            Err(LifecycleError::MissingReason { action: BookingAction::Reject })
        );
        assert_eq!(
            lifecycle().transition(&booking, BookingAction::Reject, Some("   "), day(2)),
            Err(LifecycleError::MissingReason { action: BookingAction::Reject })
        );

        let rejected = lifecycle()
            .transition(&booking, BookingAction::Reject, Some("double booked"), day(2))
            .expect("reject with reason");
        assert_eq!(rejected.status(), BookingStatus::Rejected);
        assert_eq!(rejected.cancellation_reason(), Some("double booked"));
    }

    #[test]
    fn pending_bookings_cannot_be_cancelled() {
        let error = lifecycle()
            .transition(&pending(SubjectType::Venue), BookingAction::Cancel, Some("x"), day(2))
            .expect_err("pending requests are rejected, not cancelled");

        assert_eq!(
            error,
            LifecycleError::InvalidTransition {
                status: BookingStatus::Pending,
                action: BookingAction::Cancel
            }
        );
    }

    #[test]
    fn cancelling_inside_the_free_window_costs_nothing() {
        let cancelled = lifecycle()
            .transition(&accepted(), BookingAction::Cancel, Some("event moved"), day(10))
            .expect("accepted -> cancelled");

        assert_eq!(cancelled.status(), BookingStatus::Cancelled);
        let penalty = cancelled.penalty().expect("penalty decided on cancel");
        assert!(!penalty.penalty_applied);
        assert_eq!(penalty.penalty_amount, Decimal::ZERO);
    }

    #[test]
    fn cancelling_late_applies_the_penalty() {
        let cancelled = lifecycle()
            .transition(&accepted(), BookingAction::Cancel, Some("budget cut"), day(15))
            .expect("accepted -> cancelled");

        let penalty = cancelled.penalty().expect("penalty decided on cancel");
        assert!(penalty.penalty_applied);
        assert_eq!(penalty.penalty_amount, Decimal::new(240, 0));
        assert_eq!(cancelled.amount(), Decimal::new(1200, 0));
    }

    #[test]
    fn second_cancel_fails_instead_of_recomputing_the_penalty() {
        let cancelled = lifecycle()
            .transition(&accepted(), BookingAction::Cancel, Some("budget cut"), day(15))
            .expect("first cancel");

        let error = lifecycle()
            .transition(&cancelled, BookingAction::Cancel, Some("again"), day(19))
            .expect_err("terminal status");
        assert!(matches!(
            error,
            LifecycleError::InvalidTransition { status: BookingStatus::Cancelled, .. }
        ));
        assert_eq!(cancelled.penalty().map(|p| p.penalty_amount), Some(Decimal::new(240, 0)));
    }

    #[test]
    fn terminal_statuses_accept_no_action() {
        let rejected = lifecycle()
            .transition(&pending(SubjectType::Venue), BookingAction::Reject, Some("no"), day(2))
            .unwrap();

        for action in [BookingAction::Accept, BookingAction::Reject, BookingAction::Cancel] {
            let error = lifecycle()
                .transition(&rejected, action, Some("reason"), day(3))
                .expect_err("rejected is terminal");
            assert!(matches!(error, LifecycleError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn only_the_three_lifecycle_edges_are_allowed() {
        let pending = pending(SubjectType::Venue);
        let accepted = accepted();
        let rejected = lifecycle()
            .transition(&pending, BookingAction::Reject, Some("no"), day(2))
            .unwrap();
        let cancelled = lifecycle()
            .transition(&accepted, BookingAction::Cancel, Some("moved"), day(10))
            .unwrap();

        let illegal = [
            (&pending, BookingAction::Cancel),
            (&accepted, BookingAction::Accept),
            (&accepted, BookingAction::Reject),
            (&rejected, BookingAction::Accept),
            (&rejected, BookingAction::Reject),
            (&rejected, BookingAction::Cancel),
            (&cancelled, BookingAction::Accept),
            (&cancelled, BookingAction::Reject),
            (&cancelled, BookingAction::Cancel),
        ];

        for (booking, action) in illegal {
            for reason in [None, Some("reason")] {
                assert_eq!(
                    lifecycle().transition(booking, action, reason, day(11)),
                    Err(LifecycleError::InvalidTransition { status: booking.status(), action }),
                    "{} + {action} with reason {reason:?}",
                    booking.status()
                );
            }
        }
    }

    #[test]
    fn penalty_policy_follows_the_subject_type() {
        let schedule = PenaltySchedule {
            venue: PenaltyPolicy::new(14, Decimal::new(30, 2)).unwrap(),
            service: PenaltyPolicy::new(5, Decimal::new(20, 2)).unwrap(),
        };
        let lifecycle = BookingLifecycle::new(schedule);

        let venue = lifecycle
            .transition(&pending(SubjectType::Venue), BookingAction::Accept, None, day(1))
            .unwrap();
        let service = lifecycle
            .transition(&pending(SubjectType::Service), BookingAction::Accept, None, day(1))
            .unwrap();

        let venue = lifecycle.transition(&venue, BookingAction::Cancel, Some("x"), day(10)).unwrap();
        let service =
            lifecycle.transition(&service, BookingAction::Cancel, Some("x"), day(10)).unwrap();

        assert_eq!(venue.penalty().map(|p| p.penalty_amount), Some(Decimal::new(360, 0)));
        assert_eq!(service.penalty().map(|p| p.penalty_applied), Some(false));
    }

    #[test]
    fn free_function_uses_the_given_policy() {
        let policy = PenaltyPolicy::new(0, Decimal::ONE).unwrap();
        let after_start = day(20) + chrono::Duration::hours(1);
        let cancelled =
            transition(&accepted(), BookingAction::Cancel, Some("x"), after_start, &policy).unwrap();

        assert_eq!(cancelled.penalty().map(|p| p.penalty_amount), Some(Decimal::new(1200, 0)));
    }

    #[test]
    fn transitions_emit_audit_events() {
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(None, "req-42", "venue-provider-9");

        lifecycle()
            .apply_with_audit(
                &accepted(),
                BookingAction::Cancel,
                Some("budget cut"),
                day(15),
                &sink,
                &audit,
            )
            .expect("cancel succeeds");
        let _ = lifecycle().apply_with_audit(
            &pending(SubjectType::Venue),
            BookingAction::Cancel,
            Some("x"),
            day(15),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "booking.transition_applied");
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].metadata.get("penalty_amount").map(String::as_str), Some("240"));
        assert_eq!(events[1].event_type, "booking.transition_rejected");
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }
}
