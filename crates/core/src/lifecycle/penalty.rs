use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::booking::{Booking, SubjectType};
use crate::lifecycle::LifecycleError;

/// Outcome of a cancellation decision. Fixed once computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyDecision {
    pub penalty_applied: bool,
    pub penalty_amount: Decimal,
}

impl PenaltyDecision {
    pub fn none() -> Self {
        Self { penalty_applied: false, penalty_amount: Decimal::ZERO }
    }
}

/// Free-cancellation window and the fraction charged once it has closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    pub free_window_days: u32,
    pub penalty_rate: Decimal,
}

impl PenaltyPolicy {
    pub fn new(free_window_days: u32, penalty_rate: Decimal) -> Result<Self, LifecycleError> {
        validate_rate(penalty_rate)?;
        Ok(Self { free_window_days, penalty_rate })
    }

    pub fn free_cancellation_deadline(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_sub_signed(Duration::days(i64::from(self.free_window_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Penalty for cancelling, at `now`, a booking worth `amount` that starts at `start`.
    pub fn evaluate(
        &self,
        amount: Decimal,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PenaltyDecision, LifecycleError> {
        if amount < Decimal::ZERO {
            return Err(LifecycleError::InvalidAmount { field: "amount", value: amount });
        }
        validate_rate(self.penalty_rate)?;

        if now <= self.free_cancellation_deadline(start) {
            return Ok(PenaltyDecision::none());
        }

        let raw = amount
            .checked_mul(self.penalty_rate)
            .ok_or(LifecycleError::InvalidAmount { field: "amount", value: amount })?;

        Ok(PenaltyDecision {
            penalty_applied: true,
            penalty_amount: raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        })
    }
}

/// Penalty policy per booked resource kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltySchedule {
    pub venue: PenaltyPolicy,
    pub service: PenaltyPolicy,
}

impl PenaltySchedule {
    pub fn for_subject(&self, subject_type: SubjectType) -> &PenaltyPolicy {
        match subject_type {
            SubjectType::Venue => &self.venue,
            SubjectType::Service => &self.service,
        }
    }
}

impl Default for PenaltySchedule {
    fn default() -> Self {
        Self {
            venue: PenaltyPolicy { free_window_days: 14, penalty_rate: Decimal::new(30, 2) },
            service: PenaltyPolicy { free_window_days: 7, penalty_rate: Decimal::new(20, 2) },
        }
    }
}

/// Decides whether cancelling `booking` at `now` costs anything.
///
/// The free window closes `free_window_days` before the booking starts and the
/// deadline itself is still free. Past it, the charge is `amount * rate`
/// rounded half-up to whole currency units.
pub fn compute_cancellation_penalty(
    booking: &Booking,
    now: DateTime<Utc>,
    policy: &PenaltyPolicy,
) -> Result<PenaltyDecision, LifecycleError> {
    policy.evaluate(booking.amount(), booking.start_time(), now)
}

fn validate_rate(rate: Decimal) -> Result<(), LifecycleError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(LifecycleError::InvalidAmount { field: "penalty_rate", value: rate });
    }
    Ok(())
}
