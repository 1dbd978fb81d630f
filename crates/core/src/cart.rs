use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::booking::{Booking, BookingStatus, SubjectType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub line_count: usize,
    pub subtotal: Decimal,
    pub penalty_total: Decimal,
    pub total: Decimal,
    pub by_subject: BTreeMap<SubjectType, Decimal>,
    pub trace: Vec<CartTraceStep>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("cart {stage} overflowed while adding {value}")]
    Overflow { stage: &'static str, value: Decimal },
}

fn add(stage: &'static str, total: Decimal, value: Decimal) -> Result<Decimal, CartError> {
    total.checked_add(value).ok_or(CartError::Overflow { stage, value })
}

/// Sums what a selection of bookings currently costs the requester.
///
/// Live bookings (pending or accepted) count at their amount, cancelled ones
/// at the penalty they incurred, rejected ones not at all.
pub fn cart_total(bookings: &[Booking]) -> Result<CartSummary, CartError> {
    let mut subtotal = Decimal::ZERO;
    let mut penalty_total = Decimal::ZERO;
    let mut by_subject = BTreeMap::new();

    for booking in bookings {
        let charge = match booking.status() {
            BookingStatus::Pending | BookingStatus::Accepted => {
                subtotal = add("subtotal", subtotal, booking.amount())?;
                booking.amount()
            }
            BookingStatus::Cancelled => {
                let penalty = booking
                    .penalty()
                    .filter(|penalty| penalty.penalty_applied)
                    .map(|penalty| penalty.penalty_amount)
                    .unwrap_or(Decimal::ZERO);
                penalty_total = add("penalty total", penalty_total, penalty)?;
                penalty
            }
            BookingStatus::Rejected => Decimal::ZERO,
        };
        let subject_total = by_subject.entry(booking.subject_type()).or_insert(Decimal::ZERO);
        *subject_total = add("subject total", *subject_total, charge)?;
    }

    let total = add("total", subtotal, penalty_total)?;
    Ok(CartSummary {
        line_count: bookings.len(),
        subtotal,
        penalty_total,
        total,
        by_subject,
        trace: vec![
            CartTraceStep {
                stage: "subtotal".to_string(),
                detail: "sum(amount) over pending and accepted bookings".to_string(),
                amount: subtotal,
            },
            CartTraceStep {
                stage: "penalties".to_string(),
                detail: "sum(penalty_amount) over cancelled bookings".to_string(),
                amount: penalty_total,
            },
            CartTraceStep {
                stage: "total".to_string(),
                detail: "subtotal + penalties".to_string(),
                amount: total,
            },
        ],
    })
}
