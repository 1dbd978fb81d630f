pub mod audit;
pub mod availability;
pub mod cart;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod wire;

pub use availability::{conflicts, is_available};
pub use cart::{cart_total, CartError, CartSummary};
pub use domain::booking::{
    Booking, BookingId, BookingRequest, BookingState, BookingStatus, BookingValidationError,
    BookingWindow, EventId, SubjectId, SubjectType,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    compute_cancellation_penalty, transition, BookingAction, BookingLifecycle, LifecycleError,
    PenaltyDecision, PenaltyPolicy, PenaltySchedule, TransitionOutcome,
};
pub use wire::{BookingRecord, WireError};
