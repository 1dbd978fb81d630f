pub mod engine;
pub mod penalty;
pub mod states;

pub use engine::{transition, BookingLifecycle, LifecycleError};
pub use penalty::{compute_cancellation_penalty, PenaltyDecision, PenaltyPolicy, PenaltySchedule};
pub use states::{BookingAction, TransitionOutcome};
