use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::booking::{Booking, BookingStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingAction {
    Accept,
    Reject,
    Cancel,
}

impl BookingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }

    /// Status a booking lands in when this action succeeds.
    pub fn target(&self) -> BookingStatus {
        match self {
            Self::Accept => BookingStatus::Accepted,
            Self::Reject => BookingStatus::Rejected,
            Self::Cancel => BookingStatus::Cancelled,
        }
    }

    pub fn requires_reason(&self) -> bool {
        matches!(self, Self::Reject | Self::Cancel)
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            "cancel" => Ok(Self::Cancel),
            other => {
                Err(format!("unsupported booking action `{other}` (expected accept|reject|cancel)"))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub action: BookingAction,
    pub booking: Booking,
}
