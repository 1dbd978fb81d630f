use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::json;

use eventdesk_core::config::{AppConfig, LoadOptions};
use eventdesk_core::domain::booking::SubjectType;
use eventdesk_core::errors::{ApplicationError, DomainError};

use crate::commands::{parse_instant, parse_now, CommandResult};

#[derive(Debug, Clone)]
pub struct PenaltyArgs {
    pub amount: String,
    pub start: String,
    pub category: String,
    pub now: Option<String>,
}

pub fn run(args: PenaltyArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "penalty",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let amount = match Decimal::from_str(args.amount.trim()) {
        Ok(amount) => amount,
        Err(error) => {
            return CommandResult::failure(
                "penalty",
                "invalid_input",
                format!("amount `{}` is not a decimal number: {error}", args.amount),
                6,
            );
        }
    };
    let (start, now) = match (parse_instant("start", &args.start), parse_now(args.now.as_deref()))
    {
        (Ok(start), Ok(now)) => (start, now),
        (Err(message), _) | (_, Err(message)) => {
            return CommandResult::failure("penalty", "invalid_input", message, 6);
        }
    };

    let correlation_id = format!("cli-{}", uuid::Uuid::new_v4().simple());
    let subject_type = match args.category.parse::<SubjectType>() {
        Ok(subject_type) => subject_type,
        Err(error) => {
            let interface = ApplicationError::from(DomainError::from(error))
                .into_interface(correlation_id);
            return CommandResult::interface_failure("penalty", &interface, 7);
        }
    };

    let policy = config.penalties.for_subject(subject_type);
    match policy.evaluate(amount, start, now) {
        Ok(decision) => CommandResult::success_with_data(
            "penalty",
            if decision.penalty_applied {
                "cancellation is past the free window"
            } else {
                "cancellation is free"
            },
            json!({
                "category": subject_type.as_str(),
                "amount": amount,
                "start": start.to_rfc3339(),
                "now": now.to_rfc3339(),
                "free_window_days": policy.free_window_days,
                "penalty_rate": policy.penalty_rate,
                "free_cancellation_deadline": policy.free_cancellation_deadline(start).to_rfc3339(),
                "penalty_applied": decision.penalty_applied,
                "penalty_amount": decision.penalty_amount,
            }),
        ),
        Err(error) => {
            let interface = ApplicationError::from(error).into_interface(correlation_id);
            CommandResult::interface_failure("penalty", &interface, 7)
        }
    }
}
