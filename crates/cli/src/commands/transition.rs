use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::json;
use uuid::Uuid;

use eventdesk_core::audit::{AuditContext, TracingAuditSink};
use eventdesk_core::config::{AppConfig, LoadOptions};
use eventdesk_core::errors::ApplicationError;
use eventdesk_core::lifecycle::{BookingAction, BookingLifecycle};
use eventdesk_core::wire;

use crate::commands::{parse_now, CommandResult};

#[derive(Debug, Clone)]
pub struct TransitionArgs {
    pub file: PathBuf,
    pub action: String,
    pub reason: Option<String>,
    pub now: Option<String>,
}

pub fn run(args: TransitionArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "transition",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let now = match parse_now(args.now.as_deref()) {
        Ok(now) => now,
        Err(message) => return CommandResult::failure("transition", "invalid_input", message, 6),
    };
    let action = match args.action.parse::<BookingAction>() {
        Ok(action) => action,
        Err(message) => return CommandResult::failure("transition", "invalid_input", message, 6),
    };
    let document = match read_document(&args.file) {
        Ok(document) => document,
        Err(error) => {
            return CommandResult::failure("transition", "invalid_input", format!("{error:#}"), 6);
        }
    };

    let correlation_id = format!("cli-{}", Uuid::new_v4().simple());
    let booking = match wire::parse_record(&document).and_then(|record| wire::ingest(record, now))
    {
        Ok(booking) => booking,
        Err(error) => {
            let interface = ApplicationError::from(error).into_interface(correlation_id);
            return CommandResult::interface_failure("transition", &interface, 7);
        }
    };

    let lifecycle = BookingLifecycle::new(config.penalties);
    let audit = AuditContext::new(Some(booking.id().clone()), correlation_id.clone(), "cli");
    match lifecycle.apply_with_audit(
        &booking,
        action,
        args.reason.as_deref(),
        now,
        &TracingAuditSink,
        &audit,
    ) {
        Ok(outcome) => CommandResult::success_with_data(
            "transition",
            format!("booking {} moved from {} to {}", booking.id(), outcome.from, outcome.to),
            json!({
                "from": outcome.from,
                "to": outcome.to,
                "action": action.as_str(),
                "booking": wire::to_record(&outcome.booking),
            }),
        ),
        Err(error) => {
            let interface = ApplicationError::from(error).into_interface(correlation_id);
            CommandResult::interface_failure("transition", &interface, 7)
        }
    }
}

fn read_document(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read booking document `{}`", path.display()))
}
