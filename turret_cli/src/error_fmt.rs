//! Human-readable error descriptions and structured JSON error formatting.

use turret_bridge::BridgeError;
use turret_core::error::{BuildError, CommandFault, TurretError};

fn fault_hint(fault: &CommandFault) -> &'static str {
    match fault {
        CommandFault::WrongLength(_) => "Send exactly three characters, e.g. U05 or F00.",
        CommandFault::UnknownSelector(_) => "Use one of U, D, L, R, P, F as the first character.",
        CommandFault::BadMagnitude => "Follow the selector with two decimal digits (00-99).",
        CommandFault::Overflow => "Use a smaller magnitude.",
    }
}

/// Map an eyre::Report to a human-readable explanation with a fix hint.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(te) = err.downcast_ref::<TurretError>() {
        return match te {
            TurretError::InvalidCommand(fault) => format!(
                "What happened: Command rejected ({fault}).\nHow to fix: {}",
                fault_hint(fault)
            ),
            TurretError::GuardViolation { action, state } => format!(
                "What happened: {action} is not allowed while the turret is {state}.\nLikely causes: Fire before priming completed, or a second command while busy.\nHow to fix: Send P00, wait for the primed feedback (or the prime timeout), then F00."
            ),
            TurretError::ResourceUnavailable(msg) => format!(
                "What happened: A line or timer could not be acquired ({msg}).\nLikely causes: Another process holds the GPIO pin, or the pin number is wrong.\nHow to fix: Check [pins] in the config and stop other users of the pins."
            ),
            TurretError::Hardware(msg) => format!(
                "What happened: Hardware write failed ({msg}).\nLikely causes: Wiring, power, or GPIO permissions.\nHow to fix: Re-run with --log-level=debug and check the affected line."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: The rig could not be assembled ({be}).\nHow to fix: Edit the config file, then rerun."
        );
    }

    if let Some(be) = err.downcast_ref::<BridgeError>() {
        return match be {
            BridgeError::Device(msg) => format!(
                "What happened: The device refused the command ({msg}).\nHow to fix: Check the device path and that the controller is running."
            ),
            other => format!(
                "What happened: Remote message rejected ({other}).\nHow to fix: Send two bytes: an index 0-5 and a distance 0-99."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("config") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nHow to fix: Edit the TOML config and try again."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable name of the error kind, used by `--json`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(te) = err.downcast_ref::<TurretError>() {
        return match te {
            TurretError::InvalidCommand(_) => "InvalidCommand",
            TurretError::GuardViolation { .. } => "GuardViolation",
            TurretError::ResourceUnavailable(_) => "ResourceUnavailable",
            TurretError::Hardware(_) => "Hardware",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    if let Some(be) = err.downcast_ref::<BridgeError>() {
        return match be {
            BridgeError::Device(_) => "DeviceRejected",
            _ => "MalformedMessage",
        };
    }
    "Error"
}

/// Typed errors map to stable exit codes; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> u8 {
    if let Some(te) = err.downcast_ref::<TurretError>() {
        return match te {
            TurretError::InvalidCommand(_) => 3,
            TurretError::GuardViolation { .. } => 4,
            TurretError::ResourceUnavailable(_) => 5,
            TurretError::Hardware(_) => 6,
        };
    }
    if let Some(be) = err.downcast_ref::<BridgeError>() {
        return match be {
            BridgeError::Device(_) => 6,
            _ => 3,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
