//! Human-readable error descriptions and structured JSON error formatting.

use feed_core::error::{BuildError, FeedError};
use serde_json::json;

fn find_feed_error(err: &eyre::Report) -> Option<&FeedError> {
    err.downcast_ref::<FeedError>()
        .or_else(|| err.chain().find_map(|e| e.downcast_ref::<FeedError>()))
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingStepper => {
                "What happened: No stepper controller was provided to the feed.\nLikely causes: The driver failed to initialize or was not wired into the builder.\nHow to fix: Pass the stepper via with_stepper(...).".to_string()
            }
            BuildError::MissingSpeedInput => {
                "What happened: No speed potentiometer input was provided.\nLikely causes: The ADC failed to initialize or was not wired into the builder.\nHow to fix: Pass the analog input via with_speed_input(...).".to_string()
            }
            BuildError::MissingDisplay => {
                "What happened: No display handler was provided.\nLikely causes: The builder was assembled without a UI consumer.\nHow to fix: Pass the display via with_display(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/powerfeed.toml for a sample."
            ),
        };
    }

    if let Some(fe) = find_feed_error(err) {
        return match fe {
            FeedError::StopNotConfirmed { waited_ms } => format!(
                "What happened: The axis did not report rest within {waited_ms} ms of a stop.\nLikely causes: Driver fault, lost step signal, or deceleration set too low.\nHow to fix: Check the driver and wiring; raise stepper.deceleration or stop_detector.stop_timeout_ms."
            ),
            FeedError::StopPostFailed { attempts } => format!(
                "What happened: Stop confirmation could not be queued after {attempts} attempts.\nLikely causes: The command bus is saturated or its consumer stalled.\nHow to fix: Raise bus.command_capacity or stop_detector.post_timeout_ms; re-run with --log-level=debug."
            ),
            FeedError::Backpressure { bus, capacity } => format!(
                "What happened: The {bus} bus stayed full (capacity {capacity}).\nLikely causes: Its consumer is blocked or events arrive faster than they drain.\nHow to fix: Raise bus.{bus}_capacity or lower bus.{bus}_idle_ms."
            ),
            FeedError::Disconnected { bus } => format!(
                "What happened: The {bus} bus consumer is gone.\nLikely causes: The feed was shut down while events were still being posted.\nHow to fix: Re-run with --log-level=debug and check for an earlier error."
            ),
            FeedError::Timeout => {
                "What happened: A stepper command timed out.\nLikely causes: Driver not powered or not responding.\nHow to fix: Check driver power and the step/dir/enable pins.".to_string()
            }
            FeedError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            FeedError::Hardware(_) | FeedError::HardwareFault(_) => format!(
                "What happened: {fe}.\nLikely causes: Wiring, power, or GPIO permissions.\nHow to fix: Check the [pins] section and that the process may access GPIO."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("script line") {
        let detail = err
            .chain()
            .skip(1)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ");
        return format!(
            "What happened: Could not parse the key script ({msg}: {detail}).\nHow to fix: Use one of left, left-up, right, right-up, rapid, rapid-up, pot <raw>, wait <ms>, settle, units."
        );
    }

    if lower.contains("read config") || lower.contains("parse config") {
        let cause = err.root_cause();
        return format!(
            "What happened: Could not load the configuration ({msg}).\nCause: {cause}\nHow to fix: Pass --config with a readable TOML file; see etc/powerfeed.toml."
        );
    }

    if lower.contains("invalid configuration") {
        let cause = err.root_cause();
        return format!(
            "What happened: Configuration is invalid: {cause}.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration, 3 and up for axis faults, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if let Some(fe) = find_feed_error(err) {
        return match fe {
            FeedError::Config(_) => 2,
            FeedError::StopNotConfirmed { .. } => 3,
            FeedError::StopPostFailed { .. } => 4,
            FeedError::Timeout | FeedError::Hardware(_) | FeedError::HardwareFault(_) => 5,
            FeedError::Backpressure { .. } | FeedError::Disconnected { .. } => 6,
        };
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("config") {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    match find_feed_error(err) {
        Some(FeedError::Config(_)) => "InvalidConfig",
        Some(FeedError::StopNotConfirmed { .. }) => "StopNotConfirmed",
        Some(FeedError::StopPostFailed { .. }) => "StopPostFailed",
        Some(FeedError::Backpressure { .. }) => "Backpressure",
        Some(FeedError::Disconnected { .. }) => "Disconnected",
        Some(FeedError::Timeout) => "Timeout",
        Some(FeedError::Hardware(_) | FeedError::HardwareFault(_)) => "Hardware",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let details = match find_feed_error(err) {
        Some(FeedError::StopNotConfirmed { waited_ms }) => Some(json!({ "waited_ms": waited_ms })),
        Some(FeedError::StopPostFailed { attempts }) => Some(json!({ "attempts": attempts })),
        Some(FeedError::Backpressure { bus, capacity }) => {
            Some(json!({ "bus": bus, "capacity": capacity }))
        }
        _ => None,
    };
    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(d) = details {
        obj["details"] = d;
    }
    obj.to_string()
}
