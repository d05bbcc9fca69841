//! Output formatting: JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Structured formats use
//! serde, plain emits one line per item.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use serde::Serialize;

use zwjs_api::EventMessage;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// `plain_fn` produces the plain-text form, since free-form data has no
/// obvious single-line representation.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize + ?Sized,
{
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Plain => plain_fn(data),
    })
}

/// One line per event for `listen`, stamped with the local receive time.
pub fn render_event(
    format: OutputFormat,
    event: &EventMessage,
    received_at: DateTime<Local>,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Plain => {
            let stamp = received_at.format("%H:%M:%S%.3f").to_string();
            let payload = serde_json::to_string(&event.payload)?;
            Ok(if color {
                format!(
                    "{} {} {} {}",
                    stamp.dimmed(),
                    event.source.cyan(),
                    event.event.bold(),
                    payload
                )
            } else {
                format!("{stamp} {} {} {payload}", event.source, event.event)
            })
        }
        OutputFormat::Yaml => {
            // Document separator keeps a stream of events parseable.
            let body = serde_yaml::to_string(event)?;
            Ok(format!("---\n{}", body.trim_end()))
        }
        other => render_single(other, event, |_| String::new()),
    }
}

/// Status line for commands that only succeed or fail.
pub fn render_outcome(command: &str, ok: bool, color: bool) -> String {
    let status = if ok { "ok" } else { "failed" };
    match (color, ok) {
        (true, true) => format!("{command}: {}", status.green()),
        (true, false) => format!("{command}: {}", status.red()),
        (false, _) => format!("{command}: {status}"),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event() -> EventMessage {
        serde_json::from_value(json!({
            "source": "node",
            "event": "value updated",
            "nodeId": 5
        }))
        .unwrap()
    }

    #[test]
    fn plain_event_is_one_line() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let line = render_event(OutputFormat::Plain, &event(), at, false).unwrap();
        assert_eq!(line, r#"12:30:05.000 node value updated {"nodeId":5}"#);
    }

    #[test]
    fn compact_json_event_keeps_payload_flat() {
        let line = render_event(OutputFormat::JsonCompact, &event(), Local::now(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({ "source": "node", "event": "value updated", "nodeId": 5 })
        );
    }

    #[test]
    fn yaml_events_are_separate_documents() {
        let doc = render_event(OutputFormat::Yaml, &event(), Local::now(), false).unwrap();
        assert!(doc.starts_with("---\n"));
        assert!(doc.contains("source: node"));
    }

    #[test]
    fn outcome_without_color() {
        assert_eq!(render_outcome("include start", true, false), "include start: ok");
        assert_eq!(render_outcome("exclude stop", false, false), "exclude stop: failed");
    }
}
