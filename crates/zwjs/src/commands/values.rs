//! Value writes and raw frame pass-through.

use serde_json::{Value, json};

use zwjs_api::Client;

use crate::cli::{GlobalOpts, SendArgs, SetValueArgs};
use crate::error::CliError;
use crate::output;

/// Frames queued before `close` are written ahead of the close frame, so
/// nothing needs to wait here.
pub fn handle_set_value(
    client: &Client,
    args: SetValueArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let value = parse_value(&args.value);
    client.set_value(args.node, args.command_class, &args.property, value.clone())?;

    let sent = json!({
        "nodeId": args.node,
        "commandClass": args.command_class,
        "property": args.property,
        "value": value,
    });
    let rendered = output::render_single(global.format(), &sent, |_| "sent".to_string())?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

pub fn handle_send(client: &Client, args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let frame: Value = serde_json::from_str(&args.frame)?;
    let Some(command) = frame.get("command").and_then(Value::as_str) else {
        return Err(CliError::Validation {
            field: "frame".into(),
            reason: "expected a JSON object with a string \"command\"".into(),
        });
    };
    tracing::debug!(command, "sending raw frame");
    client.send(frame.to_string())?;

    output::print_output(&format!("{command}: sent"), global.quiet);
    Ok(())
}

/// Interpret `raw` as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_as_json_first() {
        assert_eq!(parse_value("99"), json!(99));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value(r#""on""#), json!("on"));
        assert_eq!(parse_value(r#"{"r":255}"#), json!({ "r": 255 }));
        assert_eq!(parse_value("on"), json!("on"));
    }
}
