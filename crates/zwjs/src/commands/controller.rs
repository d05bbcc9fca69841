//! Inclusion and exclusion command handlers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use zwjs_api::{Client, EventListener, EventMessage};

use crate::cli::{ExcludeArgs, ExcludeCommand, GlobalOpts, IncludeArgs, IncludeCommand};
use crate::error::CliError;
use crate::output;

const CONTROLLER: &str = "controller";
const EXCLUSION_STOPPED: &str = "exclusion stopped";
const NODE_REMOVED: &str = "node removed";

// ── Inclusion ────────────────────────────────────────────────────────

pub async fn handle_include(
    client: &Client,
    args: IncludeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (label, ok) = match args.command {
        IncludeCommand::Start => ("include start", client.start_inclusion().await),
        IncludeCommand::Stop => ("include stop", client.stop_inclusion().await),
    };
    report(label, ok, global)
}

// ── Exclusion ────────────────────────────────────────────────────────

/// Outcome of `exclude start --wait`.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionReport {
    /// The controller left exclusion mode on its own, i.e. a device left.
    pub excluded: bool,
    /// Node IDs announced through `node removed` events, when the server sent them.
    pub node_ids: Vec<u64>,
}

pub async fn handle_exclude(
    client: &Client,
    args: ExcludeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ExcludeCommand::Stop => report("exclude stop", client.stop_exclusion().await, global),
        ExcludeCommand::Start {
            wait: false,
            ..
        } => report("exclude start", client.start_exclusion().await, global),
        ExcludeCommand::Start {
            wait: true,
            wait_timeout,
        } => {
            let report = exclude_and_wait(client, Duration::from_secs(wait_timeout)).await?;
            let rendered = output::render_single(global.format(), &report, |r| {
                if r.excluded {
                    "excluded".to_string()
                } else {
                    "nothing excluded".to_string()
                }
            })?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }
    }
}

/// Start exclusion and wait for the controller to leave exclusion mode.
///
/// The controller stops exclusion by itself once a device has been removed.
/// If the wait runs out we stop it ourselves, and the resulting
/// `exclusion stopped` event does not count as an exclusion.
async fn exclude_and_wait(client: &Client, limit: Duration) -> Result<ExclusionReport, CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: Arc<dyn EventListener> = Arc::new(move |event: &EventMessage| {
        if event.source == CONTROLLER {
            let _ = tx.send(event.clone());
        }
    });
    client.add_event_listener(Arc::clone(&listener));

    let result = async {
        if !client.start_exclusion().await {
            return Err(CliError::Rejected {
                command: "exclude start".into(),
            });
        }
        tracing::info!(timeout_secs = limit.as_secs(), "exclusion running, waiting for a device");

        let mut report = ExclusionReport::default();
        let waited = tokio::time::timeout(limit, async {
            while let Some(event) = rx.recv().await {
                if event.event == NODE_REMOVED {
                    report.node_ids.extend(removed_node_id(&event));
                } else if event.event == EXCLUSION_STOPPED {
                    return true;
                }
            }
            false
        })
        .await;

        match waited {
            Ok(stopped) => report.excluded = stopped,
            Err(_) => {
                tracing::info!("no device excluded in time, stopping exclusion");
                client.stop_exclusion().await;
            }
        }
        Ok(report)
    }
    .await;

    client.remove_event_listener(&listener);
    result
}

/// `node removed` carries either a top-level `nodeId` or a `node` object.
fn removed_node_id(event: &EventMessage) -> Option<u64> {
    event
        .get("nodeId")
        .or_else(|| event.get("node").and_then(|node| node.get("nodeId")))
        .and_then(Value::as_u64)
}

fn report(label: &str, ok: bool, global: &GlobalOpts) -> Result<(), CliError> {
    if !ok {
        return Err(CliError::Rejected {
            command: label.into(),
        });
    }
    let color = output::should_color(global.color);
    output::print_output(&output::render_outcome(label, ok, color), global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> EventMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn removed_node_id_from_either_shape() {
        let flat = event(json!({ "source": "controller", "event": "node removed", "nodeId": 7 }));
        let nested = event(json!({
            "source": "controller",
            "event": "node removed",
            "node": { "nodeId": 9, "status": 0 }
        }));
        let bare = event(json!({ "source": "controller", "event": "node removed" }));

        assert_eq!(removed_node_id(&flat), Some(7));
        assert_eq!(removed_node_id(&nested), Some(9));
        assert_eq!(removed_node_id(&bare), None);
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = ExclusionReport {
            excluded: true,
            node_ids: vec![4],
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({ "excluded": true, "nodeIds": [4] })
        );
    }
}
