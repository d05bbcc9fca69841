//! Well-known controller commands on top of the request primitive.
//!
//! Inclusion/exclusion commands report plain booleans: `true` only when
//! the server executed the command AND the controller accepted it.
//! Transport problems are logged and surface as `false` as well; watch the
//! event stream to learn why an operation did not happen.

use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::client::Client;
use crate::codec::{self, ResultMessage};
use crate::error::Error;
use crate::registry::PendingRequest;

// ── Command names ────────────────────────────────────────────────────

pub const DISABLE_STATISTICS: &str = "driver.disable_statistics";
pub const START_LISTENING: &str = "start_listening";
pub const BEGIN_INCLUSION: &str = "controller.begin_inclusion";
pub const STOP_INCLUSION: &str = "controller.stop_inclusion";
pub const BEGIN_EXCLUSION: &str = "controller.begin_exclusion";
pub const STOP_EXCLUSION: &str = "controller.stop_exclusion";
pub const SET_VALUE: &str = "node.set_value";

/// Security strategy requested when inclusion starts.
const INCLUSION_STRATEGY: &str = "Security_S0";

/// Addresses one value on a node: command class plus property name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueId {
    pub command_class: u16,
    pub property: String,
}

impl Client {
    /// Register a waiter, encode, and queue one command frame.
    ///
    /// The returned handle resolves with the matching result. Dropping it
    /// abandons the request.
    pub fn send_request(
        &self,
        command: &str,
        options: Option<&Value>,
    ) -> Result<PendingRequest, Error> {
        let pending = self.registry().begin_request();
        let frame = codec::encode(command, pending.id(), options)?;
        self.send(frame)?;
        tracing::debug!(command, message_id = pending.id(), "command sent");
        Ok(pending)
    }

    /// Send a command and wait for its result, bounded by the configured
    /// request timeout.
    pub async fn send_sync(
        &self,
        command: &str,
        options: Option<Value>,
    ) -> Result<ResultMessage, Error> {
        let pending = self.send_request(command, options.as_ref())?;
        pending.wait(self.config().request_timeout).await
    }

    // ── Inclusion / exclusion ────────────────────────────────────────

    pub async fn start_inclusion(&self) -> bool {
        let options = json!({ "strategy": INCLUSION_STRATEGY });
        self.controller_command(BEGIN_INCLUSION, Some(options)).await
    }

    pub async fn stop_inclusion(&self) -> bool {
        self.controller_command(STOP_INCLUSION, None).await
    }

    pub async fn start_exclusion(&self) -> bool {
        self.controller_command(BEGIN_EXCLUSION, None).await
    }

    pub async fn stop_exclusion(&self) -> bool {
        self.controller_command(STOP_EXCLUSION, None).await
    }

    async fn controller_command(&self, command: &str, options: Option<Value>) -> bool {
        match self.send_sync(command, options).await {
            Ok(result) => {
                let accepted = result.command_succeeded();
                if !accepted {
                    tracing::info!(
                        command,
                        envelope_success = result.success,
                        error_code = result.error_code.as_deref().unwrap_or(""),
                        "controller command not accepted"
                    );
                }
                accepted
            }
            Err(e) => {
                tracing::warn!(command, error = %e, "controller command failed");
                false
            }
        }
    }

    // ── Values ───────────────────────────────────────────────────────

    /// Write a value on a node without waiting for the reply.
    ///
    /// Only queueing can fail (e.g. connection not open); the server's
    /// answer is not tracked.
    pub fn set_value(
        &self,
        node_id: u32,
        command_class: u16,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let value_id = ValueId {
            command_class,
            property: property.to_owned(),
        };

        let mut params = Map::new();
        params.insert("nodeId".into(), json!(node_id));
        params.insert("valueId".into(), serde_json::to_value(&value_id)?);
        params.insert("value".into(), value.into());

        let message_id = Uuid::new_v4().to_string();
        let frame = codec::encode_with_params(SET_VALUE, &message_id, &params)?;
        self.send(frame)?;
        tracing::debug!(node_id, command_class, property, "set_value sent");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::{ClientConfig, frame_text};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    fn config() -> ClientConfig {
        ClientConfig::from_address("localhost:3000").unwrap()
    }

    /// Answer the next outbound frame with the given envelope/nested flags.
    async fn reply_next(
        client: &Client,
        outbound: &mut mpsc::UnboundedReceiver<Message>,
        envelope: bool,
        nested: Option<bool>,
    ) -> Value {
        let frame: Value = serde_json::from_str(&frame_text(outbound.recv().await.unwrap())).unwrap();
        let mut reply = json!({
            "type": "result",
            "success": envelope,
            "messageId": frame["messageId"],
        });
        if let Some(nested) = nested {
            reply["result"] = json!({ "success": nested });
        }
        client.on_frame(&reply.to_string());
        frame
    }

    #[tokio::test]
    async fn start_inclusion_succeeds_on_both_flags() {
        let (client, mut outbound) = Client::attached(config());

        let task = tokio::spawn({
            let client = client.clone();
            async move { client.start_inclusion().await }
        });
        let frame = reply_next(&client, &mut outbound, true, Some(true)).await;

        assert!(task.await.unwrap());
        assert_eq!(frame["command"], "controller.begin_inclusion");
        assert_eq!(frame["options"], json!({ "strategy": "Security_S0" }));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn start_inclusion_fails_when_either_flag_is_false() {
        for (envelope, nested) in [(false, Some(true)), (true, Some(false)), (true, None)] {
            let (client, mut outbound) = Client::attached(config());
            let task = tokio::spawn({
                let client = client.clone();
                async move { client.start_inclusion().await }
            });
            reply_next(&client, &mut outbound, envelope, nested).await;
            assert!(
                !task.await.unwrap(),
                "envelope={envelope} nested={nested:?} should fail"
            );
        }
    }

    #[tokio::test]
    async fn stop_and_exclusion_commands_have_no_options() {
        let (client, mut outbound) = Client::attached(config());

        for expected in [STOP_INCLUSION, BEGIN_EXCLUSION, STOP_EXCLUSION] {
            let task = tokio::spawn({
                let client = client.clone();
                async move {
                    match expected {
                        STOP_INCLUSION => client.stop_inclusion().await,
                        BEGIN_EXCLUSION => client.start_exclusion().await,
                        _ => client.stop_exclusion().await,
                    }
                }
            });
            let frame = reply_next(&client, &mut outbound, true, Some(true)).await;
            assert!(task.await.unwrap());
            assert_eq!(frame["command"], expected);
            assert!(frame.get("options").is_none());
        }
    }

    #[tokio::test]
    async fn command_on_closed_connection_is_false() {
        let client = Client::new(config());
        assert!(!client.start_exclusion().await);
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_command_times_out() {
        let cfg = config().with_request_timeout(Some(Duration::from_secs(2)));
        let (client, _outbound) = Client::attached(cfg);

        let err = client
            .send_sync(STOP_EXCLUSION, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 2000 }));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn set_value_sends_one_frame_without_waiting() {
        let (client, mut outbound) = Client::attached(config());

        client.set_value(5, 0x20, "targetValue", 99).unwrap();

        let frame: Value = serde_json::from_str(&frame_text(outbound.try_recv().unwrap())).unwrap();
        assert!(outbound.try_recv().is_err());
        assert_eq!(frame["command"], "node.set_value");
        assert_eq!(frame["nodeId"], 5);
        assert_eq!(
            frame["valueId"],
            json!({ "commandClass": 32, "property": "targetValue" })
        );
        assert_eq!(frame["value"], 99);
        assert!(frame["messageId"].is_string());
        assert_eq!(client.pending_requests(), 0);
    }

    #[test]
    fn set_value_outside_open_fails() {
        let client = Client::new(config());
        assert!(matches!(
            client.set_value(5, 0x25, "targetValue", true),
            Err(Error::NotConnected { .. })
        ));
    }
}
