//! Command dispatch: bridges CLI args -> client calls -> output formatting.

pub mod config_cmd;
pub mod controller;
pub mod listen;
pub mod values;

use zwjs_api::{Client, Error as ApiError};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a server-bound command to the appropriate handler.
///
/// Connects first and waits for the server handshake, so handlers only
/// ever see a bootstrapped connection. The socket is closed afterwards
/// whatever the outcome.
pub async fn dispatch(cmd: Command, client: &Client, global: &GlobalOpts) -> Result<(), CliError> {
    open(client).await?;

    let result = match cmd {
        Command::Listen(args) => listen::handle(client, args, global).await,
        Command::Include(args) => controller::handle_include(client, args, global).await,
        Command::Exclude(args) => controller::handle_exclude(client, args, global).await,
        Command::SetValue(args) => values::handle_set_value(client, args, global),
        Command::Send(args) => values::handle_send(client, args, global),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    };

    client.close().await;
    result
}

async fn open(client: &Client) -> Result<(), CliError> {
    let url = client.config().url.to_string();
    client.connect().await.map_err(|e| match e {
        ApiError::WebSocketConnect(reason) => CliError::ConnectionFailed { url, reason },
        other => other.into(),
    })?;

    let version = client.wait_for_handshake().await?;
    tracing::info!(
        server_version = version.server_version.as_deref().unwrap_or("unknown"),
        driver_version = version.driver_version.as_deref().unwrap_or("unknown"),
        "connected"
    );
    Ok(())
}
