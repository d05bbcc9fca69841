//! `listen`: stream server events to stdout.

use std::sync::Arc;

use tokio::sync::mpsc;

use zwjs_api::{Client, ConnectionState, EventListener, EventMessage};

use crate::cli::{GlobalOpts, ListenArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &Client, args: ListenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.count == Some(0) {
        return Ok(());
    }

    // The dispatcher runs on the reader task; hand events over to this one.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let source = args.source.clone();
    let listener: Arc<dyn EventListener> = Arc::new(move |event: &EventMessage| {
        if source.as_deref().is_none_or(|s| s == event.source) {
            let _ = tx.send((chrono::Local::now(), event.clone()));
        }
    });
    client.add_event_listener(Arc::clone(&listener));

    let color = output::should_color(global.color);
    let mut state = client.watch_state();
    let mut seen = 0usize;

    let result = loop {
        tokio::select! {
            Some((received_at, event)) = rx.recv() => {
                let rendered = output::render_event(global.format(), &event, received_at, color)?;
                output::print_output(&rendered, global.quiet);
                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!(events = seen, "interrupted");
                break Ok(());
            }
            _ = state.wait_for(|s| *s == ConnectionState::Closed) => {
                break Err(CliError::Disconnected);
            }
        }
    };

    client.remove_event_listener(&listener);
    result
}
