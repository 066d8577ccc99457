//! Background task applying invalidation events to a dispatcher.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::cache::InvalidationEvent;
use crate::dispatch::Dispatcher;

/// Drain `events` into the dispatcher until shutdown or until every sender is gone.
pub fn spawn_invalidation_task(
    dispatcher: Arc<Dispatcher>,
    mut events: mpsc::UnboundedReceiver<InvalidationEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => dispatcher.apply_invalidation(&event),
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::debug!("Invalidation task stopping");
                    break;
                }
            }
        }
    })
}
