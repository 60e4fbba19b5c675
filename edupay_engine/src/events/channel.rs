//! Stateless pub-sub plumbing for wallet events.
//!
//! Components register async hooks against events they care about (a payment landing, a deposit
//! closing) and react to them as they arrive. Handlers only ever see the event payload itself;
//! they get no access to the rest of the system's state.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    inbox: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, inbox) = mpsc::channel(buffer_size);
        Self { inbox, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Consumes the handler and pumps events until every producer has been dropped, then waits
    /// for the hook invocations still in flight to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Drop our own sender clone, otherwise the loop below would never see the channel close
        // after the last external producer goes away.
        drop(self.sender);
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                maybe_event = self.inbox.recv() => match maybe_event {
                    Some(event) => {
                        trace!("📬️ Dispatching event");
                        let hook = Arc::clone(&self.handler);
                        in_flight.spawn(async move { (hook)(event).await });
                    },
                    None => break,
                },
                Some(finished) = in_flight.join_next() => log_hook_exit(finished),
            }
        }
        debug!("📬️ All producers are gone. Draining in-flight event hooks.");
        while let Some(finished) = in_flight.join_next().await {
            log_hook_exit(finished);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_hook_exit(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => warn!("📬️ An event hook panicked: {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish event: {e}");
        }
    }
}
