//! Events fired when money moves, and the plumbing to subscribe async hooks to them.

mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{DepositClosedEvent, PaymentConfirmedEvent};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
