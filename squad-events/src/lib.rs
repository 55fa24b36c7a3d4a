//! Squad Events - Push Notifications
//!
//! Every completed core operation publishes a typed `SquadEvent` on an
//! `EventBus`. The transport layer subscribes and forwards them to clients.

mod bus;
mod events;

pub use bus::EventBus;
pub use events::{SandboxEventKind, SquadEvent};
