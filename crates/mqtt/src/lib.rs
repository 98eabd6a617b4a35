//! MQTT transport and topic registry for the bridge.

pub mod config;
pub mod connection;
pub mod events;
pub mod subscriptions;
pub mod topics;

pub use config::*;
pub use connection::*;
pub use events::*;
pub use subscriptions::SubscriptionTracker;
pub use topics::*;
