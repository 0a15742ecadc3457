//! Alert requests and the hand-off to notification delivery.

pub mod alert;
pub mod bus;
pub mod in_memory_bus;

pub use alert::{AlertKind, AlertRequest};
pub use bus::{AlertBus, AlertBusError, Subscription};
pub use in_memory_bus::InMemoryAlertBus;
