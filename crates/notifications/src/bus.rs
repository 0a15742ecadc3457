//! Alert hand-off boundary (mechanics only).
//!
//! The scanner publishes [`AlertRequest`]s; whatever delivers notifications
//! subscribes. Delivery is best-effort fan-out: subscribers that went away are
//! dropped, and a failed publish is reported to the caller, which logs it and
//! keeps sweeping.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

use thiserror::Error;

use crate::alert::AlertRequest;

/// A subscription to published alerts.
///
/// Designed for single-threaded consumption; each subscription receives a copy
/// of every alert published after it was created.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Collect everything already queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlertBusError {
    #[error("alert bus lock poisoned")]
    Poisoned,

    #[error("alert rejected by dispatcher: {0}")]
    Rejected(String),
}

/// Publish/subscribe boundary between the alert scanner and notification delivery.
pub trait AlertBus: Send + Sync {
    fn publish(&self, alert: AlertRequest) -> Result<(), AlertBusError>;

    fn subscribe(&self) -> Subscription<AlertRequest>;
}

impl<B> AlertBus for Arc<B>
where
    B: AlertBus + ?Sized,
{
    fn publish(&self, alert: AlertRequest) -> Result<(), AlertBusError> {
        (**self).publish(alert)
    }

    fn subscribe(&self) -> Subscription<AlertRequest> {
        (**self).subscribe()
    }
}
