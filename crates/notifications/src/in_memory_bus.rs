//! In-memory alert bus for tests/dev and the worker's stdout hand-off.

use std::sync::{Mutex, mpsc};

use tracing::debug;

use crate::alert::AlertRequest;
use crate::bus::{AlertBus, AlertBusError, Subscription};

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Best-effort fan-out to every live subscriber
#[derive(Debug, Default)]
pub struct InMemoryAlertBus {
    subscribers: Mutex<Vec<mpsc::Sender<AlertRequest>>>,
}

impl InMemoryAlertBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertBus for InMemoryAlertBus {
    fn publish(&self, alert: AlertRequest) -> Result<(), AlertBusError> {
        let mut subs = self.subscribers.lock().map_err(|_| AlertBusError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(alert.clone()).is_ok());
        debug!(kind = %alert.kind, subject_id = %alert.subject_id, subscribers = subs.len(), "alert published");

        Ok(())
    }

    fn subscribe(&self) -> Subscription<AlertRequest> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}
