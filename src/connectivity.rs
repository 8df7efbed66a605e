//! Network reachability notifications.
//!
//! The host platform reports transitions through [`ConnectivityMonitor::notify`];
//! listeners hold a [`ConnectivitySubscription`] and are unregistered when it
//! is dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityEvent {
    pub is_connected: bool,
}

struct MonitorState {
    connected: bool,
    subscribers: Vec<mpsc::UnboundedSender<ConnectivityEvent>>,
}

#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl ConnectivityMonitor {
    pub fn new(connected: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                connected,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Record a network state change and deliver it to every live subscriber.
    pub fn notify(&self, event: ConnectivityEvent) {
        let mut state = self.state.lock();
        state.connected = event.is_connected;
        state.subscribers.retain(|tx| tx.send(event).is_ok());
        debug!(
            "Connectivity changed (connected: {}), {} subscribers notified",
            event.is_connected,
            state.subscribers.len()
        );
    }

    pub fn subscribe(&self) -> ConnectivitySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.subscribers.push(tx);
        ConnectivitySubscription {
            rx,
            initially_connected: state.connected,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Receiving end of a monitor subscription. Dropping it unsubscribes.
pub struct ConnectivitySubscription {
    rx: mpsc::UnboundedReceiver<ConnectivityEvent>,
    initially_connected: bool,
}

impl ConnectivitySubscription {
    /// Monitor state when the subscription was taken. Events delivered
    /// afterwards are all later than this.
    pub fn initially_connected(&self) -> bool {
        self.initially_connected
    }

    /// Next event, or `None` once the monitor is gone.
    pub async fn recv(&mut self) -> Option<ConnectivityEvent> {
        self.rx.recv().await
    }
}
