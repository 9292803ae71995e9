//! Cooperative shutdown coordinator
//!
//! Workers hold a [`ShutdownListener`] and check it between poll
//! iterations. The signal is sticky: a listener created after shutdown was
//! requested observes it immediately, and requesting shutdown never waits
//! for the workers to finish.

use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Graceful,
    Immediate,
}

/// Shutdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// Broadcasts a single shutdown request to every listener
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: Mutex<ShutdownState>,
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (signal_tx, _) = watch::channel(None);
        Self {
            state: Mutex::new(ShutdownState::Running),
            signal_tx,
        }
    }

    /// Create a listener for the shutdown signal
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.signal_tx.subscribe(),
        }
    }

    /// Request shutdown; returns without waiting for listeners
    ///
    /// Returns false if shutdown had already been requested.
    pub fn shutdown(&self, signal: ShutdownSignal) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != ShutdownState::Running {
            warn!("Shutdown already in progress");
            return false;
        }
        *state = ShutdownState::ShuttingDown;
        drop(state);

        match signal {
            ShutdownSignal::Graceful => info!("Initiating graceful shutdown"),
            ShutdownSignal::Immediate => warn!("Initiating immediate shutdown"),
        }
        self.signal_tx.send_replace(Some(signal));
        true
    }

    /// Record that every component has been released
    pub fn mark_complete(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = ShutdownState::Shutdown;
        info!("Shutdown complete");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side held by each worker
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the shutdown signal
    ///
    /// A dropped coordinator counts as an immediate shutdown.
    pub async fn recv(&mut self) -> ShutdownSignal {
        match self.rx.wait_for(Option::is_some).await {
            Ok(signal) => signal.unwrap_or(ShutdownSignal::Immediate),
            Err(_) => ShutdownSignal::Immediate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.state(), ShutdownState::Running);

        assert!(coordinator.shutdown(ShutdownSignal::Graceful));
        assert_eq!(coordinator.state(), ShutdownState::ShuttingDown);
        assert!(!coordinator.shutdown(ShutdownSignal::Immediate));

        coordinator.mark_complete();
        assert_eq!(coordinator.state(), ShutdownState::Shutdown);
    }

    #[tokio::test]
    async fn test_listener_wakes_running_task() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let mut listener = coordinator.subscribe();

        let task = tokio::spawn(async move {
            tokio::select! {
                signal = listener.recv() => Some(signal),
                _ = tokio::time::sleep(Duration::from_secs(10)) => None,
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.shutdown(ShutdownSignal::Graceful);

        assert_eq!(task.await.unwrap(), Some(ShutdownSignal::Graceful));
    }

    #[tokio::test]
    async fn test_late_listener_sees_signal() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown(ShutdownSignal::Immediate);

        let mut listener = coordinator.subscribe();
        assert!(listener.is_triggered());
        assert_eq!(listener.recv().await, ShutdownSignal::Immediate);
    }

    #[tokio::test]
    async fn test_dropped_coordinator_counts_as_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let mut listener = coordinator.subscribe();
        drop(coordinator);
        assert_eq!(listener.recv().await, ShutdownSignal::Immediate);
    }
}
