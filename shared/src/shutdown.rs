//! Cooperative shutdown for the background loops.

use log::{debug, error};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner side of the shutdown signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Loop side of the shutdown signal. Cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered or the owner is dropped.
    pub async fn triggered(&mut self) {
        // An error means the sender is gone, which also ends the loop.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Join handle of a named background loop.
#[derive(Debug)]
pub struct LoopHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl LoopHandle {
    pub fn spawn<F>(name: &'static str, task: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!("Starting {} loop", name);
        Self {
            name,
            handle: tokio::spawn(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the loop to return.
    pub async fn join(self) {
        match self.handle.await {
            Ok(()) => debug!("{} loop stopped", self.name),
            Err(e) if e.is_cancelled() => debug!("{} loop cancelled", self.name),
            Err(e) => error!("{} loop panicked: {}", self.name, e),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Awaits every handle in order.
pub async fn join_all(handles: Vec<LoopHandle>) {
    for handle in handles {
        handle.join().await;
    }
}
