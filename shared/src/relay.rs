//! Relay mode: state and input tunnelled through the registry's relay
//! endpoints by fixed-rate polling loops.
//!
//! Every call is bounded by the relay timeout and dropped when it expires;
//! the next tick carries fresher data, so nothing is retried.

use crate::config::NetplayConfig;
use crate::protocol::RemoteInput;
use crate::registry::{Registry, RegistryError};
use crate::shutdown::{LoopHandle, ShutdownSignal};
use crate::snapshot::StateSnapshot;
use log::{debug, trace, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Latest published snapshot, `None` before the first tick.
pub type SnapshotFeed = watch::Receiver<Option<Arc<StateSnapshot>>>;

/// Failures in a row before the next warning is logged.
const WARN_EVERY: u32 = 30;

/// One room's relay endpoints plus the rates to drive them at.
pub struct RelayLink<R> {
    registry: Arc<R>,
    room_code: String,
    poll_interval: Duration,
    push_interval: Duration,
    drain_interval: Duration,
    timeout: Duration,
}

impl<R> Clone for RelayLink<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            room_code: self.room_code.clone(),
            poll_interval: self.poll_interval,
            push_interval: self.push_interval,
            drain_interval: self.drain_interval,
            timeout: self.timeout,
        }
    }
}

/// Counts consecutive failures so a dead relay does not flood the log.
#[derive(Debug, Default)]
struct FailureLog {
    consecutive: u32,
}

impl FailureLog {
    fn failed(&mut self, what: &str, err: &RegistryError) {
        self.consecutive += 1;
        if *err == RegistryError::Timeout {
            trace!("Relay {} timed out, dropped", what);
        } else if self.consecutive == 1 || self.consecutive % WARN_EVERY == 0 {
            warn!(
                "Relay {} failed ({} in a row): {}",
                what, self.consecutive, err
            );
        }
    }

    fn succeeded(&mut self, what: &str) {
        if self.consecutive >= WARN_EVERY {
            debug!("Relay {} recovered after {} failures", what, self.consecutive);
        }
        self.consecutive = 0;
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl<R: Registry> RelayLink<R> {
    pub fn new(registry: Arc<R>, room_code: &str, config: &NetplayConfig) -> Self {
        Self {
            registry,
            room_code: room_code.to_string(),
            poll_interval: config.relay_poll_interval(),
            push_interval: config.broadcast_interval(),
            drain_interval: config.input_drain_interval(),
            timeout: config.relay_timeout(),
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RegistryError>>,
    ) -> Result<T, RegistryError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(RegistryError::Timeout))
    }

    /// Remote side: polls the host's latest snapshot and forwards each new
    /// one. "No data yet" is ignored.
    pub fn spawn_state_poller<E>(
        &self,
        events: mpsc::UnboundedSender<E>,
        mut shutdown: ShutdownSignal,
    ) -> LoopHandle
    where
        E: From<StateSnapshot> + Send + 'static,
    {
        let link = self.clone();
        LoopHandle::spawn("relay state poll", async move {
            let mut ticker = ticker(link.poll_interval);
            let mut failures = FailureLog::default();
            let mut last_tick = None;

            loop {
                tokio::select! {
                    _ = shutdown.triggered() => return,
                    _ = ticker.tick() => {}
                }

                match link.bounded(link.registry.poll_relay_state(&link.room_code)).await {
                    Ok(Some(snapshot)) => {
                        failures.succeeded("state poll");
                        if last_tick == Some(snapshot.tick) {
                            continue;
                        }
                        last_tick = Some(snapshot.tick);
                        if events.send(E::from(snapshot)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => failures.succeeded("state poll"),
                    Err(e) => failures.failed("state poll", &e),
                }
            }
        })
    }

    /// Host side: drains the relay's input buffer and forwards every input in
    /// arrival order.
    pub fn spawn_input_poller<E>(
        &self,
        events: mpsc::UnboundedSender<E>,
        mut shutdown: ShutdownSignal,
    ) -> LoopHandle
    where
        E: From<RemoteInput> + Send + 'static,
    {
        let link = self.clone();
        LoopHandle::spawn("relay input poll", async move {
            let mut ticker = ticker(link.poll_interval);
            let mut failures = FailureLog::default();

            loop {
                tokio::select! {
                    _ = shutdown.triggered() => return,
                    _ = ticker.tick() => {}
                }

                match link.bounded(link.registry.poll_relay_input(&link.room_code)).await {
                    Ok(inputs) => {
                        failures.succeeded("input poll");
                        for input in inputs {
                            if events.send(E::from(input)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => failures.failed("input poll", &e),
                }
            }
        })
    }

    /// Host side: pushes the latest snapshot at the broadcast rate. Only a
    /// snapshot newer than the last attempt is pushed; a timed-out push is
    /// dropped. On shutdown one last attempt carries the final snapshot.
    pub fn spawn_state_pusher(&self, mut feed: SnapshotFeed, mut shutdown: ShutdownSignal) -> LoopHandle {
        let link = self.clone();
        LoopHandle::spawn("relay state push", async move {
            let mut ticker = ticker(link.push_interval);
            let mut failures = FailureLog::default();
            let mut last_attempted: Option<u64> = None;

            loop {
                let stopping = tokio::select! {
                    _ = shutdown.triggered() => true,
                    _ = ticker.tick() => false,
                };

                // Only the newest snapshot matters; older ones were overwritten
                let latest = feed.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    if last_attempted.map_or(true, |tick| snapshot.tick > tick) {
                        last_attempted = Some(snapshot.tick);
                        match link
                            .bounded(link.registry.push_relay_state(&link.room_code, &snapshot))
                            .await
                        {
                            Ok(()) => failures.succeeded("state push"),
                            Err(e) => failures.failed("state push", &e),
                        }
                    }
                }

                // The attempt above carried the final snapshot
                if stopping {
                    return;
                }
            }
        })
    }

    /// Remote side: starts the drain loop and returns the queue feeding it.
    pub fn spawn_input_sender(&self, mut shutdown: ShutdownSignal) -> (RelayInputQueue, LoopHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RemoteInput>();
        let link = self.clone();
        let handle = LoopHandle::spawn("relay input drain", async move {
            let mut ticker = ticker(link.drain_interval);
            let mut failures = FailureLog::default();

            loop {
                tokio::select! {
                    _ = shutdown.triggered() => return,
                    _ = ticker.tick() => {}
                }

                let input = match rx.try_recv() {
                    Ok(input) => input,
                    Err(mpsc::error::TryRecvError::Empty) => continue,
                    Err(mpsc::error::TryRecvError::Disconnected) => return,
                };
                match link
                    .bounded(link.registry.push_relay_input(&link.room_code, input))
                    .await
                {
                    Ok(()) => failures.succeeded("input push"),
                    Err(e) => failures.failed("input push", &e),
                }
            }
        });
        (RelayInputQueue { tx }, handle)
    }
}

/// Local queue of inputs waiting for the drain loop.
#[derive(Debug, Clone)]
pub struct RelayInputQueue {
    tx: mpsc::UnboundedSender<RemoteInput>,
}

impl RelayInputQueue {
    /// Returns `false` once the drain loop has stopped.
    pub fn send_input(&self, input: RemoteInput) -> bool {
        self.tx.send(input).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InputKind;
    use crate::registry::{MemoryRegistry, RoomRegistration};
    use crate::shutdown::Shutdown;
    use crate::testing::snapshot;
    use std::net::{IpAddr, Ipv4Addr};

    fn fast_config() -> NetplayConfig {
        NetplayConfig {
            relay_poll_rate: 200,
            broadcast_rate: 200,
            input_drain_rate: 500,
            ..NetplayConfig::default()
        }
    }

    async fn room(registry: &MemoryRegistry) {
        registry
            .create_room(&RoomRegistration {
                code: "AB12CD".to_string(),
                host_name: "Alice".to_string(),
                host_local_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                host_public_addr: None,
                host_port: 5555,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_inputs_travel_in_order() {
        let registry = MemoryRegistry::new();
        room(&registry).await;
        let link = RelayLink::new(Arc::new(registry.clone()), "AB12CD", &fast_config());
        let shutdown = Shutdown::new();

        let (queue, drain) = link.spawn_input_sender(shutdown.signal());
        let (tx, mut rx) = mpsc::unbounded_channel::<RemoteInput>();
        let poll = link.spawn_input_poller(tx, shutdown.signal());

        let sent = [InputKind::MoveUp, InputKind::ForcePush, InputKind::MoveDown];
        for kind in sent {
            assert!(queue.send_input(RemoteInput::new(kind)));
        }

        let mut received = Vec::new();
        while received.len() < sent.len() {
            let input = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(input.kind);
        }
        assert_eq!(received, sent);

        shutdown.trigger();
        drain.join().await;
        poll.join().await;
    }

    #[tokio::test]
    async fn test_pusher_only_sends_newer_snapshots() {
        let registry = MemoryRegistry::new();
        room(&registry).await;
        let link = RelayLink::new(Arc::new(registry.clone()), "AB12CD", &fast_config());
        let shutdown = Shutdown::new();

        let (feed_tx, feed_rx) = watch::channel(None);
        let pusher = link.spawn_state_pusher(feed_rx, shutdown.signal());

        feed_tx.send_replace(Some(Arc::new(snapshot(5))));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.poll_relay_state("AB12CD").await.unwrap().unwrap().tick, 5);

        // An older snapshot is never pushed over a newer one.
        feed_tx.send_replace(Some(Arc::new(snapshot(3))));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.poll_relay_state("AB12CD").await.unwrap().unwrap().tick, 5);

        shutdown.trigger();
        pusher.join().await;
    }

    #[tokio::test]
    async fn test_pusher_flushes_final_snapshot_on_shutdown() {
        let registry = MemoryRegistry::new();
        room(&registry).await;
        let config = NetplayConfig {
            broadcast_rate: 1,
            ..NetplayConfig::default()
        };
        let link = RelayLink::new(Arc::new(registry.clone()), "AB12CD", &config);
        let shutdown = Shutdown::new();

        let (feed_tx, feed_rx) = watch::channel(None);
        let pusher = link.spawn_state_pusher(feed_rx, shutdown.signal());
        // Let the immediate first tick pass with nothing to push.
        tokio::time::sleep(Duration::from_millis(20)).await;

        feed_tx.send_replace(Some(Arc::new(snapshot(42))));
        shutdown.trigger();
        pusher.join().await;

        assert_eq!(registry.poll_relay_state("AB12CD").await.unwrap().unwrap().tick, 42);
    }

    #[tokio::test]
    async fn test_state_poller_forwards_each_tick_once() {
        let registry = MemoryRegistry::new();
        room(&registry).await;
        let link = RelayLink::new(Arc::new(registry.clone()), "AB12CD", &fast_config());
        let shutdown = Shutdown::new();

        let (tx, mut rx) = mpsc::unbounded_channel::<StateSnapshot>();
        let poller = link.spawn_state_poller(tx, shutdown.signal());

        registry.push_relay_state("AB12CD", &snapshot(7)).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.tick, 7);

        // Same snapshot still stored; several polls later nothing new arrived.
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());

        shutdown.trigger();
        poller.join().await;
    }
}
