//! Room lifecycle calls as the game sees them: create, join, update, close.
//!
//! [`Matchmaker`] layers validation, address discovery and the user-facing
//! error taxonomy over a raw [`Registry`].

use crate::address::AddressResolver;
use crate::error::NetplayError;
use crate::registry::{Registry, RegistryError, RoomRegistration};
use crate::session::{
    generate_room_code, is_valid_room_code, normalize_room_code, PlayerIdentity, Room, RoomStatus,
    REMOTE_PLAYER_ID,
};
use crate::shutdown::ShutdownSignal;
use log::{debug, info, warn};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Fresh codes tried when the registry reports a collision.
const CREATE_ATTEMPTS: usize = 3;

/// Where a joining player should connect, and under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub room_code: String,
    pub addr: IpAddr,
    /// Host's LAN address, for when the public one is not reachable.
    pub fallback_addr: Option<IpAddr>,
    pub port: u16,
    /// Name assigned by the registry; callers adopt it.
    pub player_name: String,
}

impl ConnectInfo {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }

    pub fn fallback_socket_addr(&self) -> Option<SocketAddr> {
        self.fallback_addr
            .filter(|addr| *addr != self.addr)
            .map(|addr| SocketAddr::new(addr, self.port))
    }
}

pub struct Matchmaker<R, A> {
    registry: Arc<R>,
    resolver: A,
    timeout: Duration,
}

impl<R, A: Clone> Clone for Matchmaker<R, A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            resolver: self.resolver.clone(),
            timeout: self.timeout,
        }
    }
}

impl<R: Registry, A: AddressResolver> Matchmaker<R, A> {
    pub fn new(registry: Arc<R>, resolver: A, timeout: Duration) -> Self {
        Self {
            registry,
            resolver,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RegistryError>>,
    ) -> Result<T, RegistryError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(RegistryError::Timeout))
    }

    /// Fails with a readable error if the service does not answer.
    pub async fn check_health(&self) -> Result<(), NetplayError> {
        self.bounded(self.registry.health()).await.map_err(|e| {
            NetplayError::RegistryUnavailable {
                reason: e.to_string(),
            }
        })
    }

    /// Registers a new room hosted by `host_name` on `port`.
    ///
    /// No connection may be accepted unless this succeeds.
    pub async fn create_room(&self, host_name: &str, port: u16) -> Result<Room, NetplayError> {
        let registration_error = |reason: String| NetplayError::Registration { reason };

        self.check_health()
            .await
            .map_err(|e| registration_error(e.to_string()))?;

        let public = self.resolver.public_ip().await.ok_or_else(|| {
            registration_error("could not determine public IP address".to_string())
        })?;
        let local = self.resolver.local_ip().await;

        let mut last_error = RegistryError::CodeInUse;
        for attempt in 1..=CREATE_ATTEMPTS {
            let registration = RoomRegistration {
                code: generate_room_code(),
                host_name: host_name.to_string(),
                host_local_addr: local,
                host_public_addr: Some(public),
                host_port: port,
            };

            match self.bounded(self.registry.create_room(&registration)).await {
                Ok(()) => {
                    info!(
                        "Room {} created (public {}, local {}, port {})",
                        registration.code, public, local, port
                    );
                    return Ok(Room {
                        code: registration.code,
                        host_name: registration.host_name,
                        host_public_addr: registration.host_public_addr,
                        host_local_addr: local,
                        host_port: port,
                        status: RoomStatus::Waiting,
                        participants: vec![PlayerIdentity::host(host_name)],
                    });
                }
                Err(RegistryError::CodeInUse) => {
                    debug!(
                        "Room code {} taken (attempt {}/{})",
                        registration.code, attempt, CREATE_ATTEMPTS
                    );
                    last_error = RegistryError::CodeInUse;
                }
                Err(e) => return Err(registration_error(e.to_string())),
            }
        }
        Err(registration_error(last_error.to_string()))
    }

    /// Looks up and joins `code`, returning where to connect.
    pub async fn join_room(&self, code: &str, player_name: &str) -> Result<ConnectInfo, NetplayError> {
        let code = normalize_room_code(code);
        if !is_valid_room_code(&code) {
            return Err(NetplayError::InvalidRoomCode { code });
        }
        self.check_health().await?;

        let room = self
            .bounded(self.registry.get_room(&code))
            .await?
            .ok_or_else(|| NetplayError::RoomNotFound { code: code.clone() })?;
        if room.is_full() {
            return Err(NetplayError::RoomFull { code });
        }

        let grant = match self.bounded(self.registry.join_room(&code, player_name)).await {
            Ok(grant) => grant,
            Err(RegistryError::NotFound) => return Err(NetplayError::RoomNotFound { code }),
            Err(RegistryError::Full) => return Err(NetplayError::RoomFull { code }),
            Err(e) => return Err(e.into()),
        };

        let addr = grant.host_public_addr.unwrap_or_else(|| room.preferred_addr());
        let fallback_addr = grant.host_local_addr.or(Some(room.host_local_addr));
        let port = if grant.host_port == 0 {
            room.host_port
        } else {
            grant.host_port
        };
        if grant.player_name != player_name {
            info!("Registry renamed you to '{}'", grant.player_name);
        }
        info!("Joined room {} hosted at {}:{}", code, addr, port);

        Ok(ConnectInfo {
            room_code: code,
            addr,
            fallback_addr,
            port,
            player_name: grant.player_name,
        })
    }

    /// Best effort; failures are only logged.
    pub async fn update_status(&self, code: &str, status: RoomStatus) {
        match self.bounded(self.registry.update_room(code, status)).await {
            Ok(()) => debug!("Room {} is now {}", code, status),
            Err(e) => warn!("Failed to update room {} to {}: {}", code, status, e),
        }
    }

    /// Best effort; failures are only logged.
    pub async fn close_room(&self, code: &str) {
        match self.bounded(self.registry.close_room(code)).await {
            Ok(()) => info!("Room {} closed", code),
            Err(e) => warn!("Failed to close room {}: {}", code, e),
        }
    }

    /// Gives up the second seat. Best effort; failures are only logged.
    pub async fn leave_room(&self, code: &str, player_name: &str) {
        match self.bounded(self.registry.leave_room(code, player_name)).await {
            Ok(()) => info!("Left room {}", code),
            Err(e) => warn!("Failed to leave room {}: {}", code, e),
        }
    }

    /// Polls the room until a second participant appears. `None` if the room
    /// vanished or shutdown was triggered first.
    pub async fn wait_for_participant(
        &self,
        code: &str,
        poll_every: Duration,
        mut shutdown: ShutdownSignal,
    ) -> Option<PlayerIdentity> {
        let mut ticker = tokio::time::interval(poll_every);
        loop {
            tokio::select! {
                _ = shutdown.triggered() => return None,
                _ = ticker.tick() => {}
            }

            match self.bounded(self.registry.get_room(code)).await {
                Ok(Some(room)) => {
                    if let Some(player) = room
                        .participants
                        .into_iter()
                        .find(|p| p.id == REMOTE_PLAYER_ID)
                    {
                        info!("{} joined room {}", player.display_name, code);
                        return Some(player);
                    }
                }
                Ok(None) => {
                    warn!("Room {} disappeared while waiting for a player", code);
                    return None;
                }
                Err(e) => debug!("Room {} lookup failed: {}", code, e),
            }
        }
    }

    /// Polls the room while `player` holds the second seat and returns why
    /// they are gone. `None` if shutdown was triggered first.
    ///
    /// Failed lookups are not a departure; only the registry saying so is.
    pub async fn watch_participant(
        &self,
        code: &str,
        player: &PlayerIdentity,
        poll_every: Duration,
        mut shutdown: ShutdownSignal,
    ) -> Option<String> {
        let mut ticker = tokio::time::interval(poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.triggered() => return None,
                _ = ticker.tick() => {}
            }

            match self.bounded(self.registry.get_room(code)).await {
                Ok(Some(room)) => {
                    let seated = room
                        .participants
                        .iter()
                        .any(|p| p.id == REMOTE_PLAYER_ID && p.display_name == player.display_name);
                    if !seated {
                        return Some(format!("{} left room {}", player.display_name, code));
                    }
                }
                Ok(None) => return Some(format!("room {} is gone from the registry", code)),
                Err(e) => debug!("Room {} lookup failed: {}", code, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::FixedAddresses;
    use crate::protocol::RemoteInput;
    use crate::registry::{JoinGrant, MemoryRegistry};
    use crate::shutdown::Shutdown;
    use crate::snapshot::StateSnapshot;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports the first `collisions` codes as taken.
    struct Colliding {
        inner: MemoryRegistry,
        collisions: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl Colliding {
        fn new(collisions: usize) -> Self {
            Self {
                inner: MemoryRegistry::new(),
                collisions: AtomicUsize::new(collisions),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    impl Registry for Colliding {
        async fn health(&self) -> Result<(), RegistryError> {
            Ok(())
        }

        async fn create_room(&self, registration: &RoomRegistration) -> Result<(), RegistryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.collisions.load(Ordering::SeqCst);
            if left > 0 {
                self.collisions.store(left - 1, Ordering::SeqCst);
                return Err(RegistryError::CodeInUse);
            }
            self.inner.create_room(registration).await
        }

        async fn get_room(&self, code: &str) -> Result<Option<Room>, RegistryError> {
            self.inner.get_room(code).await
        }

        async fn join_room(&self, code: &str, player_name: &str) -> Result<JoinGrant, RegistryError> {
            self.inner.join_room(code, player_name).await
        }

        async fn update_room(&self, code: &str, status: RoomStatus) -> Result<(), RegistryError> {
            self.inner.update_room(code, status).await
        }

        async fn close_room(&self, code: &str) -> Result<(), RegistryError> {
            self.inner.close_room(code).await
        }

        async fn leave_room(&self, code: &str, player_name: &str) -> Result<(), RegistryError> {
            self.inner.leave_room(code, player_name).await
        }

        async fn push_relay_state(&self, code: &str, snapshot: &StateSnapshot) -> Result<(), RegistryError> {
            self.inner.push_relay_state(code, snapshot).await
        }

        async fn poll_relay_state(&self, code: &str) -> Result<Option<StateSnapshot>, RegistryError> {
            self.inner.poll_relay_state(code).await
        }

        async fn push_relay_input(&self, code: &str, input: RemoteInput) -> Result<(), RegistryError> {
            self.inner.push_relay_input(code, input).await
        }

        async fn poll_relay_input(&self, code: &str) -> Result<Vec<RemoteInput>, RegistryError> {
            self.inner.poll_relay_input(code).await
        }
    }

    fn colliding(collisions: usize) -> (Matchmaker<Colliding, FixedAddresses>, Arc<Colliding>) {
        let registry = Arc::new(Colliding::new(collisions));
        let mm = Matchmaker::new(
            Arc::clone(&registry),
            FixedAddresses::loopback(),
            Duration::from_secs(1),
        );
        (mm, registry)
    }

    fn matchmaker(registry: &MemoryRegistry) -> Matchmaker<MemoryRegistry, FixedAddresses> {
        let addresses = FixedAddresses {
            public: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))),
            local: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
        };
        Matchmaker::new(Arc::new(registry.clone()), addresses, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_create_then_join() {
        let registry = MemoryRegistry::new();
        let mm = matchmaker(&registry);

        let room = mm.create_room("Alice", 5555).await.unwrap();
        assert!(is_valid_room_code(&room.code));
        assert_eq!(room.participants, vec![PlayerIdentity::host("Alice")]);

        let info = mm.join_room(&room.code.to_lowercase(), "Bob").await.unwrap();
        assert_eq!(info.room_code, room.code);
        assert_eq!(info.socket_addr().to_string(), "203.0.113.7:5555");
        assert_eq!(
            info.fallback_socket_addr().map(|a| a.to_string()),
            Some("192.168.1.20:5555".to_string())
        );
        assert_eq!(info.player_name, "Bob");
    }

    #[tokio::test]
    async fn test_join_errors() {
        let registry = MemoryRegistry::new();
        let mm = matchmaker(&registry);

        assert!(matches!(
            mm.join_room("ZZZZZZ", "Bob").await,
            Err(NetplayError::RoomNotFound { .. })
        ));
        assert!(matches!(
            mm.join_room("AB-1", "Bob").await,
            Err(NetplayError::InvalidRoomCode { .. })
        ));

        let room = mm.create_room("Alice", 5555).await.unwrap();
        mm.join_room(&room.code, "Bob").await.unwrap();
        assert!(matches!(
            mm.join_room(&room.code, "Carol").await,
            Err(NetplayError::RoomFull { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_requires_public_address() {
        let registry = MemoryRegistry::new();
        let addresses = FixedAddresses {
            public: None,
            local: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        let mm = Matchmaker::new(Arc::new(registry.clone()), addresses, Duration::from_secs(1));

        assert!(matches!(
            mm.create_room("Alice", 5555).await,
            Err(NetplayError::Registration { .. })
        ));
        assert_eq!(registry.open_rooms(), 0);
    }

    #[tokio::test]
    async fn test_code_collision_gets_fresh_code() {
        let (mm, registry) = colliding(1);
        let room = mm.create_room("Alice", 5555).await.unwrap();
        assert_eq!(registry.attempts.load(Ordering::SeqCst), 2);
        assert!(registry.inner.room(&room.code).is_some());
    }

    #[tokio::test]
    async fn test_persistent_collision_is_a_registration_error() {
        let (mm, registry) = colliding(usize::MAX);
        assert!(matches!(
            mm.create_room("Alice", 5555).await,
            Err(NetplayError::Registration { .. })
        ));
        assert_eq!(registry.attempts.load(Ordering::SeqCst), CREATE_ATTEMPTS);
        assert_eq!(registry.inner.open_rooms(), 0);
    }

    #[tokio::test]
    async fn test_close_is_best_effort() {
        let registry = MemoryRegistry::new();
        let mm = matchmaker(&registry);
        // Unknown room: logged, not propagated.
        mm.close_room("ZZZZZZ").await;
        mm.update_status("ZZZZZZ", RoomStatus::InProgress).await;

        let room = mm.create_room("Alice", 5555).await.unwrap();
        mm.update_status(&room.code, RoomStatus::InProgress).await;
        assert_eq!(registry.room(&room.code).unwrap().status, RoomStatus::InProgress);
        mm.close_room(&room.code).await;
        assert_eq!(registry.open_rooms(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_participant() {
        let registry = MemoryRegistry::new();
        let mm = matchmaker(&registry);
        let room = mm.create_room("Alice", 5555).await.unwrap();
        let shutdown = Shutdown::new();

        let waiter = {
            let mm = mm.clone();
            let code = room.code.clone();
            let signal = shutdown.signal();
            tokio::spawn(async move {
                mm.wait_for_participant(&code, Duration::from_millis(5), signal)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        mm.join_room(&room.code, "Bob").await.unwrap();

        let joined = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(joined, PlayerIdentity::remote("Bob"));
    }

    #[tokio::test]
    async fn test_watch_reports_departure() {
        let registry = MemoryRegistry::new();
        let mm = matchmaker(&registry);
        let room = mm.create_room("Alice", 5555).await.unwrap();
        let info = mm.join_room(&room.code, "Bob").await.unwrap();
        let shutdown = Shutdown::new();

        let watcher = {
            let mm = mm.clone();
            let code = room.code.clone();
            let signal = shutdown.signal();
            tokio::spawn(async move {
                let bob = PlayerIdentity::remote("Bob");
                mm.watch_participant(&code, &bob, Duration::from_millis(5), signal)
                    .await
            })
        };

        // Still seated after several polls.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!watcher.is_finished());

        mm.leave_room(&room.code, &info.player_name).await;
        let reason = tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(reason.contains("Bob"));
        assert_eq!(registry.room(&room.code).unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let registry = MemoryRegistry::new();
        let mm = matchmaker(&registry);
        let room = mm.create_room("Alice", 5555).await.unwrap();
        mm.join_room(&room.code, "Bob").await.unwrap();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let bob = PlayerIdentity::remote("Bob");
        let reason = mm
            .watch_participant(&room.code, &bob, Duration::from_secs(1), shutdown.signal())
            .await;
        assert!(reason.is_none());
    }

    #[tokio::test]
    async fn test_wait_stops_on_shutdown() {
        let registry = MemoryRegistry::new();
        let mm = matchmaker(&registry);
        let room = mm.create_room("Alice", 5555).await.unwrap();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let joined = mm
            .wait_for_participant(&room.code, Duration::from_secs(1), shutdown.signal())
            .await;
        assert!(joined.is_none());
    }
}
