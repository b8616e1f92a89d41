//! Host runtime: registers the room, admits the remote player and drives the
//! fixed-rate tick loop that feeds both transports.

use crate::game::Simulation;
use crate::lifecycle::{LifecycleEvent, RejectReason, RoomLifecycle};
use log::{debug, error, info, warn};
use shared::codec::encode_frame;
use shared::collab::{IdleControls, LogRecorder, LogRenderer};
use shared::shutdown::join_all;
use shared::{
    AddressResolver, ControlEdges, ControlSource, DirectTransport, EndReason, LoopHandle,
    MatchResult, Matchmaker, Message, NetplayConfig, NetplayError, PlayerIdentity, Registry,
    RelayLink, RemoteInput, ResultRecorder, Room, RoomStatus, SessionPhase, Shutdown,
    SnapshotFeed, SnapshotRenderer, StateSnapshot, TransportEvent, TransportMode, HOST_PLAYER_ID,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// How often the relay host checks the registry for a joined player, and
/// later for that player still being seated.
const JOIN_POLL: Duration = Duration::from_secs(1);

/// Everything that reaches the tick loop from other tasks.
#[derive(Debug)]
pub enum HostEvent {
    Connected { stream: TcpStream, addr: SocketAddr },
    ParticipantJoined(PlayerIdentity),
    RemoteInput(RemoteInput),
    PeerLost(String),
    Unexpected(&'static str),
    Stop,
}

impl From<TransportEvent> for HostEvent {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Message(Message::Input(input)) => HostEvent::RemoteInput(input),
            TransportEvent::Message(Message::PlayerDisconnected { message }) => {
                HostEvent::PeerLost(message)
            }
            TransportEvent::Message(other) => HostEvent::Unexpected(other.kind()),
            TransportEvent::Closed(reason) => HostEvent::PeerLost(reason),
        }
    }
}

impl From<RemoteInput> for HostEvent {
    fn from(input: RemoteInput) -> Self {
        HostEvent::RemoteInput(input)
    }
}

/// What the host tells its surroundings (UI, tests) about the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    RoomOpened(Room),
    PlayerJoined(PlayerIdentity),
    PlayerDisconnected { message: String },
    Ended(MatchResult),
}

/// Asks a running host to end the session.
#[derive(Debug, Clone)]
pub struct HostStopper {
    events: mpsc::UnboundedSender<HostEvent>,
}

impl HostStopper {
    pub fn stop(&self) {
        let _ = self.events.send(HostEvent::Stop);
    }
}

pub struct Host<R, A> {
    config: NetplayConfig,
    matchmaker: Matchmaker<R, A>,
    lifecycle: RoomLifecycle,
    simulation: Simulation,

    controls: Box<dyn ControlSource>,
    edges: ControlEdges,
    renderer: Box<dyn SnapshotRenderer>,
    recorder: Box<dyn ResultRecorder>,

    events_tx: mpsc::UnboundedSender<HostEvent>,
    events_rx: mpsc::UnboundedReceiver<HostEvent>,
    notices: Option<mpsc::UnboundedSender<SessionNotice>>,
    feed: watch::Sender<Option<Arc<StateSnapshot>>>,

    peer: Option<DirectTransport>,
    shutdown: Shutdown,
    loops: Vec<LoopHandle>,
    local_addr: Option<SocketAddr>,
}

impl<R, A> Host<R, A>
where
    R: Registry,
    A: AddressResolver + Clone,
{
    pub fn new(config: NetplayConfig, matchmaker: Matchmaker<R, A>, host_name: &str) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (feed, _) = watch::channel(None);
        Self {
            simulation: Simulation::new(config.win_score),
            config,
            matchmaker,
            lifecycle: RoomLifecycle::new(host_name),
            controls: Box::new(IdleControls),
            edges: ControlEdges::new(),
            renderer: Box::new(LogRenderer::default()),
            recorder: Box::new(LogRecorder::default()),
            events_tx,
            events_rx,
            notices: None,
            feed,
            peer: None,
            shutdown: Shutdown::new(),
            loops: Vec::new(),
            local_addr: None,
        }
    }

    pub fn with_controls(mut self, controls: Box<dyn ControlSource>) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn SnapshotRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_recorder(mut self, recorder: Box<dyn ResultRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Subscribes to session notices. Only the latest subscriber is served.
    pub fn notices(&mut self) -> mpsc::UnboundedReceiver<SessionNotice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.notices = Some(tx);
        rx
    }

    pub fn stopper(&self) -> HostStopper {
        HostStopper {
            events: self.events_tx.clone(),
        }
    }

    /// Latest snapshot as published each tick.
    pub fn snapshots(&self) -> SnapshotFeed {
        self.feed.subscribe()
    }

    /// Bound address of the direct listener, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn room(&self) -> Option<&Room> {
        self.lifecycle.room()
    }

    fn notify(&self, notice: SessionNotice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }

    /// Registers the room and starts waiting for the remote player.
    ///
    /// In direct mode the port is bound first so the advertised port is the
    /// real one, but nothing is accepted unless registration succeeds.
    pub async fn open(&mut self) -> Result<Room, NetplayError> {
        let listener = match self.config.transport {
            TransportMode::Direct => {
                Some(TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.config.port)).await?)
            }
            TransportMode::Relay => None,
        };
        let port = match &listener {
            Some(listener) => listener.local_addr()?.port(),
            None => self.config.port,
        };

        let host_name = self.lifecycle.host().display_name.clone();
        let room = self.matchmaker.create_room(&host_name, port).await?;
        self.lifecycle.registered(room.clone());

        match listener {
            Some(listener) => {
                self.local_addr = Some(listener.local_addr()?);
                info!("Waiting for a player on port {} (room {})", port, room.code);
                self.loops.push(self.spawn_accept(listener));
            }
            None => {
                info!("Waiting for a player to join room {} via relay", room.code);
                self.loops.push(self.spawn_join_watch(&room.code));
            }
        }

        self.notify(SessionNotice::RoomOpened(room.clone()));
        Ok(room)
    }

    fn spawn_accept(&self, listener: TcpListener) -> LoopHandle {
        let events = self.events_tx.clone();
        let mut shutdown = self.shutdown.signal();
        LoopHandle::spawn("accept", async move {
            loop {
                tokio::select! {
                    _ = shutdown.triggered() => return,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            info!("Connection from {}", addr);
                            if events.send(HostEvent::Connected { stream, addr }).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
            }
        })
    }

    fn spawn_join_watch(&self, code: &str) -> LoopHandle {
        let matchmaker = self.matchmaker.clone();
        let code = code.to_string();
        let events = self.events_tx.clone();
        let shutdown = self.shutdown.signal();
        LoopHandle::spawn("join watch", async move {
            if let Some(player) = matchmaker
                .wait_for_participant(&code, JOIN_POLL, shutdown)
                .await
            {
                let _ = events.send(HostEvent::ParticipantJoined(player));
            }
        })
    }

    /// Relay mode has no socket to drop, so the registry seat is the
    /// remote's presence.
    fn spawn_presence_watch(&self, code: &str, player: PlayerIdentity) -> LoopHandle {
        let matchmaker = self.matchmaker.clone();
        let code = code.to_string();
        let events = self.events_tx.clone();
        let shutdown = self.shutdown.signal();
        LoopHandle::spawn("presence watch", async move {
            if let Some(reason) = matchmaker
                .watch_participant(&code, &player, JOIN_POLL, shutdown)
                .await
            {
                let _ = events.send(HostEvent::PeerLost(reason));
            }
        })
    }

    /// Runs the session until it ends and returns its result.
    pub async fn run(&mut self) -> Result<MatchResult, NetplayError> {
        if self.lifecycle.room().is_none() {
            return Err(NetplayError::Registration {
                reason: "no room registered; call open() first".to_string(),
            });
        }

        let tick_duration = self.config.tick_duration();
        let dt = tick_duration.as_secs_f32();
        let broadcast_every = u64::from((self.config.tick_rate / self.config.broadcast_rate).max(1));

        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Host loop running at {} Hz", self.config.tick_rate);

        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = ticker.tick() => {
                    if self.on_tick(dt, broadcast_every) {
                        break;
                    }
                }
            }
        }

        Ok(self.finish().await)
    }

    fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Connected { stream, addr } => self.on_connection(stream, addr),
            HostEvent::ParticipantJoined(player) => match self.lifecycle.admit(&player.display_name) {
                LifecycleEvent::Joined(identity) => self.begin_match(identity),
                other => debug!("Relay join ignored: {:?}", other),
            },
            HostEvent::RemoteInput(input) => {
                if let Err(e) = self.simulation.queue_remote_input(input) {
                    warn!("Rejected remote input {:?}: {}", input.kind, e);
                }
            }
            HostEvent::PeerLost(reason) => self.on_peer_lost(reason),
            HostEvent::Unexpected(kind) => warn!("Ignoring unexpected {} message from remote", kind),
            HostEvent::Stop => {
                info!("Stopping host");
                self.lifecycle.close();
                self.simulation.end_session(EndReason::Shutdown);
            }
        }
    }

    fn on_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let name = format!("Player at {}", addr.ip());
        match self.lifecycle.admit(&name) {
            LifecycleEvent::Joined(identity) => {
                let peer = match DirectTransport::spawn(
                    stream,
                    self.config.idle_timeout(),
                    self.events_tx.clone(),
                ) {
                    Ok(peer) => peer,
                    Err(e) => {
                        error!("Could not set up connection from {}: {}", addr, e);
                        self.on_peer_lost(e.to_string());
                        return;
                    }
                };

                let welcome = Message::Welcome {
                    player_id: identity.id,
                    room_code: self.lifecycle.room_code().map(str::to_string),
                    win_score: self.simulation.win_score(),
                };
                if let Err(e) = peer.send(welcome) {
                    warn!("Failed to welcome {}: {}", addr, e);
                }
                self.peer = Some(peer);
                self.begin_match(identity);
            }
            LifecycleEvent::Rejected(reason) => {
                let message = match reason {
                    RejectReason::RoomFull => format!(
                        "Room {} is full",
                        self.lifecycle.room_code().unwrap_or_default()
                    ),
                    RejectReason::SessionOver => "The match is over".to_string(),
                };
                tokio::spawn(turn_away(stream, addr, message));
            }
            LifecycleEvent::Left(_) => {}
        }
    }

    fn begin_match(&mut self, identity: PlayerIdentity) {
        if let Err(e) = self.simulation.participant_joined() {
            warn!("Cannot start match: {}", e);
            return;
        }
        self.notify(SessionNotice::PlayerJoined(identity.clone()));

        let win_score = self.simulation.win_score();
        if let Some(peer) = &self.peer {
            if let Err(e) = peer.send(Message::GameStart { win_score }) {
                warn!("Failed to send game start: {}", e);
            }
        }

        let Some(code) = self.lifecycle.room_code().map(str::to_string) else {
            return;
        };

        if self.config.transport == TransportMode::Relay {
            // Relay loops, plus a watch on the remote's registry seat
            let link = RelayLink::new(Arc::clone(self.matchmaker.registry()), &code, &self.config);
            self.loops
                .push(link.spawn_input_poller(self.events_tx.clone(), self.shutdown.signal()));
            self.loops
                .push(link.spawn_state_pusher(self.feed.subscribe(), self.shutdown.signal()));
            self.loops.push(self.spawn_presence_watch(&code, identity));
        }

        let matchmaker = self.matchmaker.clone();
        self.loops.push(LoopHandle::spawn("room status", async move {
            matchmaker.update_status(&code, RoomStatus::InProgress).await;
        }));
    }

    fn on_peer_lost(&mut self, reason: String) {
        match self.lifecycle.leave() {
            Some(LifecycleEvent::Left(identity)) => {
                warn!("{} disconnected: {}", identity.display_name, reason);
                self.notify(SessionNotice::PlayerDisconnected { message: reason });
                self.simulation.end_session(EndReason::PeerLost);
            }
            _ => debug!("Peer loss already handled ({})", reason),
        }
    }

    /// One fixed tick. Returns `true` once the final snapshot went out.
    fn on_tick(&mut self, dt: f32, broadcast_every: u64) -> bool {
        // Local input first, so it lands on this tick like queued remote input
        let controls = self.controls.current(HOST_PLAYER_ID);
        for kind in self.edges.update(controls) {
            self.simulation.queue_local_input(kind);
        }

        let Some(snapshot) = self.simulation.tick(dt) else {
            return true;
        };

        // Publish: local view, relay pusher via the feed, then the socket
        self.renderer.render(&snapshot);
        self.feed.send_replace(Some(Arc::clone(&snapshot)));

        let due = snapshot.tick % broadcast_every == 0 || snapshot.phase.is_terminal();
        if due && snapshot.phase != SessionPhase::Waiting {
            if let Some(peer) = self.peer.as_ref().filter(|peer| !peer.is_closed()) {
                if let Err(e) = peer.send(Message::State((*snapshot).clone())) {
                    debug!("State not sent: {}", e);
                }
            }
        }

        if snapshot.tick % 60 == 0 {
            debug!(
                "Tick {}: {} ({} - {})",
                snapshot.tick, snapshot.phase, snapshot.scores[0], snapshot.scores[1]
            );
        }
        self.simulation.is_finished()
    }

    async fn finish(&mut self) -> MatchResult {
        let result = self.simulation.result().cloned().unwrap_or_else(|| MatchResult {
            winner: None,
            scores: self.simulation.scores(),
            reason: EndReason::Shutdown,
            ticks_played: self.simulation.tick_count(),
        });
        self.recorder.record(&result);
        self.notify(SessionNotice::Ended(result.clone()));

        // Say goodbye on the socket unless the remote is already gone
        if let Some(peer) = self.peer.take() {
            let farewell = match result.reason {
                EndReason::ScoreLimit => Some("Match over"),
                EndReason::Shutdown => Some("Host ended the session"),
                EndReason::PeerLost => None,
            };
            if let Some(message) = farewell {
                let _ = peer.send(Message::HostDisconnected {
                    message: message.to_string(),
                });
            }
            peer.close().await;
        }

        let relay_peer = self.config.transport == TransportMode::Relay
            && self.lifecycle.remote().is_some();

        // Stop every background loop; the pusher flushes the final snapshot
        self.shutdown.trigger();
        join_all(std::mem::take(&mut self.loops)).await;

        if let Some(code) = self.lifecycle.room_code().map(str::to_string) {
            if relay_peer {
                // Give the remote a few polls to pick up the final snapshot.
                tokio::time::sleep(self.config.relay_poll_interval() * 3).await;
            }
            self.matchmaker.close_room(&code).await;
        }
        info!(
            "Session over after {} ticks: {} - {}",
            result.ticks_played, result.scores[0], result.scores[1]
        );
        result
    }
}

/// Tells an extra connection the room is taken, then hangs up.
async fn turn_away(mut stream: TcpStream, addr: SocketAddr, message: String) {
    info!("Turning away {}: {}", addr, message);
    let frame = match encode_frame(&Message::HostDisconnected { message }) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Could not encode rejection: {}", e);
            return;
        }
    };
    if let Err(e) = stream.write_all(&frame).await {
        debug!("Rejection to {} not delivered: {}", addr, e);
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{FixedAddresses, InputKind, MemoryRegistry};

    fn host(transport: TransportMode) -> (Host<MemoryRegistry, FixedAddresses>, MemoryRegistry) {
        let registry = MemoryRegistry::new();
        let matchmaker = Matchmaker::new(
            Arc::new(registry.clone()),
            FixedAddresses::loopback(),
            Duration::from_secs(1),
        );
        let config = NetplayConfig {
            transport,
            port: 0,
            ..NetplayConfig::default()
        };
        (Host::new(config, matchmaker, "Alice"), registry)
    }

    #[test]
    fn test_transport_events_map_to_host_events() {
        let input = RemoteInput::new(InputKind::MoveUp);
        assert!(matches!(
            HostEvent::from(TransportEvent::Message(Message::Input(input))),
            HostEvent::RemoteInput(i) if i == input
        ));
        assert!(matches!(
            HostEvent::from(TransportEvent::Closed("reset".to_string())),
            HostEvent::PeerLost(_)
        ));
        assert!(matches!(
            HostEvent::from(TransportEvent::Message(Message::GameStart { win_score: 5 })),
            HostEvent::Unexpected("game_start")
        ));
    }

    #[tokio::test]
    async fn test_run_requires_open_room() {
        let (mut host, _) = host(TransportMode::Direct);
        assert!(matches!(
            host.run().await,
            Err(NetplayError::Registration { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_registers_and_listens() {
        let (mut host, registry) = host(TransportMode::Direct);
        let room = host.open().await.unwrap();

        let stored = registry.room(&room.code).unwrap();
        let bound = host.local_addr().unwrap();
        assert_eq!(stored.host_port, bound.port());
        assert_ne!(bound.port(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_anyone_joins() {
        let (mut host, registry) = host(TransportMode::Relay);
        let mut notices = host.notices();
        let room = host.open().await.unwrap();

        host.stopper().stop();
        let result = host.run().await.unwrap();
        assert_eq!(result.reason, EndReason::Shutdown);
        assert_eq!(result.winner, None);
        assert!(registry.room(&room.code).is_none());

        assert!(matches!(notices.recv().await, Some(SessionNotice::RoomOpened(_))));
        assert!(matches!(notices.recv().await, Some(SessionNotice::Ended(_))));
    }
}
