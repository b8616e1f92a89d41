//! Remote runtime: joins a room, mirrors the host's snapshots and forwards
//! local input over whichever transport the room uses.

use crate::game::Mirror;
use crate::input::InputManager;
use log::{debug, error, info, warn};
use shared::collab::LogRenderer;
use shared::shutdown::join_all;
use shared::{
    AddressResolver, ConnectInfo, ControlSource, DirectTransport, LoopHandle, Matchmaker, Message,
    NetplayConfig, NetplayError, PlayerId, Registry, RelayInputQueue, RelayLink, RemoteInput,
    Shutdown, SnapshotRenderer, StateSnapshot, TransportEvent, TransportMode,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Everything that reaches the remote loop from other tasks.
#[derive(Debug)]
pub enum RemoteEvent {
    Welcome {
        player_id: PlayerId,
        room_code: Option<String>,
        win_score: u32,
    },
    GameStart {
        win_score: u32,
    },
    State(Arc<StateSnapshot>),
    HostLeft(String),
    ConnectionLost(String),
    Unexpected(&'static str),
    Stop,
}

impl From<TransportEvent> for RemoteEvent {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Message(Message::Welcome {
                player_id,
                room_code,
                win_score,
            }) => RemoteEvent::Welcome {
                player_id,
                room_code,
                win_score,
            },
            TransportEvent::Message(Message::GameStart { win_score }) => {
                RemoteEvent::GameStart { win_score }
            }
            TransportEvent::Message(Message::State(snapshot)) => {
                RemoteEvent::State(Arc::new(snapshot))
            }
            TransportEvent::Message(Message::HostDisconnected { message }) => {
                RemoteEvent::HostLeft(message)
            }
            TransportEvent::Message(other) => RemoteEvent::Unexpected(other.kind()),
            TransportEvent::Closed(reason) => RemoteEvent::ConnectionLost(reason),
        }
    }
}

impl From<StateSnapshot> for RemoteEvent {
    fn from(snapshot: StateSnapshot) -> Self {
        RemoteEvent::State(Arc::new(snapshot))
    }
}

/// Why the remote left the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveReason {
    /// The mirror received the host's `Ended` snapshot.
    MatchEnded,
    HostLeft(String),
    ConnectionLost(String),
    /// Local player quit.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RemoteOutcome {
    pub reason: LeaveReason,
    pub last_snapshot: Option<Arc<StateSnapshot>>,
    pub inputs_sent: u64,
}

/// Asks a running remote client to leave.
#[derive(Debug, Clone)]
pub struct RemoteStopper {
    events: mpsc::UnboundedSender<RemoteEvent>,
}

impl RemoteStopper {
    pub fn stop(&self) {
        let _ = self.events.send(RemoteEvent::Stop);
    }
}

/// Path from the local player to the host.
enum Upstream {
    Direct(DirectTransport),
    Relay(RelayInputQueue),
}

impl Upstream {
    fn send(&self, input: RemoteInput) -> Result<(), NetplayError> {
        match self {
            Upstream::Direct(peer) => peer.send(Message::Input(input)),
            Upstream::Relay(queue) => {
                if queue.send_input(input) {
                    Ok(())
                } else {
                    Err(NetplayError::TransportClosed {
                        reason: "relay input loop stopped".to_string(),
                    })
                }
            }
        }
    }
}

pub struct RemoteClient<R, A> {
    config: NetplayConfig,
    matchmaker: Matchmaker<R, A>,
    player_name: String,

    mirror: Mirror,
    input: InputManager,
    renderer: Box<dyn SnapshotRenderer>,

    events_tx: mpsc::UnboundedSender<RemoteEvent>,
    events_rx: mpsc::UnboundedReceiver<RemoteEvent>,

    upstream: Option<Upstream>,
    connect_info: Option<ConnectInfo>,
    shutdown: Shutdown,
    loops: Vec<LoopHandle>,
}

impl<R, A> RemoteClient<R, A>
where
    R: Registry,
    A: AddressResolver,
{
    pub fn new(config: NetplayConfig, matchmaker: Matchmaker<R, A>, player_name: &str) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            matchmaker,
            player_name: player_name.to_string(),
            mirror: Mirror::new(),
            input: InputManager::default(),
            renderer: Box::new(LogRenderer::default()),
            events_tx,
            events_rx,
            upstream: None,
            connect_info: None,
            shutdown: Shutdown::new(),
            loops: Vec::new(),
        }
    }

    pub fn with_controls(mut self, controls: Box<dyn ControlSource>) -> Self {
        self.input = InputManager::new(controls);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn SnapshotRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn stopper(&self) -> RemoteStopper {
        RemoteStopper {
            events: self.events_tx.clone(),
        }
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn connect_info(&self) -> Option<&ConnectInfo> {
        self.connect_info.as_ref()
    }

    /// Name the registry knows us by, once joined.
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// Joins `code` through the registry and opens the transport to the
    /// host.
    pub async fn join(&mut self, code: &str) -> Result<ConnectInfo, NetplayError> {
        let info = self.matchmaker.join_room(code, &self.player_name).await?;
        self.player_name = info.player_name.clone();
        self.mirror = Mirror::for_room(&info.room_code);

        let upstream = match self.config.transport {
            TransportMode::Direct => {
                let stream = dial_host(&info, self.config.registry_timeout()).await?;
                Upstream::Direct(DirectTransport::spawn(
                    stream,
                    self.config.idle_timeout(),
                    self.events_tx.clone(),
                )?)
            }
            TransportMode::Relay => {
                let link = RelayLink::new(
                    Arc::clone(self.matchmaker.registry()),
                    &info.room_code,
                    &self.config,
                );
                self.loops
                    .push(link.spawn_state_poller(self.events_tx.clone(), self.shutdown.signal()));
                let (queue, handle) = link.spawn_input_sender(self.shutdown.signal());
                self.loops.push(handle);
                info!("Following room {} through the relay", info.room_code);
                Upstream::Relay(queue)
            }
        };

        self.upstream = Some(upstream);
        self.connect_info = Some(info.clone());
        Ok(info)
    }

    /// Connects straight to a host's direct port without asking the
    /// registry. For hosts started with an in-process registry.
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<(), NetplayError> {
        let stream = dial(addr, self.config.registry_timeout()).await?;
        let peer = DirectTransport::spawn(stream, self.config.idle_timeout(), self.events_tx.clone())?;
        self.upstream = Some(Upstream::Direct(peer));
        Ok(())
    }

    /// Mirrors the match until it ends, the host goes away or the local
    /// player stops.
    pub async fn run(&mut self) -> Result<RemoteOutcome, NetplayError> {
        if self.upstream.is_none() {
            return Err(NetplayError::TransportClosed {
                reason: "not connected; call join() first".to_string(),
            });
        }

        let mut frame = interval(self.config.tick_duration());
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_update = Instant::now();
        info!("Remote loop running at {} Hz", self.config.tick_rate);

        // Events are handled as they arrive; local input goes out on the
        // frame tick.
        let reason = loop {
            let leave = tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle_event(event, &mut last_update),
                _ = frame.tick() => self.on_frame(last_update),
            };
            if let Some(reason) = leave {
                break reason;
            }
        };

        Ok(self.finish(reason).await)
    }

    fn handle_event(&mut self, event: RemoteEvent, last_update: &mut Instant) -> Option<LeaveReason> {
        match event {
            RemoteEvent::Welcome {
                player_id,
                room_code,
                win_score,
            } => {
                self.mirror.welcomed(player_id, room_code, win_score);
                None
            }
            RemoteEvent::GameStart { win_score } => {
                info!("Match started, first to {}", win_score);
                self.mirror.set_win_score(win_score);
                None
            }
            RemoteEvent::State(snapshot) => {
                if !self.mirror.apply(Arc::clone(&snapshot)) {
                    return None;
                }
                *last_update = Instant::now();
                self.renderer.render(&snapshot);
                self.mirror.is_ended().then_some(LeaveReason::MatchEnded)
            }
            RemoteEvent::HostLeft(message) => {
                warn!("Host disconnected: {}", message);
                Some(LeaveReason::HostLeft(message))
            }
            RemoteEvent::ConnectionLost(reason) => {
                error!("Connection to host lost: {}", reason);
                Some(LeaveReason::ConnectionLost(reason))
            }
            RemoteEvent::Unexpected(kind) => {
                warn!("Ignoring unexpected {} message from host", kind);
                None
            }
            RemoteEvent::Stop => {
                info!("Leaving the match");
                Some(LeaveReason::Stopped)
            }
        }
    }

    fn on_frame(&mut self, last_update: Instant) -> Option<LeaveReason> {
        let upstream = self.upstream.as_ref()?;
        for input in self.input.update(self.mirror.is_ended()) {
            if let Err(e) = upstream.send(input) {
                debug!("Input {:?} not sent: {}", input.kind, e);
            }
        }

        // The relay has no disconnect message; a host that stops publishing
        // is gone.
        let silent = last_update.elapsed();
        if matches!(upstream, Upstream::Relay(_))
            && self.mirror.view().is_some()
            && silent > self.config.idle_timeout()
        {
            return Some(LeaveReason::ConnectionLost(format!(
                "no update from the host for {:.1}s",
                silent.as_secs_f32()
            )));
        }
        None
    }

    async fn finish(&mut self, reason: LeaveReason) -> RemoteOutcome {
        // A voluntary leave is announced to the host.
        match self.upstream.take() {
            Some(Upstream::Direct(peer)) => {
                if reason == LeaveReason::Stopped {
                    let _ = peer.send(Message::PlayerDisconnected {
                        message: format!("{} left the match", self.player_name),
                    });
                }
                peer.close().await;
            }
            Some(Upstream::Relay(_)) if reason == LeaveReason::Stopped => {
                // No goodbye message over the relay; free the registry seat.
                if let Some(code) = self.connect_info.as_ref().map(|info| info.room_code.clone()) {
                    self.matchmaker.leave_room(&code, &self.player_name).await;
                }
            }
            _ => {}
        }

        // Stop the relay loops and wait for them to wind down.
        self.shutdown.trigger();
        join_all(std::mem::take(&mut self.loops)).await;

        match self.mirror.view() {
            Some(view) => info!(
                "Left after tick {}: {} - {} ({:?})",
                view.tick, view.scores[0], view.scores[1], reason
            ),
            None => info!("Left before the match started ({:?})", reason),
        }

        RemoteOutcome {
            reason,
            last_snapshot: self.mirror.view().cloned(),
            inputs_sent: self.input.sent(),
        }
    }
}

/// Tries the advertised address, then the host's LAN address.
async fn dial_host(info: &ConnectInfo, limit: Duration) -> Result<TcpStream, NetplayError> {
    let primary = info.socket_addr();
    match dial(primary, limit).await {
        Ok(stream) => Ok(stream),
        Err(e) => match info.fallback_socket_addr() {
            Some(fallback) => {
                warn!("Could not reach {} ({}); trying {}", primary, e, fallback);
                dial(fallback, limit).await
            }
            None => Err(e),
        },
    }
}

async fn dial(addr: SocketAddr, limit: Duration) -> Result<TcpStream, NetplayError> {
    info!("Connecting to host at {}", addr);
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(NetplayError::TransportClosed {
            reason: format!("timed out connecting to {}", addr),
        }),
    }
}
