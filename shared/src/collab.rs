//! Seams to the parts of the game that live outside the netplay layer:
//! input devices, drawing and match statistics.

use crate::protocol::InputKind;
use crate::session::PlayerId;
use crate::snapshot::{MatchResult, StateSnapshot};
use log::{debug, info};

/// Level state of one player's controls at the moment they are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub up: bool,
    pub down: bool,
    pub force: bool,
    pub pause: bool,
    pub restart: bool,
}

/// Supplies the current controls for a player.
pub trait ControlSource: Send {
    fn current(&mut self, player_id: PlayerId) -> ControlState;
}

pub trait SnapshotRenderer: Send {
    fn render(&mut self, snapshot: &StateSnapshot);
}

pub trait ResultRecorder: Send {
    fn record(&mut self, result: &MatchResult);
}

/// Turns level-triggered control state into discrete input events.
///
/// Movement is reported whenever the resulting direction changes; force,
/// pause and restart fire on the press edge only.
#[derive(Debug, Default)]
pub struct ControlEdges {
    previous: ControlState,
    direction: Option<InputKind>,
}

impl ControlEdges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, state: ControlState) -> Vec<InputKind> {
        let mut events = Vec::new();

        let direction = match (state.up, state.down) {
            (true, false) => InputKind::MoveUp,
            (false, true) => InputKind::MoveDown,
            _ => InputKind::Stop,
        };
        // Nothing to stop before the first movement.
        let changed = match self.direction {
            Some(previous) => previous != direction,
            None => direction != InputKind::Stop,
        };
        if changed {
            events.push(direction);
            self.direction = Some(direction);
        }

        if state.force && !self.previous.force {
            events.push(InputKind::ForcePush);
        }
        if state.pause && !self.previous.pause {
            events.push(InputKind::Pause);
        }
        if state.restart && !self.previous.restart {
            events.push(InputKind::Restart);
        }

        self.previous = state;
        events
    }
}

/// Controls that are never pressed. Used by the headless binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleControls;

impl ControlSource for IdleControls {
    fn current(&mut self, _player_id: PlayerId) -> ControlState {
        ControlState::default()
    }
}

/// Logs score changes, phase changes and a periodic summary.
#[derive(Debug)]
pub struct LogRenderer {
    every: u64,
    last_scores: Option<[u32; 2]>,
    last_phase: Option<crate::session::SessionPhase>,
}

impl LogRenderer {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            last_scores: None,
            last_phase: None,
        }
    }
}

impl Default for LogRenderer {
    fn default() -> Self {
        Self::new(60)
    }
}

impl SnapshotRenderer for LogRenderer {
    fn render(&mut self, snapshot: &StateSnapshot) {
        if self.last_phase != Some(snapshot.phase) {
            info!("Match {}", snapshot.phase);
            self.last_phase = Some(snapshot.phase);
        }
        if self.last_scores != Some(snapshot.scores) {
            info!("Score {} - {}", snapshot.scores[0], snapshot.scores[1]);
            self.last_scores = Some(snapshot.scores);
        }
        if snapshot.tick % self.every == 0 {
            debug!(
                "Tick {}: ball ({:.0}, {:.0}), paddles {:.0} / {:.0}",
                snapshot.tick,
                snapshot.ball.x,
                snapshot.ball.y,
                snapshot.paddles[0].y,
                snapshot.paddles[1].y
            );
        }
    }
}

#[derive(Debug, Default)]
pub struct LogRecorder {
    recorded: Vec<MatchResult>,
}

impl LogRecorder {
    pub fn results(&self) -> &[MatchResult] {
        &self.recorded
    }
}

impl ResultRecorder for LogRecorder {
    fn record(&mut self, result: &MatchResult) {
        match result.winner {
            Some(winner) => info!(
                "Match over ({:?}): player {} wins {} - {}",
                result.reason, winner, result.scores[0], result.scores[1]
            ),
            None => info!(
                "Match over ({:?}) with no winner at {} - {}",
                result.reason, result.scores[0], result.scores[1]
            ),
        }
        self.recorded.push(result.clone());
    }
}
