//! Authoritative match state.
//!
//! [`Simulation`] is the single writer of the session phase and of every
//! snapshot. Inputs are queued between ticks and applied at the start of the
//! next one, remote inputs first.

use crate::physics;
use log::{debug, info, warn};
use shared::{
    BallState, EndReason, InputKind, MatchResult, PaddleState, PhaseError, PlayerId, RemoteInput,
    SessionPhase, StateSnapshot, HOST_PLAYER_ID, REMOTE_PLAYER_ID,
};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputRejected {
    #[error("remote input for player {0}; only player 2 is remote")]
    WrongPlayer(PlayerId),
    #[error("the match has ended")]
    SessionEnded,
}

#[derive(Debug)]
pub struct Simulation {
    tick: u64,
    phase: SessionPhase,
    ball: BallState,
    paddles: [PaddleState; 2],
    directions: [f32; 2],
    scores: [u32; 2],
    win_score: u32,
    winner: Option<PlayerId>,
    serve_timer: f32,
    next_receiver: PlayerId,
    remote_queue: VecDeque<InputKind>,
    local_queue: VecDeque<InputKind>,
    result: Option<MatchResult>,
    final_emitted: bool,
}

fn slot(player_id: PlayerId) -> usize {
    if player_id == HOST_PLAYER_ID {
        0
    } else {
        1
    }
}

impl Simulation {
    pub fn new(win_score: u32) -> Self {
        Self {
            tick: 0,
            phase: SessionPhase::Waiting,
            ball: physics::centred_ball(),
            paddles: physics::initial_paddles(),
            directions: [0.0; 2],
            scores: [0; 2],
            win_score: win_score.max(1),
            winner: None,
            serve_timer: 0.0,
            next_receiver: REMOTE_PLAYER_ID,
            remote_queue: VecDeque::new(),
            local_queue: VecDeque::new(),
            result: None,
            final_emitted: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn scores(&self) -> [u32; 2] {
        self.scores
    }

    pub fn win_score(&self) -> u32 {
        self.win_score
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// True once the snapshot carrying `Ended` has been produced.
    pub fn is_finished(&self) -> bool {
        self.final_emitted
    }

    fn set_phase(&mut self, next: SessionPhase) -> Result<(), PhaseError> {
        let next = self.phase.transition(next)?;
        info!("Session phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Second participant arrived: Waiting -> Starting -> InProgress and the
    /// first serve.
    pub fn participant_joined(&mut self) -> Result<(), PhaseError> {
        self.set_phase(SessionPhase::Starting)?;
        self.reset_field();
        self.set_phase(SessionPhase::InProgress)
    }

    /// Queues an input from the remote peer for the next tick.
    pub fn queue_remote_input(&mut self, input: RemoteInput) -> Result<(), InputRejected> {
        if input.player_id != REMOTE_PLAYER_ID {
            return Err(InputRejected::WrongPlayer(input.player_id));
        }
        if self.phase.is_terminal() {
            return Err(InputRejected::SessionEnded);
        }
        self.remote_queue.push_back(input.kind);
        Ok(())
    }

    /// Queues an input for the host's own paddle.
    pub fn queue_local_input(&mut self, kind: InputKind) {
        if !self.phase.is_terminal() {
            self.local_queue.push_back(kind);
        }
    }

    /// Ends the match now. Returns the result the first time only.
    pub fn end_session(&mut self, reason: EndReason) -> Option<MatchResult> {
        if self.phase.is_terminal() {
            return None;
        }
        if let Err(e) = self.set_phase(SessionPhase::Ended) {
            warn!("Cannot end session: {}", e);
            return None;
        }
        if reason == EndReason::ScoreLimit {
            self.winner = self.leader();
        }
        let result = MatchResult {
            winner: self.winner,
            scores: self.scores,
            reason,
            ticks_played: self.tick,
        };
        self.remote_queue.clear();
        self.local_queue.clear();
        self.result = Some(result.clone());
        Some(result)
    }

    fn leader(&self) -> Option<PlayerId> {
        match self.scores[0].cmp(&self.scores[1]) {
            std::cmp::Ordering::Greater => Some(HOST_PLAYER_ID),
            std::cmp::Ordering::Less => Some(REMOTE_PLAYER_ID),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn reset_field(&mut self) {
        self.paddles = physics::initial_paddles();
        self.directions = [0.0; 2];
        self.ball = physics::serve_toward(self.next_receiver);
        self.serve_timer = 0.0;
    }

    /// Scores, ball, paddles and meters back to the start; play resumes.
    pub fn restart(&mut self) {
        if !matches!(self.phase, SessionPhase::InProgress | SessionPhase::Paused) {
            debug!("Restart ignored in phase {}", self.phase);
            return;
        }
        self.scores = [0; 2];
        self.winner = None;
        self.next_receiver = REMOTE_PLAYER_ID;
        self.reset_field();
        if self.phase == SessionPhase::Paused {
            // Paused -> InProgress is always legal.
            let _ = self.set_phase(SessionPhase::InProgress);
        }
        info!("Match restarted");
    }

    pub fn toggle_pause(&mut self) {
        let next = match self.phase {
            SessionPhase::InProgress => SessionPhase::Paused,
            SessionPhase::Paused => SessionPhase::InProgress,
            other => {
                debug!("Pause ignored in phase {}", other);
                return;
            }
        };
        let _ = self.set_phase(next);
    }

    fn apply(&mut self, player_id: PlayerId, kind: InputKind) {
        match kind {
            InputKind::Pause => return self.toggle_pause(),
            InputKind::Restart => return self.restart(),
            _ => {}
        }
        if !self.phase.is_running() {
            debug!("Dropped {:?} from player {} while {}", kind, player_id, self.phase);
            return;
        }

        let i = slot(player_id);
        match kind {
            InputKind::MoveUp => self.directions[i] = -1.0,
            InputKind::MoveDown => self.directions[i] = 1.0,
            InputKind::Stop => self.directions[i] = 0.0,
            InputKind::ForcePush => {
                if physics::try_force_push(&mut self.paddles, player_id, &mut self.ball) {
                    debug!("Player {} force push", player_id);
                }
            }
            InputKind::Pause | InputKind::Restart => {}
        }
    }

    fn step(&mut self, dt: f32) {
        for i in 0..2 {
            physics::move_paddle(&mut self.paddles[i], self.directions[i], dt);
            physics::charge_force(&mut self.paddles[i], dt);
        }

        if self.serve_timer > 0.0 {
            self.serve_timer -= dt;
            if self.serve_timer <= 0.0 {
                self.serve_timer = 0.0;
                self.ball = physics::serve_toward(self.next_receiver);
            }
            return;
        }

        if let Some(scorer) = physics::step_ball(&mut self.ball, &self.paddles, dt) {
            self.scores[slot(scorer)] += 1;
            info!(
                "Player {} scores: {} - {}",
                scorer, self.scores[0], self.scores[1]
            );

            if self.scores[slot(scorer)] >= self.win_score {
                self.end_session(EndReason::ScoreLimit);
                return;
            }
            self.next_receiver = if scorer == HOST_PLAYER_ID {
                REMOTE_PLAYER_ID
            } else {
                HOST_PLAYER_ID
            };
            self.ball = physics::centred_ball();
            self.serve_timer = physics::SERVE_DELAY;
        }
    }

    /// Advances one fixed tick and returns its snapshot.
    ///
    /// The tick that ends the match still produces a snapshot (carrying
    /// `Ended`); every call after that returns `None`.
    pub fn tick(&mut self, dt: f32) -> Option<Arc<StateSnapshot>> {
        if self.final_emitted {
            return None;
        }
        self.tick += 1;

        while let Some(kind) = self.remote_queue.pop_front() {
            self.apply(REMOTE_PLAYER_ID, kind);
        }
        while let Some(kind) = self.local_queue.pop_front() {
            self.apply(HOST_PLAYER_ID, kind);
        }

        if self.phase.is_running() {
            self.step(dt);
        }

        if self.phase.is_terminal() {
            self.final_emitted = true;
        }
        Some(Arc::new(self.snapshot()))
    }

    /// Current state without advancing.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            tick: self.tick,
            timestamp_ms: shared::timestamp_ms(),
            phase: self.phase,
            ball: self.ball,
            paddles: self.paddles,
            scores: self.scores,
            win_score: self.win_score,
            winner: self.winner,
        }
    }
}
