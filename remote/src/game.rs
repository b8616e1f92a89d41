//! The remote player's copy of the match: the latest snapshot the host
//! produced, replaced whole, never simulated locally.

use log::{debug, info};
use shared::{PlayerId, SessionPhase, StateSnapshot, REMOTE_PLAYER_ID};
use std::sync::Arc;

#[derive(Debug)]
pub struct Mirror {
    view: Option<Arc<StateSnapshot>>,
    player_id: PlayerId,
    room_code: Option<String>,
    win_score: Option<u32>,
    discarded: u64,
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            view: None,
            player_id: REMOTE_PLAYER_ID,
            room_code: None,
            win_score: None,
            discarded: 0,
        }
    }

    pub fn for_room(room_code: &str) -> Self {
        Self {
            room_code: Some(room_code.to_string()),
            ..Self::new()
        }
    }

    /// Records what the host told us on connect.
    pub fn welcomed(&mut self, player_id: PlayerId, room_code: Option<String>, win_score: u32) {
        if player_id != REMOTE_PLAYER_ID {
            debug!("Host assigned unexpected id {}", player_id);
        }
        info!("Welcomed as player {} (first to {})", player_id, win_score);
        self.player_id = player_id;
        self.room_code = room_code.or(self.room_code.take());
        self.win_score = Some(win_score);
    }

    pub fn set_win_score(&mut self, win_score: u32) {
        self.win_score = Some(win_score);
    }

    /// Replaces the view with `snapshot` if it is newer than the current
    /// one. Returns whether it was applied.
    pub fn apply(&mut self, snapshot: Arc<StateSnapshot>) -> bool {
        if let Some(current) = &self.view {
            if !snapshot.is_newer_than(current) {
                self.discarded += 1;
                debug!(
                    "Discarding snapshot {} (showing {})",
                    snapshot.tick, current.tick
                );
                return false;
            }
            if current.phase != snapshot.phase {
                info!("Match {}", snapshot.phase);
            }
        }

        self.win_score = Some(snapshot.win_score);
        self.view = Some(snapshot);
        true
    }

    pub fn view(&self) -> Option<&Arc<StateSnapshot>> {
        self.view.as_ref()
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.view.as_ref().map(|view| view.tick)
    }

    pub fn phase(&self) -> SessionPhase {
        self.view
            .as_ref()
            .map_or(SessionPhase::Waiting, |view| view.phase)
    }

    pub fn is_ended(&self) -> bool {
        self.phase() == SessionPhase::Ended
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn win_score(&self) -> Option<u32> {
        self.win_score
    }

    /// Snapshots that arrived out of order or twice.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}
