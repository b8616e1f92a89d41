use crate::session::{PlayerId, SessionPhase, HOST_PLAYER_ID, REMOTE_PLAYER_ID};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddleState {
    pub x: f32,
    pub y: f32,
    pub vel_y: f32,
    /// Charge in `0.0..=1.0`.
    pub force_meter: f32,
    pub force_ready: bool,
    /// Seconds until the next force push is allowed.
    pub force_cooldown: f32,
}

/// One immutable capture of the authoritative simulation at a given tick.
///
/// Snapshots are produced only by the host and are shared behind an `Arc`;
/// consumers replace their whole view with one, never patch fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub phase: SessionPhase,
    pub ball: BallState,
    pub paddles: [PaddleState; 2],
    pub scores: [u32; 2],
    pub win_score: u32,
    pub winner: Option<PlayerId>,
}

impl StateSnapshot {
    pub fn paddle(&self, player_id: PlayerId) -> Option<&PaddleState> {
        match player_id {
            HOST_PLAYER_ID => Some(&self.paddles[0]),
            REMOTE_PLAYER_ID => Some(&self.paddles[1]),
            _ => None,
        }
    }

    pub fn score(&self, player_id: PlayerId) -> Option<u32> {
        match player_id {
            HOST_PLAYER_ID => Some(self.scores[0]),
            REMOTE_PLAYER_ID => Some(self.scores[1]),
            _ => None,
        }
    }

    /// True if `self` was produced after `other`.
    pub fn is_newer_than(&self, other: &StateSnapshot) -> bool {
        self.tick > other.tick
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    ScoreLimit,
    PeerLost,
    Shutdown,
}

/// Outcome handed to the statistics collaborator when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: Option<PlayerId>,
    pub scores: [u32; 2],
    pub reason: EndReason,
    pub ticks_played: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::snapshot as sample;

    #[test]
    fn test_paddle_and_score_lookup() {
        let snap = sample(4);
        assert_eq!(snap.paddle(1).map(|p| p.x), Some(30.0));
        assert_eq!(snap.paddle(2).map(|p| p.x), Some(755.0));
        assert!(snap.paddle(3).is_none());
        assert_eq!(snap.score(1), Some(2));
        assert_eq!(snap.score(2), Some(3));
        assert_eq!(snap.score(0), None);
    }

    #[test]
    fn test_newer_than_uses_tick() {
        let older = sample(9);
        let newer = sample(10);
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!newer.is_newer_than(&newer.clone()));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::to_value(sample(1)).unwrap();
        assert_eq!(json["phase"], "in_progress");
        assert_eq!(json["scores"][1], 3);
        assert!(json["winner"].is_null());
    }
}
