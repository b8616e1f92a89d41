//! Remote input capture with change detection

use log::debug;
use shared::collab::IdleControls;
use shared::{ControlEdges, ControlSource, InputKind, RemoteInput, REMOTE_PLAYER_ID};

/// Samples the local controls each frame and turns changes into inputs for
/// the host.
pub struct InputManager {
    source: Box<dyn ControlSource>,
    edges: ControlEdges,
    sent: u64,
}

impl InputManager {
    pub fn new(source: Box<dyn ControlSource>) -> Self {
        Self {
            source,
            edges: ControlEdges::new(),
            sent: 0,
        }
    }

    /// Reads the controls and returns the inputs to forward, in the order
    /// they happened. Nothing is produced once the match has ended, but the
    /// controls are still read so a held key does not fire on resume.
    pub fn update(&mut self, ended: bool) -> Vec<RemoteInput> {
        let state = self.source.current(REMOTE_PLAYER_ID);
        let kinds = self.edges.update(state);
        if ended {
            if !kinds.is_empty() {
                debug!("Match over; dropping {} input(s)", kinds.len());
            }
            return Vec::new();
        }

        let inputs: Vec<RemoteInput> = kinds.into_iter().map(RemoteInput::new).collect();
        self.sent += inputs.len() as u64;
        for input in &inputs {
            if input.kind != InputKind::Stop {
                debug!("Input {:?}", input.kind);
            }
        }
        inputs
    }

    /// Inputs produced so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(Box::new(IdleControls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ControlState, PlayerId};
    use std::collections::VecDeque;

    /// Plays back a fixed sequence of control states, then idles.
    struct Scripted(VecDeque<ControlState>);

    impl ControlSource for Scripted {
        fn current(&mut self, player_id: PlayerId) -> ControlState {
            assert_eq!(player_id, REMOTE_PLAYER_ID);
            self.0.pop_front().unwrap_or_default()
        }
    }

    fn manager(states: Vec<ControlState>) -> InputManager {
        InputManager::new(Box::new(Scripted(states.into())))
    }

    #[test]
    fn test_idle_controls_send_nothing() {
        let mut input = InputManager::default();
        assert!(input.update(false).is_empty());
        assert_eq!(input.sent(), 0);
    }

    #[test]
    fn test_inputs_carry_remote_id() {
        let up = ControlState {
            up: true,
            ..ControlState::default()
        };
        let mut input = manager(vec![up, up, ControlState::default()]);

        let first = input.update(false);
        assert_eq!(first, vec![RemoteInput::new(InputKind::MoveUp)]);
        assert_eq!(first[0].player_id, REMOTE_PLAYER_ID);

        assert!(input.update(false).is_empty());
        assert_eq!(input.update(false), vec![RemoteInput::new(InputKind::Stop)]);
        assert_eq!(input.sent(), 2);
    }

    #[test]
    fn test_press_edges_fire_once() {
        let force = ControlState {
            force: true,
            ..ControlState::default()
        };
        let mut input = manager(vec![force, force, ControlState::default(), force]);

        let kinds: Vec<InputKind> = (0..4)
            .flat_map(|_| input.update(false))
            .map(|i| i.kind)
            .collect();
        assert_eq!(kinds, vec![InputKind::ForcePush, InputKind::ForcePush]);
    }

    #[test]
    fn test_no_input_after_end() {
        let down = ControlState {
            down: true,
            ..ControlState::default()
        };
        let mut input = manager(vec![down]);
        assert!(input.update(true).is_empty());
        assert_eq!(input.sent(), 0);
    }
}
