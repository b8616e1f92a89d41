use super::{JoinGrant, Registry, RegistryError, RoomRegistration};
use crate::protocol::RemoteInput;
use crate::session::{PlayerIdentity, Room, RoomStatus, HOST_PLAYER_ID};
use crate::snapshot::StateSnapshot;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct RoomEntry {
    room: Room,
    relay_state: Option<StateSnapshot>,
    relay_inputs: VecDeque<RemoteInput>,
}

/// In-process registry with the same rules as the hosted service.
///
/// Clones share one room table, so a host and a remote in the same process
/// (or test) see each other's rooms.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    rooms: Arc<Mutex<HashMap<String, RoomEntry>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, RoomEntry>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a room as currently stored, closed rooms excluded.
    pub fn room(&self, code: &str) -> Option<Room> {
        self.rooms().get(code).map(|entry| entry.room.clone())
    }

    pub fn open_rooms(&self) -> usize {
        self.rooms().len()
    }

    /// Inputs waiting for the host to poll.
    pub fn pending_inputs(&self, code: &str) -> usize {
        self.rooms()
            .get(code)
            .map(|entry| entry.relay_inputs.len())
            .unwrap_or(0)
    }
}

fn unique_name(requested: &str, taken: &[PlayerIdentity]) -> String {
    let requested = requested.trim();
    let requested = if requested.is_empty() { "Player" } else { requested };
    if !taken.iter().any(|p| p.display_name == requested) {
        return requested.to_string();
    }
    (2..)
        .map(|n| format!("{} ({})", requested, n))
        .find(|candidate| !taken.iter().any(|p| &p.display_name == candidate))
        .unwrap_or_else(|| requested.to_string())
}

impl Registry for MemoryRegistry {
    async fn health(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn create_room(&self, registration: &RoomRegistration) -> Result<(), RegistryError> {
        let mut rooms = self.rooms();
        if rooms.contains_key(&registration.code) {
            return Err(RegistryError::CodeInUse);
        }

        let room = Room {
            code: registration.code.clone(),
            host_name: registration.host_name.clone(),
            host_public_addr: registration.host_public_addr,
            host_local_addr: registration.host_local_addr,
            host_port: registration.host_port,
            status: RoomStatus::Waiting,
            participants: vec![PlayerIdentity::host(registration.host_name.clone())],
        };
        debug!("Memory registry: created room {}", room.code);
        rooms.insert(
            registration.code.clone(),
            RoomEntry {
                room,
                relay_state: None,
                relay_inputs: VecDeque::new(),
            },
        );
        Ok(())
    }

    async fn get_room(&self, code: &str) -> Result<Option<Room>, RegistryError> {
        Ok(self.room(code))
    }

    async fn join_room(&self, code: &str, player_name: &str) -> Result<JoinGrant, RegistryError> {
        let mut rooms = self.rooms();
        let entry = rooms.get_mut(code).ok_or(RegistryError::NotFound)?;
        let room = &mut entry.room;
        if room.is_full() {
            return Err(RegistryError::Full);
        }

        let assigned = unique_name(player_name, &room.participants);
        room.participants.push(PlayerIdentity::remote(assigned.clone()));
        debug!("Memory registry: {} joined room {}", assigned, code);

        Ok(JoinGrant {
            host_public_addr: room.host_public_addr,
            host_local_addr: Some(room.host_local_addr),
            host_port: room.host_port,
            player_name: assigned,
            players: room
                .participants
                .iter()
                .map(|p| p.display_name.clone())
                .collect(),
        })
    }

    async fn update_room(&self, code: &str, status: RoomStatus) -> Result<(), RegistryError> {
        if status == RoomStatus::Closed {
            return self.close_room(code).await;
        }
        let mut rooms = self.rooms();
        let entry = rooms.get_mut(code).ok_or(RegistryError::NotFound)?;
        entry.room.status = status;
        Ok(())
    }

    async fn close_room(&self, code: &str) -> Result<(), RegistryError> {
        match self.rooms().remove(code) {
            Some(_) => {
                debug!("Memory registry: closed room {}", code);
                Ok(())
            }
            None => Err(RegistryError::NotFound),
        }
    }

    async fn leave_room(&self, code: &str, player_name: &str) -> Result<(), RegistryError> {
        let mut rooms = self.rooms();
        let entry = rooms.get_mut(code).ok_or(RegistryError::NotFound)?;
        let participants = &mut entry.room.participants;
        let before = participants.len();
        participants.retain(|p| p.id == HOST_PLAYER_ID || p.display_name != player_name);
        if participants.len() == before {
            return Err(RegistryError::NotFound);
        }
        debug!("Memory registry: {} left room {}", player_name, code);
        Ok(())
    }

    async fn push_relay_state(&self, code: &str, snapshot: &StateSnapshot) -> Result<(), RegistryError> {
        let mut rooms = self.rooms();
        let entry = rooms.get_mut(code).ok_or(RegistryError::NotFound)?;
        entry.relay_state = Some(snapshot.clone());
        Ok(())
    }

    async fn poll_relay_state(&self, code: &str) -> Result<Option<StateSnapshot>, RegistryError> {
        Ok(self
            .rooms()
            .get(code)
            .and_then(|entry| entry.relay_state.clone()))
    }

    async fn push_relay_input(&self, code: &str, input: RemoteInput) -> Result<(), RegistryError> {
        let mut rooms = self.rooms();
        let entry = rooms.get_mut(code).ok_or(RegistryError::NotFound)?;
        entry.relay_inputs.push_back(input);
        Ok(())
    }

    async fn poll_relay_input(&self, code: &str) -> Result<Vec<RemoteInput>, RegistryError> {
        Ok(self
            .rooms()
            .get_mut(code)
            .map(|entry| entry.relay_inputs.drain(..).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InputKind;
    use crate::testing::snapshot;
    use std::net::{IpAddr, Ipv4Addr};

    fn registration(code: &str) -> RoomRegistration {
        RoomRegistration {
            code: code.to_string(),
            host_name: "Alice".to_string(),
            host_local_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            host_public_addr: None,
            host_port: 5555,
        }
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let registry = MemoryRegistry::new();
        registry.create_room(&registration("AB12CD")).await.unwrap();
        assert_eq!(
            registry.create_room(&registration("AB12CD")).await,
            Err(RegistryError::CodeInUse)
        );
        assert_eq!(registry.open_rooms(), 1);
    }

    #[tokio::test]
    async fn test_join_caps_participants() {
        let registry = MemoryRegistry::new();
        registry.create_room(&registration("AB12CD")).await.unwrap();

        let grant = registry.join_room("AB12CD", "Bob").await.unwrap();
        assert_eq!(grant.player_name, "Bob");
        assert_eq!(grant.players, vec!["Alice", "Bob"]);
        assert_eq!(grant.host_port, 5555);

        assert_eq!(
            registry.join_room("AB12CD", "Carol").await,
            Err(RegistryError::Full)
        );
        assert_eq!(
            registry.join_room("ZZZZZZ", "Carol").await,
            Err(RegistryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_join_disambiguates_name() {
        let registry = MemoryRegistry::new();
        registry.create_room(&registration("AB12CD")).await.unwrap();
        let grant = registry.join_room("AB12CD", "Alice").await.unwrap();
        assert_eq!(grant.player_name, "Alice (2)");
    }

    #[tokio::test]
    async fn test_leave_frees_the_seat() {
        let registry = MemoryRegistry::new();
        registry.create_room(&registration("AB12CD")).await.unwrap();
        registry.join_room("AB12CD", "Bob").await.unwrap();

        registry.leave_room("AB12CD", "Bob").await.unwrap();
        let room = registry.room("AB12CD").unwrap();
        assert_eq!(room.participants, vec![PlayerIdentity::host("Alice")]);

        // The host cannot be removed this way.
        assert_eq!(
            registry.leave_room("AB12CD", "Alice").await,
            Err(RegistryError::NotFound)
        );
        assert_eq!(
            registry.leave_room("ZZZZZZ", "Bob").await,
            Err(RegistryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_close_removes_room_and_relay_data() {
        let registry = MemoryRegistry::new();
        registry.create_room(&registration("AB12CD")).await.unwrap();
        registry
            .push_relay_state("AB12CD", &snapshot(1))
            .await
            .unwrap();

        registry.update_room("AB12CD", RoomStatus::Closed).await.unwrap();
        assert!(registry.get_room("AB12CD").await.unwrap().is_none());
        assert!(registry.poll_relay_state("AB12CD").await.unwrap().is_none());
        assert_eq!(
            registry.close_room("AB12CD").await,
            Err(RegistryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_relay_state_is_latest_and_not_consumed() {
        let registry = MemoryRegistry::new();
        registry.create_room(&registration("AB12CD")).await.unwrap();
        assert!(registry.poll_relay_state("AB12CD").await.unwrap().is_none());

        registry.push_relay_state("AB12CD", &snapshot(1)).await.unwrap();
        registry.push_relay_state("AB12CD", &snapshot(2)).await.unwrap();

        for _ in 0..2 {
            let polled = registry.poll_relay_state("AB12CD").await.unwrap().unwrap();
            assert_eq!(polled.tick, 2);
        }
    }

    #[tokio::test]
    async fn test_relay_inputs_drain_in_order() {
        let registry = MemoryRegistry::new();
        registry.create_room(&registration("AB12CD")).await.unwrap();

        registry
            .push_relay_input("AB12CD", RemoteInput::new(InputKind::MoveUp))
            .await
            .unwrap();
        registry
            .push_relay_input("AB12CD", RemoteInput::new(InputKind::Stop))
            .await
            .unwrap();
        assert_eq!(registry.pending_inputs("AB12CD"), 2);

        let inputs = registry.poll_relay_input("AB12CD").await.unwrap();
        let kinds: Vec<_> = inputs.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![InputKind::MoveUp, InputKind::Stop]);
        assert!(registry.poll_relay_input("AB12CD").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_to_unknown_room_fails() {
        let registry = MemoryRegistry::new();
        assert_eq!(
            registry
                .push_relay_input("ZZZZZZ", RemoteInput::new(InputKind::Pause))
                .await,
            Err(RegistryError::NotFound)
        );
        assert!(registry.poll_relay_input("ZZZZZZ").await.unwrap().is_empty());
    }
}
