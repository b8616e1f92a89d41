//! Host-side view of the room: who is in it and whether anyone else may join.

use log::{info, warn};
use shared::{PlayerIdentity, Room, MAX_PARTICIPANTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    RoomFull,
    SessionOver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Second participant admitted; the match can start.
    Joined(PlayerIdentity),
    Rejected(RejectReason),
    /// The remote participant is gone.
    Left(PlayerIdentity),
}

#[derive(Debug)]
pub struct RoomLifecycle {
    room: Option<Room>,
    host: PlayerIdentity,
    remote: Option<PlayerIdentity>,
    over: bool,
}

impl RoomLifecycle {
    pub fn new(host_name: &str) -> Self {
        Self {
            room: None,
            host: PlayerIdentity::host(host_name),
            remote: None,
            over: false,
        }
    }

    /// Records the room the registry accepted.
    pub fn registered(&mut self, room: Room) {
        info!("Hosting room {} as {}", room.code, self.host.display_name);
        self.room = Some(room);
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.code.as_str())
    }

    pub fn host(&self) -> &PlayerIdentity {
        &self.host
    }

    pub fn remote(&self) -> Option<&PlayerIdentity> {
        self.remote.as_ref()
    }

    pub fn participants(&self) -> Vec<PlayerIdentity> {
        std::iter::once(self.host.clone())
            .chain(self.remote.clone())
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        1 + usize::from(self.remote.is_some())
    }

    /// Admits a remote participant. The id is always assigned here, never
    /// taken from the peer.
    pub fn admit(&mut self, display_name: &str) -> LifecycleEvent {
        if self.over {
            return LifecycleEvent::Rejected(RejectReason::SessionOver);
        }
        if self.participant_count() >= MAX_PARTICIPANTS {
            warn!("Rejected {}: room is full", display_name);
            return LifecycleEvent::Rejected(RejectReason::RoomFull);
        }

        let identity = PlayerIdentity::remote(display_name);
        info!("{} joined as player {}", identity.display_name, identity.id);
        self.remote = Some(identity.clone());
        if let Some(room) = self.room.as_mut() {
            room.participants = vec![self.host.clone(), identity.clone()];
        }
        LifecycleEvent::Joined(identity)
    }

    /// Marks the remote participant as gone. `None` if nobody had joined or
    /// the loss was already reported.
    pub fn leave(&mut self) -> Option<LifecycleEvent> {
        if self.over {
            return None;
        }
        self.over = true;
        self.remote.take().map(|identity| {
            info!("{} left the room", identity.display_name);
            LifecycleEvent::Left(identity)
        })
    }

    /// Closes the room to further joins without anyone leaving.
    pub fn close(&mut self) {
        self.over = true;
    }

    pub fn is_over(&self) -> bool {
        self.over
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{RoomStatus, HOST_PLAYER_ID, REMOTE_PLAYER_ID};
    use std::net::{IpAddr, Ipv4Addr};

    fn room() -> Room {
        Room {
            code: "AB12CD".to_string(),
            host_name: "Alice".to_string(),
            host_public_addr: None,
            host_local_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            host_port: 5555,
            status: RoomStatus::Waiting,
            participants: vec![PlayerIdentity::host("Alice")],
        }
    }

    #[test]
    fn test_exactly_one_remote_admitted() {
        let mut lifecycle = RoomLifecycle::new("Alice");
        lifecycle.registered(room());
        assert_eq!(lifecycle.participant_count(), 1);
        assert_eq!(lifecycle.host().id, HOST_PLAYER_ID);

        match lifecycle.admit("Bob") {
            LifecycleEvent::Joined(identity) => assert_eq!(identity.id, REMOTE_PLAYER_ID),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(lifecycle.participant_count(), 2);
        assert_eq!(lifecycle.room().unwrap().participants.len(), 2);

        assert_eq!(
            lifecycle.admit("Carol"),
            LifecycleEvent::Rejected(RejectReason::RoomFull)
        );
        assert_eq!(lifecycle.remote().unwrap().display_name, "Bob");
    }

    #[test]
    fn test_leave_reported_once() {
        let mut lifecycle = RoomLifecycle::new("Alice");
        lifecycle.admit("Bob");

        assert_eq!(
            lifecycle.leave(),
            Some(LifecycleEvent::Left(PlayerIdentity::remote("Bob")))
        );
        assert_eq!(lifecycle.leave(), None);
        assert_eq!(lifecycle.participants(), vec![PlayerIdentity::host("Alice")]);
        assert_eq!(
            lifecycle.admit("Carol"),
            LifecycleEvent::Rejected(RejectReason::SessionOver)
        );
    }

    #[test]
    fn test_closed_room_rejects_joins() {
        let mut lifecycle = RoomLifecycle::new("Alice");
        lifecycle.close();
        assert!(lifecycle.is_over());
        assert_eq!(
            lifecycle.admit("Bob"),
            LifecycleEvent::Rejected(RejectReason::SessionOver)
        );
        assert_eq!(lifecycle.leave(), None);
    }
}
