use super::{JoinGrant, Registry, RegistryError, RoomRegistration};
use crate::protocol::{RelayEnvelope, RelayPayload, RemoteInput};
use crate::session::{PlayerIdentity, Room, RoomStatus};
use crate::snapshot::StateSnapshot;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;

/// Registry client for the matchmaking service's JSON-over-HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
    base_url: String,
    control_timeout: Duration,
    relay_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRoom {
    #[serde(alias = "code")]
    room_code: String,
    #[serde(alias = "player_name", alias = "host")]
    host_name: String,
    host_ip: Option<String>,
    public_ip: Option<String>,
    host_port: u16,
    status: Option<RoomStatus>,
    players: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RoomReply {
    room: WireRoom,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JoinReply {
    public_ip: Option<String>,
    host_ip: Option<String>,
    host_port: u16,
    player_name: Option<String>,
    players: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StateReply {
    game_state: Option<StateSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InputReply {
    inputs: Vec<RemoteInput>,
}

fn parse_ip(field: &str, raw: Option<&str>) -> Option<IpAddr> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(ip) => Some(ip),
        Err(_) => {
            warn!("Ignoring unparsable {} '{}' from registry", field, raw);
            None
        }
    }
}

fn classify(err: reqwest::Error) -> RegistryError {
    if err.is_timeout() {
        RegistryError::Timeout
    } else if err.is_decode() {
        RegistryError::Decode(err.to_string())
    } else {
        RegistryError::Unreachable(err.to_string())
    }
}

/// Maps a service-side error string onto the taxonomy.
fn classify_rejection(error: &str) -> RegistryError {
    let lower = error.to_ascii_lowercase();
    if lower.contains("full") {
        RegistryError::Full
    } else if lower.contains("not found") || lower.contains("does not exist") {
        RegistryError::NotFound
    } else if lower.contains("already") {
        RegistryError::CodeInUse
    } else {
        RegistryError::Rejected(error.to_string())
    }
}

/// Checks the `success` flag and decodes the rest of the reply body.
fn parse_reply<T: DeserializeOwned>(status: u16, body: Value) -> Result<T, RegistryError> {
    let ok_status = (200..300).contains(&status);
    let success = body
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(ok_status);

    if !success {
        return Err(match body.get("error").and_then(Value::as_str) {
            Some(error) => classify_rejection(error),
            None if ok_status => RegistryError::Rejected("request refused".to_string()),
            None => RegistryError::Status(status),
        });
    }
    if !ok_status {
        return Err(RegistryError::Status(status));
    }
    serde_json::from_value(body).map_err(|e| RegistryError::Decode(e.to_string()))
}

fn room_from_wire(wire: WireRoom) -> Option<Room> {
    let host_local_addr = parse_ip("host_ip", wire.host_ip.as_deref())
        .or_else(|| parse_ip("public_ip", wire.public_ip.as_deref()))?;
    let host_name = if wire.host_name.is_empty() {
        wire.players.first().cloned().unwrap_or_default()
    } else {
        wire.host_name
    };

    let mut participants = vec![PlayerIdentity::host(host_name.clone())];
    participants.extend(wire.players.iter().skip(1).take(1).map(PlayerIdentity::remote));

    Some(Room {
        code: wire.room_code,
        host_name,
        host_public_addr: parse_ip("public_ip", wire.public_ip.as_deref()),
        host_local_addr,
        host_port: wire.host_port,
        status: wire.status.unwrap_or(RoomStatus::Waiting),
        participants,
    })
}

impl HttpRegistry {
    pub fn new(
        base_url: &str,
        control_timeout: Duration,
        relay_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .build()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            control_timeout,
            relay_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request; a 404 becomes `Ok(None)`.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Option<T>, RegistryError> {
        let response = request.timeout(timeout).send().await.map_err(classify)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Err(RegistryError::Timeout),
            Err(e) if status.is_success() => return Err(RegistryError::Decode(e.to_string())),
            Err(_) => return Err(RegistryError::Status(status.as_u16())),
        };
        parse_reply(status.as_u16(), body).map(Some)
    }

    async fn post_control<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, RegistryError> {
        let request = self.client.post(self.url(path)).json(body);
        self.send(request, self.control_timeout)
            .await?
            .ok_or(RegistryError::NotFound)
    }
}

impl Registry for HttpRegistry {
    async fn health(&self) -> Result<(), RegistryError> {
        let request = self.client.get(self.url("/health"));
        match self.send::<IgnoredAny>(request, self.control_timeout).await? {
            Some(_) => Ok(()),
            None => Err(RegistryError::Status(404)),
        }
    }

    async fn create_room(&self, registration: &RoomRegistration) -> Result<(), RegistryError> {
        let body = json!({
            "room_code": registration.code,
            "player_name": registration.host_name,
            "host_ip": registration.host_local_addr.to_string(),
            "public_ip": registration.host_public_addr.map(|ip| ip.to_string()),
            "host_port": registration.host_port,
        });
        self.post_control::<IgnoredAny>("/api/create_room", &body)
            .await
            .map(|_| ())
    }

    async fn get_room(&self, code: &str) -> Result<Option<Room>, RegistryError> {
        let request = self.client.get(self.url(&format!("/api/room/{}", code)));
        let reply: Option<RoomReply> = match self.send(request, self.control_timeout).await {
            Err(RegistryError::NotFound) => None,
            other => other?,
        };
        Ok(reply.and_then(|r| room_from_wire(r.room)))
    }

    async fn join_room(&self, code: &str, player_name: &str) -> Result<JoinGrant, RegistryError> {
        let body = json!({
            "room_code": code,
            "player_name": player_name,
        });
        let reply: JoinReply = self.post_control("/api/join_room", &body).await?;
        Ok(JoinGrant {
            host_public_addr: parse_ip("public_ip", reply.public_ip.as_deref()),
            host_local_addr: parse_ip("host_ip", reply.host_ip.as_deref()),
            host_port: reply.host_port,
            player_name: reply
                .player_name
                .unwrap_or_else(|| player_name.to_string()),
            players: reply.players,
        })
    }

    async fn update_room(&self, code: &str, status: RoomStatus) -> Result<(), RegistryError> {
        let body = json!({ "room_code": code, "status": status });
        self.post_control::<IgnoredAny>("/api/update_room", &body)
            .await
            .map(|_| ())
    }

    async fn close_room(&self, code: &str) -> Result<(), RegistryError> {
        let body = json!({ "room_code": code });
        self.post_control::<IgnoredAny>("/api/close_room", &body)
            .await
            .map(|_| ())
    }

    async fn leave_room(&self, code: &str, player_name: &str) -> Result<(), RegistryError> {
        let body = json!({
            "room_code": code,
            "player_name": player_name,
        });
        self.post_control::<IgnoredAny>("/api/leave_room", &body)
            .await
            .map(|_| ())
    }

    async fn push_relay_state(&self, code: &str, snapshot: &StateSnapshot) -> Result<(), RegistryError> {
        let envelope = RelayEnvelope::new(code, RelayPayload::State(snapshot.clone()));
        let request = self
            .client
            .post(self.url("/api/relay/game_state"))
            .json(&envelope);
        self.send::<IgnoredAny>(request, self.relay_timeout)
            .await?
            .map(|_| ())
            .ok_or(RegistryError::NotFound)
    }

    async fn poll_relay_state(&self, code: &str) -> Result<Option<StateSnapshot>, RegistryError> {
        let request = self
            .client
            .get(self.url(&format!("/api/relay/game_state/{}", code)));
        let reply: Option<StateReply> = self.send(request, self.relay_timeout).await?;
        Ok(reply.and_then(|r| r.game_state))
    }

    async fn push_relay_input(&self, code: &str, input: RemoteInput) -> Result<(), RegistryError> {
        let envelope = RelayEnvelope::new(code, RelayPayload::Input(input));
        let request = self.client.post(self.url("/api/relay/input")).json(&envelope);
        self.send::<IgnoredAny>(request, self.relay_timeout)
            .await?
            .map(|_| ())
            .ok_or(RegistryError::NotFound)
    }

    async fn poll_relay_input(&self, code: &str) -> Result<Vec<RemoteInput>, RegistryError> {
        let request = self
            .client
            .get(self.url(&format!("/api/relay/input/{}", code)));
        let reply: Option<InputReply> = self.send(request, self.relay_timeout).await?;
        let inputs = reply.map(|r| r.inputs).unwrap_or_default();
        if !inputs.is_empty() {
            debug!("Relay delivered {} inputs for room {}", inputs.len(), code);
        }
        Ok(inputs)
    }
}
