//! Aegis-Cowork: Session Hub
//!
//! The concurrency model behind real-time cowork sessions: per-session
//! connection sets, presence, per-user typing flags and artifact versioning.
//! Transport is abstract — each connection is a bounded outbound channel the
//! WebSocket layer drains. Broadcasts go to every connection except the
//! sender, are FIFO per sender, and a connection whose send fails is
//! dropped and reaped in the same pass.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Outbound channel depth per connection.
const OUTBOUND_BUFFER: usize = 64;

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Message { content: String },
    Typing { is_typing: bool },
    ArtifactUpdate { artifact: Value },
    StateSync,
    Ping,
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Message {
        user_id: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    Typing {
        user_id: String,
        is_typing: bool,
    },
    PresenceUpdate {
        users: Vec<String>,
    },
    ArtifactUpdate {
        user_id: String,
        draft_version: u64,
        artifact: Value,
    },
    StateSnapshot(CoworkState),
    Pong,
}

/// Session state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoworkState {
    pub session_id: String,
    pub participants: Vec<String>,
    pub draft_version: u64,
    pub artifact: Value,
    pub edited_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Connection handle returned by [`SessionHub::connect`].
pub struct Connection {
    pub id: u64,
    pub outbound: mpsc::Receiver<ServerMessage>,
}

struct Member {
    user_id: String,
    tx: mpsc::Sender<ServerMessage>,
}

#[derive(Default)]
struct Session {
    members: HashMap<u64, Member>,
    typing: HashMap<String, bool>,
    draft_version: u64,
    artifact: Value,
    edited_by: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl Session {
    fn presence(&self) -> Vec<String> {
        let mut users: Vec<String> = self.members.values().map(|m| m.user_id.clone()).collect();
        users.sort();
        users.dedup();
        users
    }

    fn snapshot(&self, session_id: &str) -> CoworkState {
        CoworkState {
            session_id: session_id.to_string(),
            participants: self.presence(),
            draft_version: self.draft_version,
            artifact: self.artifact.clone(),
            edited_by: self.edited_by.clone(),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

/// The hub. One per process; sessions are created on first join.
pub struct SessionHub {
    sessions: RwLock<HashMap<String, Session>>,
    next_connection_id: AtomicU64,
}

impl SessionHub {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Join a session. Presence is broadcast to everyone (including the
    /// new connection).
    pub fn connect(&self, session_id: &str, user_id: &str) -> Connection {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);

        {
            let mut sessions = self.sessions.write();
            let session = sessions.entry(session_id.to_string()).or_default();
            session.members.insert(
                id,
                Member {
                    user_id: user_id.to_string(),
                    tx,
                },
            );
        }

        tracing::info!(session_id = %session_id, user_id = %user_id, connection = id, "Cowork join");
        self.broadcast_presence(session_id);
        Connection { id, outbound: rx }
    }

    /// Leave a session: removed from all indexes, presence re-broadcast.
    pub fn disconnect(&self, session_id: &str, connection_id: u64) {
        let removed_user = {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            let removed = session.members.remove(&connection_id).map(|m| m.user_id);
            if let Some(user_id) = &removed {
                // Clear the typing flag when the user's last connection goes
                if !session.members.values().any(|m| &m.user_id == user_id) {
                    session.typing.remove(user_id);
                }
            }
            if session.members.is_empty() {
                sessions.remove(session_id);
                None
            } else {
                removed
            }
        };

        if removed_user.is_some() {
            self.broadcast_presence(session_id);
        }
    }

    /// Handle one client message on a connection.
    pub fn handle_message(&self, session_id: &str, connection_id: u64, message: ClientMessage) {
        match message {
            ClientMessage::Ping => {
                self.send_to(session_id, connection_id, ServerMessage::Pong);
            }
            ClientMessage::StateSync => {
                let snapshot = {
                    let sessions = self.sessions.read();
                    sessions.get(session_id).map(|s| s.snapshot(session_id))
                };
                if let Some(snapshot) = snapshot {
                    self.send_to(
                        session_id,
                        connection_id,
                        ServerMessage::StateSnapshot(snapshot),
                    );
                }
            }
            ClientMessage::Message { content } => {
                let Some(user_id) = self.user_of(session_id, connection_id) else {
                    return;
                };
                self.broadcast_except(
                    session_id,
                    Some(connection_id),
                    ServerMessage::Message {
                        user_id,
                        content,
                        timestamp: Utc::now(),
                    },
                );
            }
            ClientMessage::Typing { is_typing } => {
                let Some(user_id) = self.user_of(session_id, connection_id) else {
                    return;
                };
                {
                    let mut sessions = self.sessions.write();
                    if let Some(session) = sessions.get_mut(session_id) {
                        session.typing.insert(user_id.clone(), is_typing);
                    }
                }
                self.broadcast_except(
                    session_id,
                    Some(connection_id),
                    ServerMessage::Typing { user_id, is_typing },
                );
            }
            ClientMessage::ArtifactUpdate { artifact } => {
                let Some(user_id) = self.user_of(session_id, connection_id) else {
                    return;
                };
                let draft_version = {
                    let mut sessions = self.sessions.write();
                    let Some(session) = sessions.get_mut(session_id) else {
                        return;
                    };
                    session.draft_version += 1;
                    session.artifact = artifact.clone();
                    session.edited_by = Some(user_id.clone());
                    session.updated_at = Some(Utc::now());
                    session.draft_version
                };
                self.broadcast_except(
                    session_id,
                    Some(connection_id),
                    ServerMessage::ArtifactUpdate {
                        user_id,
                        draft_version,
                        artifact,
                    },
                );
            }
        }
    }

    /// Current session snapshot (None when nobody is connected).
    pub fn state(&self, session_id: &str) -> Option<CoworkState> {
        self.sessions
            .read()
            .get(session_id)
            .map(|s| s.snapshot(session_id))
    }

    /// Whether a user currently shows as typing.
    pub fn is_typing(&self, session_id: &str, user_id: &str) -> bool {
        self.sessions
            .read()
            .get(session_id)
            .and_then(|s| s.typing.get(user_id).copied())
            .unwrap_or(false)
    }

    fn user_of(&self, session_id: &str, connection_id: u64) -> Option<String> {
        self.sessions
            .read()
            .get(session_id)?
            .members
            .get(&connection_id)
            .map(|m| m.user_id.clone())
    }

    fn send_to(&self, session_id: &str, connection_id: u64, message: ServerMessage) {
        let failed = {
            let sessions = self.sessions.read();
            let Some(member) = sessions
                .get(session_id)
                .and_then(|s| s.members.get(&connection_id))
            else {
                return;
            };
            member.tx.try_send(message).is_err()
        };
        if failed {
            self.disconnect(session_id, connection_id);
        }
    }

    fn broadcast_presence(&self, session_id: &str) {
        let users = {
            let sessions = self.sessions.read();
            let Some(session) = sessions.get(session_id) else {
                return;
            };
            session.presence()
        };
        self.broadcast_except(session_id, None, ServerMessage::PresenceUpdate { users });
    }

    /// Broadcast, skipping `except`. Dead connections are reaped in the
    /// same pass and presence is re-broadcast afterwards.
    fn broadcast_except(
        &self,
        session_id: &str,
        except: Option<u64>,
        message: ServerMessage,
    ) {
        let dead: Vec<u64> = {
            let sessions = self.sessions.read();
            let Some(session) = sessions.get(session_id) else {
                return;
            };
            session
                .members
                .iter()
                .filter(|(id, _)| Some(**id) != except)
                .filter(|(_, member)| member.tx.try_send(message.clone()).is_err())
                .map(|(id, _)| *id)
                .collect()
        };

        for connection_id in dead {
            tracing::debug!(session_id = %session_id, connection = connection_id, "Reaping dead connection");
            self.disconnect(session_id, connection_id);
        }
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(connection: &mut Connection) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = connection.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_presence_on_join_and_leave() {
        let hub = SessionHub::new();
        let mut alice = hub.connect("s1", "alice");
        let mut bob = hub.connect("s1", "bob");

        let seen = drain(&mut alice);
        let last_presence = seen
            .iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::PresenceUpdate { users } => Some(users.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_presence, vec!["alice", "bob"]);

        hub.disconnect("s1", bob.id);
        drain(&mut bob);
        let after = drain(&mut alice);
        assert!(matches!(
            after.last(),
            Some(ServerMessage::PresenceUpdate { users }) if users == &vec!["alice".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let hub = SessionHub::new();
        let mut alice = hub.connect("s1", "alice");
        let mut bob = hub.connect("s1", "bob");
        drain(&mut alice);
        drain(&mut bob);

        hub.handle_message(
            "s1",
            alice.id,
            ClientMessage::Message {
                content: "draft looks good".into(),
            },
        );

        let bob_saw = drain(&mut bob);
        assert!(matches!(
            &bob_saw[0],
            ServerMessage::Message { user_id, content, .. }
                if user_id == "alice" && content == "draft looks good"
        ));
        assert!(drain(&mut alice).is_empty());
    }

    #[tokio::test]
    async fn test_ping_pong_and_state_sync() {
        let hub = SessionHub::new();
        let mut alice = hub.connect("s1", "alice");
        drain(&mut alice);

        hub.handle_message("s1", alice.id, ClientMessage::Ping);
        assert!(matches!(drain(&mut alice)[0], ServerMessage::Pong));

        hub.handle_message("s1", alice.id, ClientMessage::StateSync);
        let messages = drain(&mut alice);
        assert!(matches!(
            &messages[0],
            ServerMessage::StateSnapshot(state) if state.session_id == "s1"
        ));
    }

    #[tokio::test]
    async fn test_artifact_update_bumps_version() {
        let hub = SessionHub::new();
        let alice = hub.connect("s1", "alice");
        let mut bob = hub.connect("s1", "bob");
        drain(&mut bob);

        hub.handle_message(
            "s1",
            alice.id,
            ClientMessage::ArtifactUpdate {
                artifact: json!({"title": "Care plan v2"}),
            },
        );

        let state = hub.state("s1").unwrap();
        assert_eq!(state.draft_version, 1);
        assert_eq!(state.edited_by.as_deref(), Some("alice"));

        let bob_saw = drain(&mut bob);
        assert!(matches!(
            &bob_saw[0],
            ServerMessage::ArtifactUpdate { draft_version: 1, user_id, .. } if user_id == "alice"
        ));
    }

    #[tokio::test]
    async fn test_typing_flags() {
        let hub = SessionHub::new();
        let alice = hub.connect("s1", "alice");
        let _bob = hub.connect("s1", "bob");

        hub.handle_message("s1", alice.id, ClientMessage::Typing { is_typing: true });
        assert!(hub.is_typing("s1", "alice"));

        hub.handle_message("s1", alice.id, ClientMessage::Typing { is_typing: false });
        assert!(!hub.is_typing("s1", "alice"));
    }

    #[tokio::test]
    async fn test_dead_connection_reaped_on_broadcast() {
        let hub = SessionHub::new();
        let alice = hub.connect("s1", "alice");
        let bob = hub.connect("s1", "bob");

        // Bob's receiver goes away; his channel fills and then fails
        drop(bob.outbound);

        for n in 0..3 {
            hub.handle_message(
                "s1",
                alice.id,
                ClientMessage::Message {
                    content: format!("msg {n}"),
                },
            );
        }

        let state = hub.state("s1").unwrap();
        assert_eq!(state.participants, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_fifo_per_sender() {
        let hub = SessionHub::new();
        let alice = hub.connect("s1", "alice");
        let mut bob = hub.connect("s1", "bob");
        drain(&mut bob);

        for n in 0..5 {
            hub.handle_message(
                "s1",
                alice.id,
                ClientMessage::Message {
                    content: format!("{n}"),
                },
            );
        }

        let contents: Vec<String> = drain(&mut bob)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Message { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["0", "1", "2", "3", "4"]);
    }
}
