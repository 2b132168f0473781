//! Per-table subscriber set: player-bound connections and spectators.

use playnine_protocol::{ActionError, ErrorMsg};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound frames are pre-serialized JSON text; redaction makes every
/// observer's view identical, so each snapshot is serialized once.
pub type Outbound = mpsc::UnboundedSender<String>;

struct SubConn {
    player_id: Option<Uuid>,
    tx: Outbound,
}

#[derive(Default)]
pub struct Subscribers {
    conns: HashMap<u64, SubConn>,
}

impl Subscribers {
    pub fn new() -> Self {
        Subscribers {
            conns: HashMap::new(),
        }
    }

    /// True when `player_id` already has a live connection. A player may
    /// hold at most one; a second join is refused as `already_connected`.
    pub fn has_player(&self, player_id: Uuid) -> bool {
        self.conns
            .values()
            .any(|c| c.player_id == Some(player_id))
    }

    pub fn insert(&mut self, conn_id: u64, player_id: Option<Uuid>, tx: Outbound) {
        self.conns.insert(conn_id, SubConn { player_id, tx });
    }

    /// Remove a connection, returning the player id it was bound to.
    pub fn remove(&mut self, conn_id: u64) -> Option<Uuid> {
        self.conns.remove(&conn_id).and_then(|c| c.player_id)
    }

    /// The actor bound to a connection; spectators have none.
    pub fn player_of(&self, conn_id: u64) -> Option<Uuid> {
        self.conns.get(&conn_id).and_then(|c| c.player_id)
    }

    /// Fan one frame out to every subscriber. Connections whose writer has
    /// gone away are dropped here; their reader task cleans up separately.
    pub fn broadcast(&mut self, frame: &str) {
        self.conns
            .retain(|conn_id, conn| match conn.tx.send(frame.to_string()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(conn_id, "dropping subscriber with closed channel");
                    false
                }
            });
    }

    pub fn send_to(&self, conn_id: u64, frame: String) {
        if let Some(conn) = self.conns.get(&conn_id) {
            let _ = conn.tx.send(frame);
        }
    }

    /// Rejections go only to the connection that sent the intent.
    pub fn send_error(&self, conn_id: u64, err: &ActionError) {
        let msg = ErrorMsg::from_action(err);
        match serde_json::to_string(&msg) {
            Ok(frame) => self.send_to(conn_id, frame),
            Err(e) => tracing::error!(conn_id, error = %e, "failed to encode error frame"),
        }
    }
}
