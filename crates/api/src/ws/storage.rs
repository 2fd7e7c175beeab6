use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// A live duplex connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub client_id: String,
    pub mode: String,
    pub connected_at: DateTime<Utc>,
}

/// Tracks all open WebSocket connections by connection ID.
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn add(&self, info: ConnectionInfo) {
        self.connections.insert(info.connection_id.clone(), info);
    }

    pub fn remove(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.connections.remove(connection_id).map(|(_, info)| info)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of open connections per client ID.
    pub fn count_for(&self, client_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|r| r.value().client_id == client_id)
            .count()
    }

    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<ConnectionInfo> = self.connections.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        all
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
