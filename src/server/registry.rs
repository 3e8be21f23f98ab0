use std::{net::SocketAddr, sync::Arc};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::utils::ProtocolError;

/// Timestamp layout used in `status` replies.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lifecycle record for one connection. Never removed from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Sequential name, e.g. `Client01`.
    pub name: String,
    /// Socket address of the peer.
    pub address: SocketAddr,
    /// When the connection was admitted.
    pub connected_at: DateTime<Local>,
    /// When the session ended; `None` while it is active.
    pub disconnected_at: Option<DateTime<Local>>,
}

impl ClientRecord {
    pub fn is_active(&self) -> bool {
        self.disconnected_at.is_none()
    }

    /// Renders `name: connectedAt - (disconnectedAt | Active)`.
    pub fn status_line(&self) -> String {
        let until = match self.disconnected_at {
            Some(at) => at.format(TIMESTAMP_FORMAT).to_string(),
            None => "Active".to_string(),
        };
        format!(
            "{}: {} - {}",
            self.name,
            self.connected_at.format(TIMESTAMP_FORMAT),
            until
        )
    }
}

/// Formats the name handed to the `n`th client.
pub fn client_name(n: usize) -> String {
    format!("Client{:02}", n)
}

/// Process-wide table of every connection seen, in admission order.
///
/// Cloning shares the same table. All access goes through one lock, which is
/// never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    entries: Arc<Mutex<Vec<ClientRecord>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record for a freshly admitted connection.
    ///
    /// # Errors
    /// Returns `ProtocolError::DuplicateClient` if `name` is already taken.
    pub fn register(
        &self,
        name: &str,
        address: SocketAddr,
        now: DateTime<Local>,
    ) -> Result<(), ProtocolError> {
        let mut entries = self.entries.lock();
        Self::insert(&mut entries, name, address, now)
    }

    fn insert(
        entries: &mut Vec<ClientRecord>,
        name: &str,
        address: SocketAddr,
        now: DateTime<Local>,
    ) -> Result<(), ProtocolError> {
        if entries.iter().any(|r| r.name == name) {
            return Err(ProtocolError::DuplicateClient(name.to_string()));
        }
        entries.push(ClientRecord {
            name: name.to_string(),
            address,
            connected_at: now,
            disconnected_at: None,
        });
        debug!("Registered {} from {}", name, address);
        Ok(())
    }

    /// Stamps the disconnection time. No-op for unknown or already closed names.
    pub fn mark_disconnected(&self, name: &str, now: DateTime<Local>) {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|r| r.name == name) {
            Some(record) if record.disconnected_at.is_none() => {
                record.disconnected_at = Some(now);
                debug!("Marked {} disconnected", name);
            }
            Some(_) => {}
            None => warn!("Disconnect for unknown client {}", name),
        }
    }

    /// Copies every record out, in admission order.
    pub fn snapshot(&self) -> Vec<ClientRecord> {
        self.entries.lock().clone()
    }

    /// Counts records without a disconnection time.
    pub fn count_active(&self) -> usize {
        self.entries.lock().iter().filter(|r| r.is_active()).count()
    }

    /// Name the next registration will receive.
    pub fn next_name(&self) -> String {
        client_name(self.entries.lock().len() + 1)
    }

    /// Total number of records, active or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Capacity check, naming and registration under one lock acquisition.
    ///
    /// Returns the assigned name, or `None` when `max_active` sessions are
    /// already active. A refused attempt leaves the table untouched.
    pub fn admit(
        &self,
        address: SocketAddr,
        now: DateTime<Local>,
        max_active: usize,
    ) -> Option<String> {
        let mut entries = self.entries.lock();
        let active = entries.iter().filter(|r| r.is_active()).count();
        if active >= max_active {
            return None;
        }
        let name = client_name(entries.len() + 1);
        // Names derive from the entry count and records are never removed, so
        // this can't collide.
        Self::insert(&mut entries, &name, address, now).ok()?;
        Some(name)
    }

    /// Renders the `status` reply.
    pub fn render_status(&self) -> String {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return "No clients registered.".to_string();
        }
        snapshot
            .iter()
            .map(ClientRecord::status_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
