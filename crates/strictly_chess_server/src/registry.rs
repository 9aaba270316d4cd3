//! Live connections per game and message fan-out.

use crate::error::SessionError;
use crate::messages::ServerMessage;
use crate::session::GameId;
use crate::transport::{ConnectionId, Transport, TransportError};
use derive_getters::Getters;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Which of a game's connections receive a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Addressing {
    /// Only the connection that sent the triggering command.
    Root,
    /// Every other connection on the game.
    NotRoot,
    /// Every connection on the game, root included.
    Everyone,
}

/// A client attached to a game.
#[derive(Debug, Clone)]
pub struct Connection {
    transport: Arc<dyn Transport>,
    username: String,
}

impl Connection {
    /// Pairs a transport with the user behind it.
    pub fn new(transport: Arc<dyn Transport>, username: impl Into<String>) -> Self {
        Self {
            transport,
            username: username.into(),
        }
    }

    /// Connection identity.
    pub fn id(&self) -> ConnectionId {
        self.transport.id()
    }

    /// User behind the connection.
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Outcome of one delivery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
pub struct DeliveryReport {
    /// Sends attempted on open connections.
    attempted: usize,
    /// Sends that were queued successfully.
    delivered: usize,
    /// Closed connections dropped from the registry during the pass.
    pruned: usize,
    /// Open connections whose send failed.
    failures: Vec<(ConnectionId, TransportError)>,
}

impl DeliveryReport {
    fn record(&mut self, id: ConnectionId, result: Result<(), TransportError>) {
        self.attempted += 1;
        match result {
            Ok(()) => self.delivered += 1,
            Err(err) => {
                warn!(connection = %id, error = %err, "Delivery failed");
                self.failures.push((id, err));
            }
        }
    }
}

type ConnectionSet = Arc<Mutex<Vec<Connection>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of live connections keyed by game.
///
/// The outer map lock is only held long enough to find a game's set; each
/// set has its own lock, held for the whole of a mutation or delivery pass
/// so the two never interleave. Dead connections are not detected
/// proactively: a delivery pass that finds a closed transport skips it and
/// drops it from the set.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    games: Mutex<HashMap<GameId, ConnectionSet>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self::default()
    }

    fn set_for(&self, game_id: GameId) -> Option<ConnectionSet> {
        lock(&self.games).get(&game_id).cloned()
    }

    /// Attaches `connection` to `game_id`, replacing any earlier entry for
    /// the same transport.
    #[instrument(skip(self, connection), fields(connection = %connection.id(), username = %connection.username()))]
    pub fn add(&self, game_id: GameId, connection: Connection) {
        let set = lock(&self.games).entry(game_id).or_default().clone();
        let mut connections = lock(&set);
        connections.retain(|existing| existing.id() != connection.id());
        connections.push(connection);
        debug!(count = connections.len(), "Connection added");
    }

    /// Detaches a connection. Absent connections are ignored.
    #[instrument(skip(self))]
    pub fn remove(&self, game_id: GameId, connection_id: ConnectionId) {
        let Some(set) = self.set_for(game_id) else {
            debug!("No connections registered for game");
            return;
        };
        let mut connections = lock(&set);
        let before = connections.len();
        connections.retain(|existing| existing.id() != connection_id);
        debug!(removed = before - connections.len(), "Connection removed");
    }

    /// Number of connections currently registered for `game_id`, closed
    /// ones not yet pruned included.
    pub fn connection_count(&self, game_id: GameId) -> usize {
        self.set_for(game_id).map_or(0, |set| lock(&set).len())
    }

    /// Sends `message` to the connections `addressing` selects.
    ///
    /// A failed send is logged and recorded in the report; the remaining
    /// connections are still served.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] only if the message cannot be encoded.
    #[instrument(skip(self, root, message), fields(root = %root.id()))]
    pub fn deliver(
        &self,
        addressing: Addressing,
        game_id: GameId,
        root: &dyn Transport,
        message: &ServerMessage,
    ) -> Result<DeliveryReport, SessionError> {
        if addressing == Addressing::Root {
            return self.deliver_direct(root, message);
        }

        let text = serde_json::to_string(message)?;
        let mut report = DeliveryReport::default();
        let Some(set) = self.set_for(game_id) else {
            debug!("No connections registered for game");
            return Ok(report);
        };
        let mut connections = lock(&set);
        let before = connections.len();
        connections.retain(|connection| {
            if !connection.transport.is_open() {
                debug!(connection = %connection.id(), "Pruning closed connection");
                return false;
            }
            if addressing == Addressing::NotRoot && connection.id() == root.id() {
                return true;
            }
            report.record(connection.id(), connection.transport.send(&text));
            true
        });
        report.pruned = before - connections.len();

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned,
            "Delivery pass finished"
        );
        Ok(report)
    }

    /// Sends `message` to `root` alone, whether or not it is registered.
    ///
    /// Used for replies to commands that never named a valid game.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] only if the message cannot be encoded.
    #[instrument(skip(self, root, message), fields(root = %root.id()))]
    pub fn deliver_direct(
        &self,
        root: &dyn Transport,
        message: &ServerMessage,
    ) -> Result<DeliveryReport, SessionError> {
        let text = serde_json::to_string(message)?;
        let mut report = DeliveryReport::default();
        if root.is_open() {
            report.record(root.id(), root.send(&text));
        } else {
            debug!("Root connection already closed");
        }
        Ok(report)
    }

    /// Drops every registration. Called at shutdown.
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let mut games = lock(&self.games);
        let total: usize = games.values().map(|set| lock(set).len()).sum();
        games.clear();
        info!(connections = total, "Connection registry cleared");
    }
}
