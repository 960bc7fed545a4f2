//! Connected sessions, keyed by id.
//!
//! This module handles:
//! - Session lifecycle (connect, disconnect, teardown of closed sessions)
//! - Capacity enforcement and address lookup for incoming datagrams
//! - Routing decoded intents to the owning session's queue
//!
//! Sessions are kept in id order so every tick visits them in the same order.

use crate::config::ServerConfig;
use crate::entity::EntityId;
use crate::session::{Intent, Session};
use log::info;
use std::collections::BTreeMap;
use std::net::SocketAddr;

pub struct SessionManager {
    /// Connected sessions indexed by their unique ID
    sessions: BTreeMap<u32, Session>,
    /// Next available session ID for new connections
    next_session_id: u32,
    /// Maximum number of concurrent sessions allowed
    max_clients: usize,
}

impl SessionManager {
    /// Session IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_session_id: 1,
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_clients
    }

    /// Attempts to register a new connection.
    ///
    /// Returns Some(session_id) if successful, None if the server is at capacity.
    pub fn add_session(
        &mut self,
        addr: SocketAddr,
        entity_id: EntityId,
        trusted: bool,
        config: &ServerConfig,
        now_ms: u64,
    ) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        let session = Session::new(session_id, addr, entity_id, trusted, config, now_ms);
        info!(
            "Client {} connected from {}{}",
            session_id,
            addr,
            if trusted { " (trusted)" } else { "" }
        );
        self.sessions.insert(session_id, session);

        Some(session_id)
    }

    /// Removes a session and hands it back for final cleanup.
    pub fn remove_session(&mut self, session_id: &u32) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        info!("Client {} disconnected", session.id);
        Some(session)
    }

    /// Used to associate incoming datagrams with existing sessions.
    pub fn find_session_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, session_id: u32) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn get_mut(&mut self, session_id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&session_id)
    }

    /// Queues an intent on a session. Returns false if the session is unknown
    /// or the intent was dropped.
    pub fn enqueue(&mut self, session_id: u32, intent: Intent, limit: usize) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(session) => session.enqueue(intent, limit),
            None => false,
        }
    }

    /// Sessions in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// IDs of sessions marked for teardown.
    pub fn closed_sessions(&self) -> Vec<u32> {
        self.sessions
            .values()
            .filter(|session| session.is_closing())
            .map(|session| session.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
