//! Sharing one connection between several sessions.
//!
//! A [`Multiplexer`] owns the participants riding one connection, keyed by
//! their local URI, and routes inbound units by `To-Path`. A
//! [`ConnectionPool`] owns the multiplexers, keyed by remote endpoint. The
//! first registration for an endpoint creates its multiplexer and the last
//! departure tears it down; both happen under the pool's shard lock, so a
//! registration can never land in a multiplexer that is being removed.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use log::{debug, info};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::parser::ChunkPiece;

/// Errors raised by [`ConnectionPool`] registration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MuxError {
    /// The local URI already has a participant on this connection.
    #[error("participant already registered: remote={remote}, local={local}")]
    Duplicate {
        /// Remote endpoint.
        remote: String,
        /// Local URI.
        local: String,
    },
}

/// Participants sharing one connection.
#[derive(Debug)]
pub struct Multiplexer<P> {
    remote: String,
    participants: DashMap<String, P>,
    shutdown: CancellationToken,
}

impl<P: Clone> Multiplexer<P> {
    fn new(remote: &str) -> Self {
        Self {
            remote: remote.to_owned(),
            participants: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Remote endpoint of the connection.
    #[must_use]
    pub fn remote(&self) -> &str { &self.remote }

    /// Participant addressed by `to_path`.
    #[must_use]
    pub fn dispatch(&self, to_path: &str) -> Option<P> {
        self.participants.get(to_path).map(|entry| entry.value().clone())
    }

    /// Participant addressed by the `To-Path` of `piece`.
    #[must_use]
    pub fn dispatch_piece(&self, piece: &ChunkPiece) -> Option<P> {
        piece
            .head()
            .headers
            .to_path
            .as_deref()
            .and_then(|to_path| self.dispatch(to_path))
    }

    /// Local URIs currently registered.
    #[must_use]
    pub fn local_paths(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of participants.
    #[must_use]
    pub fn len(&self) -> usize { self.participants.len() }

    /// Whether no participant is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.participants.is_empty() }

    /// Token cancelled once the last participant leaves.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken { self.shutdown.clone() }
}

/// Multiplexers keyed by remote endpoint.
#[derive(Debug)]
pub struct ConnectionPool<P> {
    connections: DashMap<String, Arc<Multiplexer<P>>>,
}

impl<P> Default for ConnectionPool<P> {
    fn default() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }
}

impl<P: Clone> ConnectionPool<P> {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Add `participant` under `local` on the connection to `remote`,
    /// creating the multiplexer if this is the first registrant.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Duplicate`] if `local` is already registered on
    /// that connection.
    pub fn register(
        &self,
        remote: &str,
        local: &str,
        participant: P,
    ) -> Result<Arc<Multiplexer<P>>, MuxError> {
        let mux = self
            .connections
            .entry(remote.to_owned())
            .or_insert_with(|| {
                info!("multiplexer created: remote={remote}");
                Arc::new(Multiplexer::new(remote))
            });
        match mux.participants.entry(local.to_owned()) {
            Entry::Occupied(_) => Err(MuxError::Duplicate {
                remote: remote.to_owned(),
                local: local.to_owned(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(participant);
                debug!("participant registered: remote={remote}, local={local}");
                Ok(Arc::clone(&mux))
            }
        }
    }

    /// Remove the participant registered under `local`, tearing the
    /// multiplexer down when it was the last one.
    pub fn unregister(&self, remote: &str, local: &str) -> Option<P> {
        let mut removed = None;
        let emptied = self.connections.remove_if(remote, |_, mux| {
            removed = mux.participants.remove(local).map(|(_, participant)| participant);
            mux.is_empty()
        });
        if removed.is_some() {
            debug!("participant unregistered: remote={remote}, local={local}");
        }
        if let Some((_, mux)) = emptied {
            mux.shutdown.cancel();
            info!("multiplexer removed: remote={remote}");
        }
        removed
    }

    /// Multiplexer for `remote`, if any participant is registered.
    #[must_use]
    pub fn get(&self, remote: &str) -> Option<Arc<Multiplexer<P>>> {
        self.connections
            .get(remote)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Participant registered under `to_path` on the connection to `remote`.
    #[must_use]
    pub fn dispatch(&self, remote: &str, to_path: &str) -> Option<P> {
        self.get(remote).and_then(|mux| mux.dispatch(to_path))
    }

    /// Number of live multiplexers.
    #[must_use]
    pub fn len(&self) -> usize { self.connections.len() }

    /// Whether the pool holds no multiplexer.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.connections.is_empty() }
}
