//! Persisted node state: identity keypair, known peer connections and a
//! display name, saved to and loaded from a JSON file between runs.

use serde::{Deserialize, Serialize};
use shared::types::PeerInfo;
use shared::{KeyPair, Result};
use std::path::Path;

/// What a node keeps on disk between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    pub connection: String,
    pub keypair: KeyPair,
    pub known_peers: Vec<PeerInfo>,
}

impl NodeState {
    #[must_use]
    pub fn new(name: String, connection: String, keypair: KeyPair) -> Self {
        Self {
            name,
            connection,
            keypair,
            known_peers: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the state cannot be
    /// serialized.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not contain valid
    /// node state.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
