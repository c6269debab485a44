use super::{CredentialStore, Credentials};
use crate::{error::StoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory credential store (for testing or single-run; not persistent).
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Credentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self, session: &str) -> Result<Option<Credentials>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Load(e.to_string()))?;
        Ok(sessions.get(session).cloned())
    }

    async fn save(&self, session: &str, credentials: &Credentials) -> Result<()> {
        self.sessions
            .write()
            .map_err(|e| StoreError::Save(e.to_string()))?
            .insert(session.to_string(), credentials.clone());
        Ok(())
    }

    async fn wipe(&self, session: &str) -> Result<()> {
        self.sessions
            .write()
            .map_err(|e| StoreError::Wipe(e.to_string()))?
            .remove(session);
        Ok(())
    }
}
