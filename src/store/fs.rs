use super::{CredentialStore, Credentials};
use crate::{error::StoreError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// File name of the credential record inside a session directory.
const CREDS_FILE: &str = "creds.json";

/// Directory-backed credential store.
///
/// Each session lives in `<root>/<name>_sessions/creds.json`; wiping a
/// session removes the whole directory, matching the destructive logout
/// semantics of the transport.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(format!("{session}_sessions"))
    }

    fn creds_path(&self, session: &str) -> PathBuf {
        self.session_dir(session).join(CREDS_FILE)
    }
}

#[async_trait]
impl CredentialStore for FsStore {
    async fn load(&self, session: &str) -> Result<Option<Credentials>> {
        let path = self.creds_path(session);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Load(format!("{}: {e}", path.display())).into()),
        };
        let credentials = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Load(format!("{}: {e}", path.display())))?;
        Ok(Some(credentials))
    }

    async fn save(&self, session: &str, credentials: &Credentials) -> Result<()> {
        let dir = self.session_dir(session);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Save(format!("{}: {e}", dir.display())))?;
        let bytes = serde_json::to_vec_pretty(credentials)
            .map_err(|e| StoreError::Save(e.to_string()))?;
        let path = dir.join(CREDS_FILE);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::Save(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    async fn wipe(&self, session: &str) -> Result<()> {
        let dir = self.session_dir(session);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Wipe(format!("{}: {e}", dir.display())).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Jid;

    #[tokio::test]
    async fn fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        assert!(store.load("bot").await.unwrap().is_none());

        let mut creds = Credentials::default();
        creds.id = Some(Jid::new("628555", "s.whatsapp.net"));
        creds.identity_key = Some([3u8; 32]);
        store.save("bot", &creds).await.unwrap();

        let loaded = store.load("bot").await.unwrap().unwrap();
        assert_eq!(loaded.id.unwrap().to_string(), "628555@s.whatsapp.net");
        assert_eq!(loaded.identity_key, Some([3u8; 32]));
    }

    #[tokio::test]
    async fn fs_store_wipe_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store.save("bot", &Credentials::default()).await.unwrap();
        assert!(dir.path().join("bot_sessions").exists());

        store.wipe("bot").await.unwrap();
        assert!(!dir.path().join("bot_sessions").exists());
        assert!(store.load("bot").await.unwrap().is_none());

        // Idempotent.
        store.wipe("bot").await.unwrap();
    }

    #[tokio::test]
    async fn fs_store_corrupt_record_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        let session_dir = dir.path().join("bot_sessions");
        std::fs::create_dir_all(&session_dir).unwrap();
        std::fs::write(session_dir.join("creds.json"), b"not json").unwrap();

        assert!(store.load("bot").await.is_err());
    }
}
