//! Session credential store.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::types::Jid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Credential material for one named bot identity.
///
/// The transport rotates key material over the lifetime of a session and
/// reports each rotation through its event stream; the lifecycle manager
/// persists the updated record here.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Our JID after linking (None if the device was never linked).
    pub id: Option<Jid>,
    pub display_name: Option<String>,
    pub platform: Option<String>,
    /// Noise static key (32 bytes), rotated by the transport.
    #[serde(with = "b64_key", default)]
    pub noise_key: Option<[u8; 32]>,
    /// Long-term identity key (32 bytes).
    #[serde(with = "b64_key", default)]
    pub identity_key: Option<[u8; 32]>,
    pub registration_id: u32,
}

impl Credentials {
    /// Whether this record belongs to a linked device.
    pub fn is_registered(&self) -> bool {
        self.id.is_some()
    }
}

/// Store trait: persist, load, and destructively wipe the credential
/// material for a named session.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load credentials for a session. `None` when the session was never
    /// linked or has been wiped.
    async fn load(&self, session: &str) -> crate::Result<Option<Credentials>>;

    /// Save credentials (after linking or a key rotation).
    async fn save(&self, session: &str, credentials: &Credentials) -> crate::Result<()>;

    /// Destroy all credential material for a session. Wiping a session that
    /// does not exist is not an error.
    async fn wipe(&self, session: &str) -> crate::Result<()>;
}

/// Alias for a shared store (common usage).
pub type CredStore = Arc<dyn CredentialStore>;

/// Serialize optional 32-byte keys as base64 strings.
mod b64_key {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        key: &Option<[u8; 32]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match key {
            Some(k) => serializer.serialize_some(&STANDARD.encode(k)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<[u8; 32]>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(text) => {
                let bytes = STANDARD
                    .decode(text.as_bytes())
                    .map_err(serde::de::Error::custom)?;
                let key: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("key must be 32 bytes"))?;
                Ok(Some(key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_key_roundtrips_as_base64() {
        let mut creds = Credentials::default();
        creds.id = Some(Jid::new("628123", "s.whatsapp.net"));
        creds.noise_key = Some([7u8; 32]);

        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("628123@s.whatsapp.net"));
        // Keys are stored as base64 text, not byte arrays.
        assert!(!json.contains("[7,7"));

        let back: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(back.noise_key, Some([7u8; 32]));
        assert_eq!(back.identity_key, None);
        assert!(back.is_registered());
    }

    #[test]
    fn credentials_reject_short_keys() {
        let json = r#"{"id":null,"display_name":null,"platform":null,"noise_key":"AAA=","identity_key":null,"registration_id":0}"#;
        assert!(serde_json::from_str::<Credentials>(json).is_err());
    }
}
