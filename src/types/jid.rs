use std::fmt;
use std::str::FromStr;

/// Known JID servers on WhatsApp.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const BROADCAST_SERVER: &str = "broadcast";

/// Pseudo-address used by the status/broadcast feed.
pub const STATUS_BROADCAST_ADDR: &str = "status@broadcast";

/// JID represents a WhatsApp user/entity ID (user@server, optionally with a
/// `:device` suffix on the user part for device-specific addressing).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Jid {
    pub user: String,
    pub device: u16,
    pub server: String,
}

impl Jid {
    /// New regular JID (user@server).
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    /// JID for a bare phone number ("+62 811..." or "62811...") on the
    /// default user server. Inputs already in JID form are parsed as-is.
    pub fn from_phone(raw: &str) -> Option<Self> {
        if raw.contains('@') {
            return raw.parse().ok();
        }
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        Some(Self::new(digits, DEFAULT_USER_SERVER))
    }

    /// Status/broadcast pseudo-address.
    pub fn status_broadcast() -> Self {
        Self::new("status", BROADCAST_SERVER)
    }

    /// JID without the device suffix (regular user@server).
    pub fn to_non_device(&self) -> Self {
        Self {
            user: self.user.clone(),
            device: 0,
            server: self.server.clone(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER
    }
}

/// First formatting pass: validate a raw sender identifier.
///
/// Accepts only numeric users on the known chat servers (user, legacy user,
/// group). Anything else (newsletters, broadcast lists, malformed strings)
/// is rejected and the message carrying it is dropped upstream.
pub fn validate_sender(raw: &str) -> Option<Jid> {
    let jid: Jid = raw.parse().ok()?;
    if jid.user.is_empty() || !jid.user.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match jid.server.as_str() {
        DEFAULT_USER_SERVER | LEGACY_USER_SERVER | GROUP_SERVER => Some(jid),
        _ => None,
    }
}

/// Second formatting pass: canonical display form of a validated sender.
///
/// Strips the device suffix. In embedded mode user JIDs are rendered on the
/// legacy `c.us` server, which is the form host bot frameworks route on;
/// standalone keeps the canonical server. Group JIDs are identical in both
/// modes.
pub fn display_sender(jid: &Jid, embedded: bool) -> String {
    let plain = jid.to_non_device();
    if embedded && plain.server == DEFAULT_USER_SERVER {
        return format!("{}@{}", plain.user, LEGACY_USER_SERVER);
    }
    plain.to_string()
}

impl FromStr for Jid {
    type Err = JidParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('@').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(JidParseError);
        }
        let mut jid = Self {
            user: parts[0].to_string(),
            device: 0,
            server: parts[1].to_string(),
        };
        if jid.user.contains(':') {
            let parts: Vec<&str> = jid.user.splitn(2, ':').collect();
            let user = parts[0].to_string();
            let device = parts[1].to_string();
            jid.user = user;
            jid.device = device.parse().map_err(|_| JidParseError)?;
        }
        Ok(jid)
    }
}

#[derive(Debug)]
pub struct JidParseError;

impl fmt::Display for JidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid JID format")
    }
}

impl std::error::Error for JidParseError {}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl serde::Serialize for Jid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Jid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Jid::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jid_new_and_display() {
        let j = Jid::new("628123456789", "s.whatsapp.net");
        assert_eq!(j.to_string(), "628123456789@s.whatsapp.net");
        assert!(!j.is_group());
        assert!(!j.is_broadcast());
    }

    #[test]
    fn jid_parse_roundtrip() {
        let s = "123456789@g.us";
        let j: Jid = s.parse().unwrap();
        assert_eq!(j.user, "123456789");
        assert_eq!(j.server, "g.us");
        assert!(j.is_group());
        assert_eq!(j.to_string(), s);
    }

    #[test]
    fn jid_with_device_suffix() {
        let j: Jid = "628123:15@s.whatsapp.net".parse().unwrap();
        assert_eq!(j.user, "628123");
        assert_eq!(j.device, 15);
        assert_eq!(j.to_non_device().to_string(), "628123@s.whatsapp.net");
    }

    #[test]
    fn jid_rejects_garbage() {
        assert!("".parse::<Jid>().is_err());
        assert!("@s.whatsapp.net".parse::<Jid>().is_err());
        assert!("no-at-sign".parse::<Jid>().is_err());
        assert!("a@b@c".parse::<Jid>().is_err());
    }

    #[test]
    fn from_phone_normalizes() {
        let j = Jid::from_phone("+62 812-345").unwrap();
        assert_eq!(j.to_string(), "62812345@s.whatsapp.net");
        let j = Jid::from_phone("123@g.us").unwrap();
        assert!(j.is_group());
        assert!(Jid::from_phone("+-- ").is_none());
    }

    #[test]
    fn validate_sender_accepts_users_and_groups() {
        assert!(validate_sender("628123456789@s.whatsapp.net").is_some());
        assert!(validate_sender("628123456789@c.us").is_some());
        assert!(validate_sender("120363041234567890@g.us").is_some());
    }

    #[test]
    fn validate_sender_rejects_other_servers() {
        assert!(validate_sender(STATUS_BROADCAST_ADDR).is_none());
        assert!(validate_sender("12345@newsletter").is_none());
        assert!(validate_sender("not-a-number@s.whatsapp.net").is_none());
        assert!(validate_sender("garbage").is_none());
    }

    #[test]
    fn display_sender_modes() {
        let user = validate_sender("628123:4@s.whatsapp.net").unwrap();
        assert_eq!(display_sender(&user, false), "628123@s.whatsapp.net");
        assert_eq!(display_sender(&user, true), "628123@c.us");

        let group = validate_sender("12036304@g.us").unwrap();
        assert_eq!(display_sender(&group, false), "12036304@g.us");
        assert_eq!(display_sender(&group, true), "12036304@g.us");
    }
}
