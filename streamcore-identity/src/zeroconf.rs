//! TXT-record contents for the two advertised mDNS services (§6 "mDNS /
//! Zeroconf"). Publishing mDNS itself is out of scope (§1) — this module
//! builds the record *contents* and a trait the real responder
//! implements, matching how `pmocontrol`'s discovery modules separate
//! "what to advertise" from the SSDP/mDNS transport.

use crate::device_id::DeviceId;

/// A service the device advertises: its mDNS service type and TXT
/// key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroconfRecord {
    pub service: &'static str,
    pub txt: Vec<(String, String)>,
}

/// Builds the `_spotify-connect._tcp` record (§6): `VERSION=1.0`,
/// `CPath=/spotify_info`, `Stack=SP`.
pub fn spotify_connect_record() -> ZeroconfRecord {
    ZeroconfRecord {
        service: "_spotify-connect._tcp",
        txt: vec![
            ("VERSION".into(), "1.0".into()),
            ("CPath".into(), "/spotify_info".into()),
            ("Stack".into(), "SP".into()),
        ],
    }
}

/// Builds the `_qobuz-connect._tcp` record (§6): `path=/streamcore`,
/// `type=SPEAKER`, `sdk_version=sc32-1.0.0`, `device_uuid=<36-char>`.
pub fn qobuz_connect_record(device_id: DeviceId) -> ZeroconfRecord {
    ZeroconfRecord {
        service: "_qobuz-connect._tcp",
        txt: vec![
            ("path".into(), "/streamcore".into()),
            ("type".into(), "SPEAKER".into()),
            ("sdk_version".into(), "sc32-1.0.0".into()),
            ("device_uuid".into(), device_id.to_uuid_string()),
        ],
    }
}

/// The interface the real mDNS responder (out of scope per §1)
/// implements: publish/withdraw a record by service type.
pub trait ZeroconfPublisher: Send + Sync {
    fn publish(&self, record: &ZeroconfRecord);
    fn withdraw(&self, service: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spotify_record_has_documented_fields() {
        let record = spotify_connect_record();
        assert_eq!(record.service, "_spotify-connect._tcp");
        assert!(record.txt.contains(&("VERSION".into(), "1.0".into())));
        assert!(record.txt.contains(&("CPath".into(), "/spotify_info".into())));
        assert!(record.txt.contains(&("Stack".into(), "SP".into())));
    }

    #[test]
    fn qobuz_record_carries_a_36_char_device_uuid() {
        let id = DeviceId::random();
        let record = qobuz_connect_record(id);
        assert_eq!(record.service, "_qobuz-connect._tcp");
        let (_, uuid) = record.txt.iter().find(|(k, _)| k == "device_uuid").unwrap();
        assert_eq!(uuid.len(), 36);
    }
}
