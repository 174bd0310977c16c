//! The 16-byte opaque device identifier (§3 "Session identity") and the
//! device master key derived once from MAC ‖ chip-info ‖ product-salt,
//! grounded on `pmoconfig::encryption::derive_key`'s SHA-256 machine-key
//! derivation but fed from the spec's own inputs instead of a machine id.

use crate::error::{IdentityError, Result};
use base64::Engine;
use sha2::{Digest, Sha256};

const BASE64URL: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// A 16-byte device identifier with hex and base64url representations
/// that must agree (§3, §8 round-trip property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId([u8; 16]);

impl DeviceId {
    pub fn from_raw(bytes: [u8; 16]) -> Self {
        DeviceId(bytes)
    }

    pub fn raw(&self) -> [u8; 16] {
        self.0
    }

    /// Generates a random device id from the OS RNG, used the first time
    /// a device boots with no persisted identity.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        DeviceId(bytes)
    }

    /// 32-character lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| IdentityError::BadLength(v.len()))?;
        Ok(DeviceId(arr))
    }

    /// 22-character unpadded base64url representation.
    pub fn to_base64url(&self) -> String {
        BASE64URL.encode(self.0)
    }

    pub fn from_base64url(s: &str) -> Result<Self> {
        let bytes = BASE64URL.decode(s)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| IdentityError::BadLength(v.len()))?;
        Ok(DeviceId(arr))
    }

    /// Canonical 36-char dashed UUID string form, used by the Web UI's
    /// `session_id` and the `_qobuz-connect._tcp` TXT record's
    /// `device_uuid` (§6).
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

/// Derives the 32-byte device master key from MAC ‖ chip-info ‖
/// product-salt via SHA-256 (§3). Used only by the credential store —
/// no other subsystem is handed the raw master key.
pub fn derive_master_key(mac: &[u8], chip_info: &[u8], product_salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(mac);
    hasher.update(chip_info);
    hasher.update(product_salt);
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let id = DeviceId::random();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(DeviceId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn base64url_round_trips() {
        let id = DeviceId::random();
        let b64 = id.to_base64url();
        assert_eq!(b64.len(), 22);
        assert_eq!(DeviceId::from_base64url(&b64).unwrap(), id);
    }

    #[test]
    fn hex_and_base64_representations_agree() {
        let id = DeviceId::from_raw([0x42; 16]);
        let via_hex = DeviceId::from_hex(&id.to_hex()).unwrap();
        let via_b64 = DeviceId::from_base64url(&id.to_base64url()).unwrap();
        assert_eq!(via_hex, id);
        assert_eq!(via_b64, id);
    }

    #[test]
    fn uuid_string_is_36_chars_with_dashes() {
        let id = DeviceId::random();
        let s = id.to_uuid_string();
        assert_eq!(s.len(), 36);
        assert_eq!(s.chars().filter(|&c| c == '-').count(), 4);
    }

    #[test]
    fn master_key_derivation_is_deterministic_and_input_sensitive() {
        let a = derive_master_key(b"mac1", b"chip1", b"salt1");
        let b = derive_master_key(b"mac1", b"chip1", b"salt1");
        let c = derive_master_key(b"mac2", b"chip1", b"salt1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
