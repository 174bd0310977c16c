//! Transparent obscuring of plaintext secrets that end up typed directly
//! into `config.yaml` (provider passwords, mostly). The key is derived
//! from the machine's own id, exactly as `pmoconfig::encryption` derives
//! its machine key — this module is non-portable by design, the same
//! tradeoff the teacher makes, and is distinct from
//! `streamcore-identity::credential_store`'s device-master-key-derived
//! `"NVSC"` blob format, which is the format §6 defines for provider auth
//! tokens the app itself persists after login.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::Engine;
use sha2::{Digest, Sha256};

const ENCRYPTED_PREFIX: &str = "encrypted:";

fn machine_id() -> Result<String> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
            return Ok(id.trim().to_string());
        }
        if let Ok(id) = std::fs::read_to_string("/var/lib/dbus/machine-id") {
            return Ok(id.trim().to_string());
        }
        Err(anyhow!("failed to read machine-id"))
    }
    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("ioreg")
            .args(["-d2", "-c", "IOPlatformExpertDevice"])
            .output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            if line.contains("IOPlatformUUID") {
                if let Some(uuid) = line.split('"').nth(3) {
                    return Ok(uuid.to_string());
                }
            }
        }
        Err(anyhow!("failed to extract IOPlatformUUID"))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(anyhow!("unsupported platform for machine id extraction"))
    }
}

fn derive_key() -> Result<[u8; 32]> {
    let id = machine_id()?;
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b"streamcore32-config-encryption-v1");
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    Ok(key)
}

fn derive_nonce(plaintext: &str) -> [u8; 12] {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.update(b"streamcore32-nonce-v1");
    let digest = hasher.finalize();
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&digest[..12]);
    nonce
}

/// Encrypts `plaintext`, returning `"encrypted:<base64(nonce || ciphertext)>"`.
/// The nonce is derived from the plaintext itself so re-saving an
/// unchanged value doesn't needlessly churn the config file's diff.
pub fn encrypt_value(plaintext: &str) -> Result<String> {
    let key = derive_key()?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("bad key: {e}"))?;
    let nonce_bytes = derive_nonce(plaintext);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("encryption failed: {e}"))?;

    let mut combined = Vec::with_capacity(12 + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(format!(
        "{ENCRYPTED_PREFIX}{}",
        base64::engine::general_purpose::STANDARD.encode(&combined)
    ))
}

pub fn decrypt_value(encrypted: &str) -> Result<String> {
    let data = encrypted
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| anyhow!("missing encrypted: prefix"))?;

    let key = derive_key()?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("bad key: {e}"))?;

    let combined = base64::engine::general_purpose::STANDARD.decode(data)?;
    if combined.len() < 12 {
        return Err(anyhow!("ciphertext too short"));
    }
    let nonce = Nonce::from_slice(&combined[..12]);
    let plaintext = cipher
        .decrypt(nonce, &combined[12..])
        .map_err(|e| anyhow!("decryption failed (wrong machine or corrupted data): {e}"))?;

    Ok(String::from_utf8(plaintext)?)
}

pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Returns `value` in plaintext, transparently decrypting it first if it
/// carries the `encrypted:` prefix.
pub fn get_plaintext(value: &str) -> Result<String> {
    if is_encrypted(value) {
        decrypt_value(value)
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let secret = "hunter2";
        let encrypted = encrypt_value(secret).unwrap();
        assert!(is_encrypted(&encrypted));
        assert_eq!(decrypt_value(&encrypted).unwrap(), secret);
    }

    #[test]
    fn same_plaintext_encrypts_deterministically() {
        let a = encrypt_value("same-password").unwrap();
        let b = encrypt_value("same-password").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn get_plaintext_passes_through_unencrypted_values() {
        assert_eq!(get_plaintext("plain").unwrap(), "plain");
    }
}
