//! Encrypted-at-rest credential store (§6 "Credential store"). Namespace
//! -scoped records keyed by `userkey`, each a list of `{name, value[]}`
//! fields, encrypted with AES-GCM under the device master key in the
//! `"NVSC" | ver | iv[12] | tag[16] | ct` blob format §6 specifies.
//!
//! Grounded on `pmoconfig::encryption`'s nonce+ciphertext-combining
//! pattern, generalized from a single machine-derived key and a single
//! password field to the device master key (§3) and the `{name,
//! value[]}` field list §6 describes. The actual *store backing*
//! (persistence medium) is out of scope (§1); this provides the blob
//! format and an in-memory + file-backed reference implementation.
//!
//! A record with no fields is treated as absent.

use crate::error::{IdentityError, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MAGIC: &[u8; 4] = b"NVSC";
const VERSION: u8 = 1;

/// One named field within a record, e.g. `{name: "reusable_credential",
/// value: [..bytes..]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialField {
    pub name: String,
    pub value: Vec<u8>,
}

/// A namespace-scoped credential record: an ordered list of fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub fields: Vec<CredentialField>,
}

impl CredentialRecord {
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value.as_slice())
    }
}

/// Encrypts a [`CredentialRecord`] (serialized as JSON, then AES-GCM
/// sealed) into the `"NVSC"|ver|iv[12]|tag[16]|ct` blob format.
fn encrypt_record(key: &[u8; 32], record: &CredentialRecord) -> Vec<u8> {
    let cipher = Aes256Gcm::new_from_slice(key).expect("32-byte key is always valid for AES-256");
    let mut iv = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let plaintext = serde_json::to_vec(record).expect("CredentialRecord always serializes");
    let sealed = cipher
        .encrypt(nonce, Payload { msg: &plaintext, aad: MAGIC })
        .expect("AES-GCM encryption with a valid key never fails");

    // aes-gcm appends the 16-byte tag to the ciphertext; split it back out
    // so the blob layout matches §6's explicit `tag[16] | ct` ordering.
    let (ct, tag) = sealed.split_at(sealed.len() - 16);

    let mut out = Vec::with_capacity(4 + 1 + 12 + 16 + ct.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&iv);
    out.extend_from_slice(tag);
    out.extend_from_slice(ct);
    out
}

fn decrypt_record(key: &[u8; 32], blob: &[u8]) -> Result<CredentialRecord> {
    if blob.len() < 4 + 1 + 12 + 16 {
        return Err(IdentityError::Truncated);
    }
    if &blob[0..4] != MAGIC {
        return Err(IdentityError::BadMagic);
    }
    let version = blob[4];
    if version != VERSION {
        return Err(IdentityError::UnsupportedVersion(version));
    }
    let iv = &blob[5..17];
    let tag = &blob[17..33];
    let ct = &blob[33..];

    let mut sealed = Vec::with_capacity(ct.len() + tag.len());
    sealed.extend_from_slice(ct);
    sealed.extend_from_slice(tag);

    let cipher = Aes256Gcm::new_from_slice(key).expect("32-byte key is always valid for AES-256");
    let nonce = Nonce::from_slice(iv);
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: &sealed, aad: MAGIC })
        .map_err(|_| IdentityError::DecryptFailed)?;

    serde_json::from_slice(&plaintext).map_err(|_| IdentityError::DecryptFailed)
}

/// An in-memory, optionally file-backed credential store keyed by
/// `userkey`. The "current" record pointer tracks which userkey the
/// device should use on next boot (§6 `set_current`/`get_current`/
/// `get_startup_record`).
pub struct CredentialStore {
    master_key: [u8; 32],
    backing_file: Option<PathBuf>,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    records: HashMap<String, Vec<u8>>,
    current: Option<String>,
}

impl CredentialStore {
    pub fn new(master_key: [u8; 32]) -> Self {
        CredentialStore {
            master_key,
            backing_file: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Opens (or creates) a file-backed store. The file holds the raw
    /// encrypted blobs keyed by userkey, persisted as JSON-of-base64 for
    /// simplicity; only the ciphertext ever touches disk.
    pub fn open_file(master_key: [u8; 32], path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = CredentialStore {
            master_key,
            backing_file: Some(path.clone()),
            state: Mutex::new(StoreState::default()),
        };
        if let Ok(bytes) = std::fs::read(&path) {
            if let Ok(on_disk) = serde_json::from_slice::<OnDisk>(&bytes) {
                let mut state = store.state.get_mut().unwrap();
                for (k, v) in on_disk.records {
                    state.records.insert(k, v);
                }
                state.current = on_disk.current;
            }
        }
        store.persist()?;
        Ok(store)
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.backing_file else { return Ok(()) };
        let state = self.state.lock().unwrap();
        let on_disk = OnDisk {
            records: state.records.clone(),
            current: state.current.clone(),
        };
        let bytes = serde_json::to_vec(&on_disk).expect("OnDisk always serializes");
        std::fs::write(path, bytes).map_err(|_| IdentityError::Truncated)?;
        Ok(())
    }

    pub fn save(&self, userkey: &str, record: &CredentialRecord) -> Result<()> {
        let blob = encrypt_record(&self.master_key, record);
        self.state.lock().unwrap().records.insert(userkey.to_string(), blob);
        self.persist()
    }

    pub fn load(&self, userkey: &str) -> Result<CredentialRecord> {
        let state = self.state.lock().unwrap();
        let blob = state
            .records
            .get(userkey)
            .ok_or_else(|| IdentityError::NotFound(userkey.to_string()))?;
        decrypt_record(&self.master_key, blob)
    }

    pub fn erase(&self, userkey: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.records.remove(userkey);
        if state.current.as_deref() == Some(userkey) {
            state.current = None;
        }
        drop(state);
        self.persist()
    }

    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().unwrap().records.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn set_current(&self, userkey: &str) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if !state.records.contains_key(userkey) {
                return Err(IdentityError::NotFound(userkey.to_string()));
            }
        }
        self.state.lock().unwrap().current = Some(userkey.to_string());
        self.persist()
    }

    pub fn get_current(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }

    /// The record the device should authenticate with on boot: the
    /// "current" userkey's record, if one is set and still present.
    pub fn get_startup_record(&self) -> Result<Option<(String, CredentialRecord)>> {
        let Some(userkey) = self.get_current() else { return Ok(None) };
        match self.load(&userkey) {
            Ok(record) => Ok(Some((userkey, record))),
            Err(IdentityError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct OnDisk {
    records: HashMap<String, Vec<u8>>,
    current: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new([0x5a; 32])
    }

    fn record() -> CredentialRecord {
        CredentialRecord {
            fields: vec![CredentialField {
                name: "reusable_credential".into(),
                value: b"opaque-blob-from-server".to_vec(),
            }],
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = store();
        store.save("user@example.com", &record()).unwrap();
        let loaded = store.load("user@example.com").unwrap();
        assert_eq!(loaded, record());
    }

    #[test]
    fn load_missing_userkey_errors() {
        let store = store();
        assert!(matches!(store.load("nobody"), Err(IdentityError::NotFound(_))));
    }

    #[test]
    fn erase_removes_record_and_clears_current() {
        let store = store();
        store.save("a", &record()).unwrap();
        store.set_current("a").unwrap();
        store.erase("a").unwrap();
        assert!(store.load("a").is_err());
        assert_eq!(store.get_current(), None);
    }

    #[test]
    fn list_returns_sorted_userkeys() {
        let store = store();
        store.save("zzz", &record()).unwrap();
        store.save("aaa", &record()).unwrap();
        assert_eq!(store.list(), vec!["aaa".to_string(), "zzz".to_string()]);
    }

    #[test]
    fn startup_record_tracks_current_pointer() {
        let store = store();
        assert_eq!(store.get_startup_record().unwrap(), None);

        store.save("main", &record()).unwrap();
        store.set_current("main").unwrap();
        let (userkey, rec) = store.get_startup_record().unwrap().unwrap();
        assert_eq!(userkey, "main");
        assert_eq!(rec, record());
    }

    #[test]
    fn blob_carries_the_documented_magic_and_version() {
        let blob = encrypt_record(&[0x11; 32], &record());
        assert_eq!(&blob[0..4], b"NVSC");
        assert_eq!(blob[4], 1);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let blob = encrypt_record(&[0x11; 32], &record());
        assert!(matches!(decrypt_record(&[0x22; 32], &blob), Err(IdentityError::DecryptFailed)));
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");

        let store = CredentialStore::open_file([0x33; 32], &path).unwrap();
        store.save("user", &record()).unwrap();
        store.set_current("user").unwrap();
        drop(store);

        let reopened = CredentialStore::open_file([0x33; 32], &path).unwrap();
        assert_eq!(reopened.load("user").unwrap(), record());
        assert_eq!(reopened.get_current(), Some("user".to_string()));
    }
}
