//! Device identity, encrypted credential persistence, and the zeroconf /
//! local-discovery contracts (C10, §3 "Session identity", §6 "mDNS /
//! Zeroconf", "Credential store"). The mDNS responder and the HTTP server
//! that exposes the discovery endpoints are out of scope (§1) — this
//! crate only builds the data these collaborators need.

pub mod credential_store;
pub mod device_id;
pub mod discovery;
pub mod error;
pub mod zeroconf;

pub use credential_store::CredentialStore;
pub use device_id::DeviceId;
pub use error::{IdentityError, Result};
