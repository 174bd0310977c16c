//! Shared networking primitives: HTTP client construction, the
//! rate-limit/backoff helper, resumable ranged GET, and the
//! `ProviderSession` lifecycle trait both providers implement.

pub mod error;
pub mod http;
pub mod ranged;
pub mod retry;
pub mod session;

pub use error::{NetError, Result};
pub use session::{ProviderSession, SessionState};
