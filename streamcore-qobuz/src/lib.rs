//! Provider-B (Qobuz-compatible) session (C4, §4.4): the signed HTTPS
//! JSON API, the WebSocket envelope transport with keepalive, and a
//! [`session::QobuzSession`] implementing
//! `streamcore_net::session::ProviderSession`.

pub mod api;
pub mod envelope;
pub mod error;
pub mod renderer_state;
pub mod session;
pub mod ws;

pub use error::{QobuzError, Result};
pub use renderer_state::IntoRendererState;
pub use session::QobuzSession;
