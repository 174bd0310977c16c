//! Provider-A (Spotify-compatible) session (C3, §4.3): the DH handshake,
//! Shannon-encrypted frame transport, mercury request/response/
//! subscription demux, the audio-key mini-protocol, and time sync,
//! wrapped behind a [`session::SpotifySession`] implementing
//! `streamcore_net::session::ProviderSession`.

pub mod audio_key;
pub mod error;
pub mod handshake;
pub mod mercury;
pub mod proto;
pub mod renderer_state;
pub mod session;
pub mod shannon_framing;
pub mod time_sync;

pub use error::{Result, SpotifyError};
pub use mercury::{MercuryClient, MercuryResult};
pub use renderer_state::IntoRendererState;
pub use session::{SpotifySession, StoredCredential};
