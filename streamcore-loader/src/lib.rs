//! Track loader (C6, §4.6): per-track pipeline resolving metadata, the
//! content key and CDN URL, probing the stream for a usable header, and
//! streaming ranged, optionally decrypted bytes to the sink — driven by
//! the reducer's preload window.

pub mod error;
pub mod flac_probe;
pub mod metadata;
pub mod pipeline;
pub mod ranged_reader;

pub use error::{LoaderError, Result};
pub use metadata::{MetadataSource, TrackMetadata, TrackSource};
pub use pipeline::{LoaderEvent, LoaderTask};
pub use ranged_reader::{RangedReader, HEADROOM, PULL};
