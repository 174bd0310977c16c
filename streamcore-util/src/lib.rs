//! Small shared helpers with no home in a more specific crate: the
//! process-wide lease registry (§4.9).

pub mod lease;

pub use lease::{Lease, LeaseRegistry};
