//! Control plane dispatch (C9, §4.8): wraps outbound messages into
//! batches with a strictly increasing sequence number, routes inbound
//! messages through the reducer, and runs the three-duty heartbeat.

pub mod control_point;
pub mod dispatch;
pub mod error;
pub mod heartbeat;

pub use control_point::{ControlPoint, EffectSink};
pub use dispatch::{BatchDispatcher, OutboundBatch, OutboundTransport, CONTROLLER_DESTINATION};
pub use error::{ControlError, Result};
pub use heartbeat::{run_heartbeat, HeartbeatDuties, HEARTBEAT_PERIOD};
