mod registry;
mod stats;
mod types;

pub use registry::{ConnectionManager, CLOSE_GOING_AWAY};
pub use stats::{ConnectionInfo, ConnectionStats};
pub use types::{ChannelTransport, ConnectionId, OutboundFrame, Transport, TransportError};
