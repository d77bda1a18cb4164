//! Real-time synchronization: relay the update channel to every live viewer.

pub mod fanout;
pub mod relay;

pub use fanout::{
    BroadcastReport, ChannelViewer, DeliveryError, SessionId, SessionManager, ViewerConnection,
};
pub use relay::{RelayBackoff, RelayBridge, RelayError, RelayStats};
