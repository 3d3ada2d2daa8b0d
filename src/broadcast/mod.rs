//! Real-time fan-out to connected clients
//!
//! Connections are registered once, then subscribed to named rooms such as
//! `lobby:<id>_public` and `lobby:<id>_private`.

pub mod connection;
pub mod rooms;

pub use connection::{ChannelConnection, Connection, OutboundEvent};
pub use rooms::RoomBroadcaster;
