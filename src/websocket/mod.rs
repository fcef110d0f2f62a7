//! The WebSocket upgrade layer: RFC 6455 handshake, framing, connection
//! state machine, heartbeat and rooms, sharing the same routing and
//! middleware pipeline as HTTP.
//!
//! Grounded on `tiipotto-tii`'s `websocket` module (frame layout,
//! message abstraction), reworked onto async Tokio I/O since this
//! crate's connections are driven by `tokio::net::TcpStream` rather than
//! a blocking listener thread.

pub mod connection;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod room;
pub mod upgrade;

use std::fmt;

pub use connection::{close_code, Connection, ConnectionState, WsSettings};
pub use message::Message;
pub use room::{ConnectionId, RoomManager};
pub use upgrade::{upgrade_request, UpgradeError, UpgradeRequest};

#[derive(Debug)]
pub enum WsError {
    Io(std::io::Error),
    InvalidOpcode(u8),
    ReservedBitsSet,
    UnmaskedClientFrame,
    ControlFrameTooLarge,
    PayloadTooLarge,
    InvalidUtf8,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WsError::Io(e) => write!(f, "websocket io error: {e}"),
            WsError::InvalidOpcode(op) => write!(f, "invalid websocket opcode: {op:#x}"),
            WsError::ReservedBitsSet => write!(f, "reserved frame bits set"),
            WsError::UnmaskedClientFrame => write!(f, "client frame was not masked"),
            WsError::ControlFrameTooLarge => write!(f, "control frame payload exceeds 125 bytes"),
            WsError::PayloadTooLarge => write!(f, "frame payload exceeds configured maximum"),
            WsError::InvalidUtf8 => write!(f, "text frame payload is not valid UTF-8"),
        }
    }
}

impl std::error::Error for WsError {}
