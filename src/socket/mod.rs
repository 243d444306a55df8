//! Voice socket: one WebSocket per session carrying audio both ways

pub mod client;
pub mod messages;

pub use client::{ConnectionState, Outbound, SessionSocket, SocketEvent};
pub use messages::{ClientMessage, ServerMessage};
