//! Real-time gateway: WebSocket transport for seat selection and group events.

pub mod events;
pub mod fanout;
pub mod handler;
pub mod notify;
pub mod server;
pub mod session;
