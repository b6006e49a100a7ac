//! WebSocket connection handling and per-connection session dispatch.

mod handler;
mod hub;
mod session;

pub use handler::{RESERVED_DEV_PROTOCOL, ws_handler};
pub use hub::ConnectionTracker;
pub use session::{CONNECTED_MESSAGE, Session, SessionClosed};
