//! Troupe server library.
//!
//! Core components for routing chat requests to agent personas and streaming
//! completion output back over WebSocket.

pub mod api;
pub mod client;
pub mod completion;
pub mod persona;
pub mod settings;
pub mod ws;
