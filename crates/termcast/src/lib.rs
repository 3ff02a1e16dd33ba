//! termcast server core
//!
//! Bridges a terminal-UI producer to WebSocket consumers: snapshots of ANSI
//! output go in through [`Server::broadcast`], styled-markup text frames fan
//! out to every connected client.

pub mod server;

pub use server::Server;
