//! Broadcast-style TCP chat relay.
//!
//! One server task accepts connections; each connection gets its own
//! session task that registers a display name and then relays every chat
//! line it reads to all other connected participants. Each module covers
//! one concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`server`] binds the listener, enforces the client cap, and spawns
//!   sessions.
//! - [`session`] drives one connection from registration through logout or
//!   disconnect.
//! - [`registry`] is the shared, synchronized directory of live
//!   participants.
//! - [`broadcast`] fans a line out to every participant except its sender.
//! - [`events`] appends join/message/leave audit events to a log file.
//! - [`wire`] implements the bounded, newline-delimited line protocol.
//! - [`client`] is a terminal client multiplexing stdin and server traffic.
//!
//! Integration tests use this crate directly to drive real TCP connections
//! against a server and observe registry membership.

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod error;
pub mod events;
pub mod registry;
pub mod server;
pub mod session;
pub mod wire;
