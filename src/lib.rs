//! The session layer of a minimal inbound SMTP server.
//!
//! A [`session::Session`] terminates one connection: it reassembles the byte
//! stream into command lines and message bodies, enforces command ordering,
//! negotiates `AUTH PLAIN`, upgrades to TLS on `STARTTLS` and hands completed
//! messages to a [`handler::TransactionHandler`]. [`server::Server`] runs one
//! session per accepted TCP connection.

pub mod auth;
pub mod command;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod log;
pub mod reassembly;
pub mod reply;
pub mod server;
pub mod session;
pub mod status;

pub use tracing;
