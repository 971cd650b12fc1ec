//! Gentoro MCP Relay
//!
//! Exposes the Model Context Protocol (MCP) over stdio and forwards every
//! request to a Gentoro agent over HTTP JSON-RPC 2.0.

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use config::Config;
pub use error::RelayError;
pub use server::{RelayServer, ServerState};
pub use transport::{HttpTransport, Transport};
