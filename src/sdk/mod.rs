/// Software Development Kit (SDK) for Docstore.
///
/// This module provides a remote TCP client for the daemon's line protocol.
pub mod client;

pub use client::Client;
