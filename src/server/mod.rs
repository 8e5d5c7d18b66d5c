/// TCP server implementation for the Docstore daemon.
///
/// This module provides the [`Router`] which handles incoming TCP connections
/// and dispatches line commands to the underlying store.
pub mod router;

pub use router::Router;
