//! The seams between the session core and the rest of a driver: a [`Connection`] executes
//! commands on one server stream, and a [`Topology`] selects servers and hands out connections.
//! The wire protocol, authentication, pooling, and SDAM all live behind these traits.

mod command;
mod stream_description;

use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::{bson::Document, error::Result, BoxFuture};

pub use command::Command;
pub use stream_description::StreamDescription;

/// Whether a session will be used for read or for write operations, so the topology can apply
/// the matching server selection rules during checkout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum SessionKind {
    /// The session is checked out against a server eligible for reads.
    Read,

    /// The session is checked out against a writable server.
    Write,
}

/// A handle to a single server connection. Sessions pin one connection for their entire life so
/// that every command of a transaction reaches the same server.
///
/// Implementations frame the given [`Command`] into the wire protocol, transmit it, and return
/// the server's reply document. Transport failures surface as `ErrorKind::Io`.
pub trait Connection: Send + Sync + Debug {
    /// Execute the command on this connection and return the server's reply.
    fn run_command(&self, command: Command) -> BoxFuture<'_, Result<Document>>;

    /// The negotiated capabilities of this connection's server.
    fn stream_description(&self) -> &StreamDescription;

    /// The address of the server this connection is tied to.
    fn address(&self) -> &str;
}

/// The server discovery and selection layer. The session core asks it for a connection at
/// session checkout; everything else about monitoring and pooling is its own concern.
///
/// A topology that is transiently unable to satisfy a checkout (e.g. no primary known yet)
/// returns an `ErrorKind::ServerSelection` error; the client then sleeps and retries.
pub trait Topology: Send + Sync + Debug {
    /// Select a server appropriate for `kind` and check out a connection to it.
    fn checkout(&self, kind: SessionKind) -> BoxFuture<'_, Result<Arc<dyn Connection>>>;

    /// The `logicalSessionTimeoutMinutes` reported by the deployment, if known. Used by the
    /// server session pool to discard identities that are about to expire.
    fn logical_session_timeout(&self) -> Option<Duration> {
        None
    }
}
