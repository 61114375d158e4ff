//! This crate implements the session and transaction core of a MongoDB client: logical
//! sessions checked out from a process-wide registry, the transaction state machine, command
//! decoration with session and transaction metadata, causal-consistency timestamp tracking,
//! and the commit/abort protocol.
//!
//! The wire protocol, connection pooling, and server discovery are supplied by the embedding
//! driver through the [`conn::Connection`] and [`conn::Topology`] traits; this crate never
//! frames bytes itself.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use mongocore::{bson::doc, error::Result, Client, SessionKind, conn::Topology};
//! # async fn run(topology: Arc<dyn Topology>) -> Result<()> {
//! let client = Client::new(topology);
//! let mut session = client.start_session(SessionKind::Write).await?;
//! session.start_transaction(None)?;
//! session
//!     .run_command(mongocore::Command::new(
//!         "insert",
//!         "db",
//!         doc! { "insert": "coll", "documents": [{ "x": 1 }] },
//!     ))
//!     .await?;
//! session.commit_transaction().await?;
//! session.end().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::match_like_matches_macro)]

pub use bson;

mod bson_util;
mod client;
pub mod concern;
pub mod conn;
pub mod error;
mod operation;
pub mod options;
#[cfg(test)]
mod test;
mod trace;

pub use crate::{
    client::{session::ClientSession, Client},
    conn::{Command, SessionKind},
};

/// A boxed future.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
