//! Contains the [`Client`], the owner of the server session registry and the entry point for
//! starting sessions and running convenient transactions.

pub(crate) mod options;
pub(crate) mod session;

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures_util::FutureExt;

use crate::{
    client::{
        options::{SessionOptions, TransactionOptions},
        session::{ClientSession, ServerSession, ServerSessionPool},
    },
    conn::{Connection, SessionKind, Topology},
    error::{Error, ErrorKind, Result},
    trace::SESSION_TRACING_EVENT_TARGET,
    BoxFuture,
};

/// How long to wait before asking the topology for a connection again after it signaled
/// transient unavailability.
const CHECKOUT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The overall wall-clock budget for [`Client::with_transaction`], covering the callback and the
/// commit.
const WITH_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// The session front of a MongoDB deployment. Holds the process-wide pool of server session
/// identities and checks sessions out against connections selected by the [`Topology`].
///
/// `Client` uses [`std::sync::Arc`] internally, so it can safely be shared across threads or
/// async tasks by cloning.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    topology: Arc<dyn Topology>,
    session_pool: ServerSessionPool,
}

impl Client {
    /// Creates a new `Client` on top of the given topology.
    pub fn new(topology: Arc<dyn Topology>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                topology,
                session_pool: ServerSessionPool::new(),
            }),
        }
    }

    /// Starts a new [`ClientSession`] against a server selected for `kind` operations.
    pub async fn start_session(&self, kind: SessionKind) -> Result<ClientSession> {
        self.start_session_common(kind, None, false).await
    }

    /// Starts a new [`ClientSession`] with the given options.
    pub async fn start_session_with_options(
        &self,
        kind: SessionKind,
        options: SessionOptions,
    ) -> Result<ClientSession> {
        self.start_session_common(kind, Some(options), false).await
    }

    /// Starts a session for internal use around a single operation. Implicit sessions are
    /// returned to the pool by [`ClientSession::end_implicit`] once the operation finishes;
    /// callers that already hold a session keep using it instead of requesting a new one.
    pub async fn start_implicit_session(&self, kind: SessionKind) -> Result<ClientSession> {
        self.start_session_common(kind, None, true).await
    }

    async fn start_session_common(
        &self,
        kind: SessionKind,
        options: Option<SessionOptions>,
        is_implicit: bool,
    ) -> Result<ClientSession> {
        if let Some(ref options) = options {
            options.validate()?;
        }
        let connection = self.checkout_connection(kind).await?;
        let timeout = self.inner.topology.logical_session_timeout();
        let server_session = self.inner.session_pool.check_out(timeout).await;
        Ok(ClientSession::new(
            self.clone(),
            connection,
            server_session,
            options,
            is_implicit,
        ))
    }

    /// Checks out a connection, sleeping and retrying while the topology reports transient
    /// unavailability. Callers bound the overall wait externally (e.g. by timeout or
    /// cancellation).
    async fn checkout_connection(&self, kind: SessionKind) -> Result<Arc<dyn Connection>> {
        loop {
            match self.inner.topology.checkout(kind).await {
                Ok(connection) => return Ok(connection),
                Err(error) if error.is_checkout_retryable() => {
                    tracing::debug!(
                        target: SESSION_TRACING_EVENT_TARGET,
                        error = %error,
                        "topology cannot serve a connection yet, retrying checkout",
                    );
                    tokio::time::sleep(CHECKOUT_RETRY_DELAY).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub(crate) async fn check_in_server_session(&self, session: ServerSession) {
        let timeout = self.inner.topology.logical_session_timeout();
        self.inner.session_pool.check_in(session, timeout).await;
    }

    #[cfg(test)]
    pub(crate) fn session_pool(&self) -> &ServerSessionPool {
        &self.inner.session_pool
    }

    /// Starts a transaction, runs the given callback, and commits or aborts depending on its
    /// outcome, all on a dedicated write session that is ended before returning.
    ///
    /// A callback that returns an error or panics causes the transaction to be aborted and the
    /// original error to be surfaced; panics are translated into
    /// [`ErrorKind::Callback`](crate::error::ErrorKind::Callback) and their payload is reduced
    /// to a message, so callbacks should surface context through their own error values. The
    /// callback and commit together must complete within 120 seconds; past that the
    /// transaction is aborted and a timeout error returned.
    ///
    /// This method does not retry transient transaction errors; callers that want the retry
    /// behavior of the MongoDB convenient-transactions specification can layer it on top using
    /// the labels attached to returned errors.
    pub async fn with_transaction<F, T>(
        &self,
        options: impl Into<Option<TransactionOptions>>,
        callback: F,
    ) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut ClientSession) -> BoxFuture<'a, Result<T>>,
    {
        let mut session = self.start_session(SessionKind::Write).await?;
        if let Err(error) = session.start_transaction(options) {
            session.end().await;
            return Err(error);
        }

        // The budget bounds the callback and the commit round trip together, so a commit
        // against an unresponsive server cannot hang past it.
        let session_ref = &mut session;
        let run = async move {
            let callback_result = AssertUnwindSafe(callback(&mut *session_ref))
                .catch_unwind()
                .await;
            match callback_result {
                Ok(Ok(value)) => session_ref.commit_transaction().await.map(|()| value),
                Ok(Err(error)) => Err(error),
                Err(panic_payload) => Err(Error::new(
                    ErrorKind::Callback {
                        message: panic_message(panic_payload),
                    },
                    None::<Option<String>>,
                )),
            }
        };
        let outcome = tokio::time::timeout(WITH_TRANSACTION_TIMEOUT, run).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::transaction_state(
                "transaction exceeded the maximum allowed run time of 120 seconds",
            )),
        };

        match result {
            Ok(value) => {
                session.end().await;
                Ok(value)
            }
            Err(error) => {
                // The abort must not mask the original failure. Once the commit has run, or the
                // budget expired during it, the session is already committed and this is a
                // state error, which is fine to drop too.
                let _result = session.abort_transaction().await;
                session.end().await;
                Err(error)
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "transaction callback panicked".to_string()
    }
}
