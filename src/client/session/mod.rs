//! The client session state machine: session identity, transaction phases, command decoration,
//! and causal-consistency timestamp tracking.

pub(crate) mod pool;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use uuid::Uuid;

use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document, Timestamp},
    client::{
        options::{SessionOptions, TransactionOptions},
        Client,
    },
    concern::WriteConcern,
    conn::{Command, Connection},
    error::{Error, ErrorKind, Result, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    operation::{self, AbortTransaction, CommitTransaction},
    trace::SESSION_TRACING_EVENT_TARGET,
};

pub(crate) use pool::ServerSessionPool;

/// The minimum wire version at which deployments understand logical sessions. Commands sent to
/// older servers are passed through undecorated.
pub(crate) const MIN_SESSIONS_WIRE_VERSION: i32 = 6;

/// A MongoDB client session. This struct represents a logical session used for ordering
/// sequential operations. To create a `ClientSession`, call
/// [`start_session`](crate::Client::start_session) on a [`Client`](crate::Client).
///
/// `ClientSession` instances are not thread safe or fork safe. They can only be used by one
/// thread or process at a time.
///
/// ## Transactions
/// Transactions are used to execute a series of operations across multiple documents and
/// collections atomically. To begin a transaction, call [`ClientSession::start_transaction`];
/// every command bound through the session while the transaction is active is then executed as
/// part of it, and the transaction finishes with [`ClientSession::commit_transaction`] or
/// [`ClientSession::abort_transaction`].
///
/// All commands of one transaction travel over the connection the session pinned at checkout,
/// so they reach the same server.
#[derive(Debug)]
pub struct ClientSession {
    connection: Arc<dyn Connection>,
    server_session: ServerSession,
    client: Client,
    is_implicit: bool,
    options: Option<SessionOptions>,
    operation_time: Option<Timestamp>,
    pub(crate) transaction: Transaction,
    ended: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Transaction {
    pub(crate) state: TransactionState,
    pub(crate) options: Option<TransactionOptions>,
    pub(crate) recovery_token: Option<Document>,
}

impl Transaction {
    fn start(&mut self, options: Option<TransactionOptions>) {
        self.state = TransactionState::Starting;
        self.options = options;
        self.recovery_token = None;
    }

    fn commit(&mut self) {
        self.state = TransactionState::Committed;
    }

    fn abort(&mut self) {
        self.state = TransactionState::Aborted;
        self.options = None;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) enum TransactionState {
    #[default]
    None,
    Starting,
    InProgress,
    Committed,
    Aborted,
}

impl ClientSession {
    pub(crate) fn new(
        client: Client,
        connection: Arc<dyn Connection>,
        server_session: ServerSession,
        options: Option<SessionOptions>,
        is_implicit: bool,
    ) -> Self {
        Self {
            connection,
            server_session,
            client,
            is_implicit,
            options,
            operation_time: None,
            transaction: Default::default(),
            ended: false,
        }
    }

    /// The id of this session: a `{ "id": <uuid> }` document identifying the server session.
    pub fn id(&self) -> &Document {
        &self.server_session.id
    }

    /// Whether this session was created implicitly by the driver or explicitly by the user.
    pub fn is_implicit(&self) -> bool {
        self.is_implicit
    }

    /// The connection this session pinned at checkout. All commands bound through this session
    /// must be transmitted over it.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Whether this session is currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction.state == TransactionState::Starting
            || self.transaction.state == TransactionState::InProgress
    }

    /// The options used to create this session.
    pub(crate) fn options(&self) -> Option<&SessionOptions> {
        self.options.as_ref()
    }

    /// Whether read operations on this session are decorated with `afterClusterTime`.
    pub fn causal_consistency(&self) -> bool {
        self.options()
            .and_then(|opts| opts.causal_consistency)
            .unwrap_or(false)
    }

    /// The operation time returned by the last acknowledged operation executed in this session.
    pub fn operation_time(&self) -> Option<Timestamp> {
        self.operation_time
    }

    /// Advance operation time for this session. If the provided timestamp is earlier than this
    /// session's current operation time, then the operation time is unchanged.
    pub fn advance_operation_time(&mut self, ts: Timestamp) {
        self.operation_time = match self.operation_time {
            Some(current_op_time) if current_op_time < ts => Some(ts),
            None => Some(ts),
            _ => self.operation_time,
        }
    }

    /// The recovery token received from the most recent in-transaction reply, if any. Sharded
    /// deployments hand these out so a commit or abort can be recovered onto another mongos;
    /// this crate preserves and re-sends the token but does not route on it.
    pub fn recovery_token(&self) -> Option<&Document> {
        self.transaction.recovery_token.as_ref()
    }

    /// Gets the current txn_number.
    pub fn txn_number(&self) -> i64 {
        self.server_session.txn_number
    }

    fn increment_txn_number(&mut self) {
        self.server_session.txn_number += 1;
    }

    /// Mark this session (and the underlying server session) as dirty so it is discarded rather
    /// than reused once checked in.
    pub(crate) fn mark_dirty(&mut self) {
        self.server_session.dirty = true;
    }

    /// Updates the date that the underlying server session was last used as part of an operation
    /// sent to the server.
    fn update_last_use(&mut self) {
        self.server_session.last_use = Instant::now();
    }

    pub(crate) fn wire_version(&self) -> i32 {
        self.connection
            .stream_description()
            .max_wire_version
            .unwrap_or(0)
    }

    fn default_transaction_options(&self) -> Option<&TransactionOptions> {
        self.options
            .as_ref()
            .and_then(|options| options.default_transaction_options.as_ref())
    }

    /// Decorates an outgoing command with this session's metadata according to the current
    /// transaction state. Binding performs no I/O and never blocks.
    ///
    /// Commands destined for servers that predate sessions (wire version < 6) are passed
    /// through unchanged. Binding the first command of a new transaction moves the transaction
    /// from starting to in progress.
    pub fn bind_command(&mut self, cmd: &mut Command) {
        if self.wire_version() < MIN_SESSIONS_WIRE_VERSION {
            return;
        }
        cmd.set_lsid(self.server_session.id.clone());
        match self.transaction.state {
            TransactionState::None
            | TransactionState::Committed
            | TransactionState::Aborted => {
                self.apply_causal_consistency(cmd);
            }
            TransactionState::Starting => {
                cmd.set_txn_number(self.server_session.txn_number);
                cmd.set_start_transaction();
                cmd.set_autocommit();
                // A write concern is only valid on the commit or abort itself.
                cmd.clear_write_concern();
                if let Some(ref options) = self.transaction.options {
                    if let Some(ref read_concern) = options.read_concern {
                        cmd.set_read_concern_level(read_concern.level.clone());
                    }
                }
                self.apply_causal_consistency(cmd);
                self.transaction.state = TransactionState::InProgress;
            }
            TransactionState::InProgress => {
                cmd.set_txn_number(self.server_session.txn_number);
                cmd.set_autocommit();
                cmd.clear_concerns();
            }
        }
        self.update_last_use();
    }

    fn apply_causal_consistency(&self, cmd: &mut Command) {
        if !self.causal_consistency() {
            return;
        }
        if let Some(operation_time) = self.operation_time {
            cmd.set_after_cluster_time(operation_time);
        }
    }

    /// Binds the command to this session, transmits it over the pinned connection, and applies
    /// the reply to the session before surfacing it.
    ///
    /// Network errors that occur inside a transaction are labeled transient and mark the
    /// underlying server session dirty.
    pub async fn run_command(&mut self, mut cmd: Command) -> Result<Document> {
        let was_in_transaction = self.in_transaction();
        self.bind_command(&mut cmd);
        let write_concern = cmd.write_concern().cloned();
        tracing::debug!(
            target: SESSION_TRACING_EVENT_TARGET,
            command = cmd.name(),
            database = cmd.target_db(),
            address = self.connection.address(),
            "executing command on session {:?}",
            self.server_session.id,
        );
        let reply = match self.connection.run_command(cmd).await {
            Ok(reply) => reply,
            Err(mut error) => {
                if error.is_network_error() {
                    self.mark_dirty();
                    if was_in_transaction {
                        error.add_label(TRANSIENT_TRANSACTION_ERROR);
                    }
                }
                return Err(error);
            }
        };
        self.update_session(&reply, write_concern.as_ref());
        operation::validate_reply(&reply)?;
        Ok(reply)
    }

    /// Applies a server reply to this session: advances the operation time when the triggering
    /// write concern was acknowledged, and captures any recovery token while a transaction is
    /// associated with the session.
    pub fn update_session(&mut self, reply: &Document, write_concern: Option<&WriteConcern>) {
        if !write_concern.map_or(true, WriteConcern::is_acknowledged) {
            return;
        }
        if let Some(Bson::Timestamp(operation_time)) = reply.get("operationTime") {
            self.advance_operation_time(*operation_time);
        }
        if self.transaction.state != TransactionState::None {
            if let Ok(token) = reply.get_document("recoveryToken") {
                self.transaction.recovery_token = Some(token.clone());
            }
        }
    }

    /// Starts a new transaction on this session. If no options are provided, the session's
    /// `default_transaction_options` will be used. This session must be passed into each
    /// operation within the transaction; otherwise, the operation will be executed outside of
    /// the transaction.
    pub fn start_transaction(
        &mut self,
        options: impl Into<Option<TransactionOptions>>,
    ) -> Result<()> {
        match self.transaction.state {
            TransactionState::Starting | TransactionState::InProgress => {
                return Err(Error::transaction_state("transaction already in progress"));
            }
            _ => {}
        }
        if self.wire_version() < MIN_SESSIONS_WIRE_VERSION {
            return Err(ErrorKind::SessionsNotSupported.into());
        }

        let options = match options.into() {
            Some(options) => Some(match self.default_transaction_options() {
                Some(defaults) => defaults.merged_into(options),
                None => options,
            }),
            None => self.default_transaction_options().cloned(),
        };
        if let Some(ref options) = options {
            if !options
                .write_concern
                .as_ref()
                .map(|wc| wc.is_acknowledged())
                .unwrap_or(true)
            {
                return Err(Error::transaction_state(
                    "transactions do not support unacknowledged write concerns",
                ));
            }
        }

        self.increment_txn_number();
        self.transaction.start(options);
        tracing::debug!(
            target: SESSION_TRACING_EVENT_TARGET,
            txn_number = self.server_session.txn_number,
            "transaction started",
        );
        Ok(())
    }

    /// Commits the transaction that is currently active on this session.
    ///
    /// A transaction that never bound a command commits without a network round trip. Once the
    /// commitTransaction command has been issued, the session transitions to the committed
    /// state even if the command failed; the error is surfaced to the caller, labeled
    /// `UnknownTransactionCommitResult` when the commit's fate on the server is undetermined.
    pub async fn commit_transaction(&mut self) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(Error::transaction_state("no transaction started")),
            TransactionState::Aborted => Err(Error::transaction_state(
                "Cannot call commitTransaction after calling abortTransaction",
            )),
            TransactionState::Committed => Ok(()),
            TransactionState::Starting => {
                self.transaction.commit();
                tracing::debug!(
                    target: SESSION_TRACING_EVENT_TARGET,
                    txn_number = self.server_session.txn_number,
                    "transaction committed without running commands",
                );
                Ok(())
            }
            TransactionState::InProgress => {
                let mut commit_transaction =
                    CommitTransaction::new(self.transaction.options.clone());
                let cmd = commit_transaction.build()?;
                self.transaction.commit();
                let result = self.execute_transaction_command(cmd).await;
                tracing::debug!(
                    target: SESSION_TRACING_EVENT_TARGET,
                    txn_number = self.server_session.txn_number,
                    success = result.is_ok(),
                    "transaction committed",
                );
                match result {
                    Ok(reply) => operation::handle_write_concern_only_response(&reply)
                        .map_err(Self::label_commit_error),
                    Err(error) => Err(Self::label_commit_error(error)),
                }
            }
        }
    }

    /// Aborts the transaction that is currently active on this session. Errors returned by the
    /// abortTransaction command are suppressed: aborting must never mask the failure that led
    /// to it.
    pub async fn abort_transaction(&mut self) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(Error::transaction_state("no transaction started")),
            TransactionState::Committed => Err(Error::transaction_state(
                "Cannot call abortTransaction after calling commitTransaction",
            )),
            TransactionState::Aborted => Ok(()),
            TransactionState::Starting => {
                self.transaction.abort();
                Ok(())
            }
            TransactionState::InProgress => {
                let write_concern = self
                    .transaction
                    .options
                    .as_ref()
                    .and_then(|options| options.write_concern.as_ref())
                    .cloned();
                let cmd = AbortTransaction::new(write_concern).build();
                self.transaction.abort();
                match cmd {
                    Ok(cmd) => {
                        if let Err(error) = self.execute_transaction_command(cmd).await {
                            tracing::warn!(
                                target: SESSION_TRACING_EVENT_TARGET,
                                error = %error,
                                "ignoring abortTransaction failure",
                            );
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            target: SESSION_TRACING_EVENT_TARGET,
                            error = %error,
                            "could not build abortTransaction command",
                        );
                    }
                }
                Ok(())
            }
        }
    }

    /// Issues a commit or abort command on the pinned connection. These build their own session
    /// envelope rather than passing through [`bind_command`](Self::bind_command): they carry
    /// the transaction's write concern, which in-transaction decoration strips.
    async fn execute_transaction_command(&mut self, mut cmd: Command) -> Result<Document> {
        cmd.set_lsid(self.server_session.id.clone());
        cmd.set_txn_number(self.server_session.txn_number);
        cmd.set_autocommit();
        if let Some(ref recovery_token) = self.transaction.recovery_token {
            cmd.set_recovery_token(recovery_token);
        }
        self.update_last_use();
        let reply = match self.connection.run_command(cmd).await {
            Ok(reply) => reply,
            Err(error) => {
                self.mark_dirty();
                return Err(error);
            }
        };
        self.update_session(&reply, None);
        Ok(reply)
    }

    fn label_commit_error(error: Error) -> Error {
        if error.is_unknown_transaction_commit_result() {
            error.with_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
        } else {
            error
        }
    }

    /// Ends this session, returning its server session to the client's pool. A transaction
    /// still in progress is aborted on a best-effort basis first.
    pub async fn end(mut self) {
        if self.transaction.state == TransactionState::InProgress {
            // abort_transaction never surfaces command errors.
            let _result = self.abort_transaction().await;
        }
        self.ended = true;
        let client = self.client.clone();
        let server_session = self.server_session.clone();
        client.check_in_server_session(server_session).await;
    }

    /// Ends this session if it was created implicitly, returning `None`. An explicit session is
    /// handed back unchanged for its owner to keep using.
    pub async fn end_implicit(self) -> Option<ClientSession> {
        if self.is_implicit {
            self.end().await;
            None
        } else {
            Some(self)
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            // Without a runtime the server session cannot be returned; losing it is safe, the
            // server expires it on its own.
            Err(_) => return,
        };
        let client = self.client.clone();
        let mut server_session = self.server_session.clone();
        if self.transaction.state == TransactionState::InProgress {
            let connection = self.connection.clone();
            let write_concern = self
                .transaction
                .options
                .as_ref()
                .and_then(|options| options.write_concern.as_ref())
                .cloned();
            let recovery_token = self.transaction.recovery_token.take();
            let txn_number = self.server_session.txn_number;
            let lsid = self.server_session.id.clone();
            handle.spawn(async move {
                match AbortTransaction::new(write_concern).build() {
                    Ok(mut cmd) => {
                        cmd.set_lsid(lsid);
                        cmd.set_txn_number(txn_number);
                        cmd.set_autocommit();
                        if let Some(ref recovery_token) = recovery_token {
                            cmd.set_recovery_token(recovery_token);
                        }
                        if let Err(error) = connection.run_command(cmd).await {
                            server_session.dirty = true;
                            tracing::warn!(
                                target: SESSION_TRACING_EVENT_TARGET,
                                error = %error,
                                "ignoring abortTransaction failure while dropping session",
                            );
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            target: SESSION_TRACING_EVENT_TARGET,
                            error = %error,
                            "could not build abortTransaction command while dropping session",
                        );
                    }
                }
                client.check_in_server_session(server_session).await;
            });
        } else {
            handle.spawn(async move {
                client.check_in_server_session(server_session).await;
            });
        }
    }
}

/// Client side abstraction of a server session. These are pooled and may be associated with
/// multiple `ClientSession`s over the course of their lifetime.
#[derive(Clone, Debug)]
pub(crate) struct ServerSession {
    /// The id of the server session to which this corresponds.
    pub(crate) id: Document,

    /// The last time an operation was executed with this session.
    pub(crate) last_use: Instant,

    /// Whether a network error was encountered while using this session.
    pub(crate) dirty: bool,

    /// A monotonically increasing transaction number for this session.
    pub(crate) txn_number: i64,
}

impl ServerSession {
    /// Creates a new session, generating the id client side.
    fn new() -> Self {
        let binary = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: Uuid::new_v4().as_bytes().to_vec(),
        });

        Self {
            id: doc! { "id": binary },
            last_use: Instant::now(),
            dirty: false,
            txn_number: 0,
        }
    }

    /// Determines if this server session is about to expire in a short amount of time (1
    /// minute).
    fn is_about_to_expire(&self, logical_session_timeout: Option<Duration>) -> bool {
        let timeout = match logical_session_timeout {
            Some(t) => t,
            None => return false,
        };
        let expiration_date = self.last_use + timeout;
        expiration_date < Instant::now() + Duration::from_secs(60)
    }
}
