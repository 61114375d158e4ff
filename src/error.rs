//! Contains the `Error` and `Result` types that `mongocore` uses.

use std::{collections::HashSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transient transaction error label. This label will be added to a network error or server
/// selection error that occurs during a transaction.
pub const TRANSIENT_TRANSACTION_ERROR: &str = "TransientTransactionError";

/// Unknown transaction commit result error label. This label will be added to a server selection
/// error, network error, MaxTimeMSExpired error, or write concern failed/timeout error that
/// occurs during a commitTransaction.
pub const UNKNOWN_TRANSACTION_COMMIT_RESULT: &str = "UnknownTransactionCommitResult";

const UNKNOWN_TRANSACTION_COMMIT_RESULT_LABEL_CODES: [i32; 3] = [50, 64, 91];

/// The result type for all methods that can return an error in the `mongocore` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `mongocore` crate. The inner [`ErrorKind`] is wrapped in a
/// `Box` to keep the type small enough to pass around cheaply.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, labels: {labels:?}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,

    labels: HashSet<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, labels: Option<impl IntoIterator<Item = String>>) -> Self {
        let mut labels: HashSet<String> = labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        if let Some(wc_error) = kind.get_write_concern_error() {
            labels.extend(wc_error.labels.clone());
        }
        Self {
            kind: Box::new(kind),
            labels,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Error {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Error {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn transaction_state(message: impl Into<String>) -> Error {
        ErrorKind::Transaction {
            message: message.into(),
        }
        .into()
    }

    /// The labels attached to this error.
    pub fn labels(&self) -> &HashSet<String> {
        &self.labels
    }

    /// Whether this error contains the specified label.
    pub fn contains_label<T: AsRef<str>>(&self, label: T) -> bool {
        self.labels.contains(label.as_ref())
    }

    /// Attach the given label to this error.
    pub(crate) fn add_label<T: AsRef<str>>(&mut self, label: T) {
        self.labels.insert(label.as_ref().to_string());
    }

    pub(crate) fn with_label<T: AsRef<str>>(mut self, label: T) -> Self {
        self.add_label(label);
        self
    }

    /// Whether this error came from the transport rather than the server.
    pub(crate) fn is_network_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(..))
    }

    /// Whether a session checkout that failed with this error may be retried after a delay.
    /// Topologies signal transient unavailability with a server selection error.
    pub(crate) fn is_checkout_retryable(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::ServerSelection { .. })
    }

    /// Whether the outcome of a commitTransaction that failed with this error is unknown, i.e.
    /// whether the commit could still have satisfied its write concern on the server.
    pub(crate) fn is_unknown_transaction_commit_result(&self) -> bool {
        match self.kind.as_ref() {
            ErrorKind::Io(..) | ErrorKind::ServerSelection { .. } => true,
            ErrorKind::Command(ref error) => {
                UNKNOWN_TRANSACTION_COMMIT_RESULT_LABEL_CODES.contains(&error.code)
            }
            ErrorKind::Write(WriteFailure::WriteConcernError(..)) => true,
            _ => false,
        }
    }

    /// The server-reported code of this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(ref error) => Some(error.code),
            ErrorKind::Write(WriteFailure::WriteConcernError(ref error)) => Some(error.code),
            _ => None,
        }
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self::new(err.into(), None::<Option<String>>)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// The types of errors that can occur.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument {
        /// A description of the error.
        message: String,
    },

    /// Wrapper around `bson::de::Error`.
    #[error("{0}")]
    BsonDeserialization(#[from] bson::de::Error),

    /// Wrapper around `bson::ser::Error`.
    #[error("{0}")]
    BsonSerialization(#[from] bson::ser::Error),

    /// The server returned an error to an attempted operation.
    #[error("Command failed: {0}")]
    Command(CommandError),

    /// An unexpected failure inside the crate itself.
    #[error("Internal error: {message}")]
    #[non_exhaustive]
    Internal {
        /// A description of the error.
        message: String,
    },

    /// Wrapper around [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server returned an invalid reply to a database operation.
    #[error("The server returned an invalid reply to a database operation: {message}")]
    #[non_exhaustive]
    InvalidResponse {
        /// A description of the error.
        message: String,
    },

    /// The topology was not able to select a server for the operation. Raised by topologies to
    /// signal transient unavailability; session checkout sleeps and retries on it.
    #[error("{message}")]
    #[non_exhaustive]
    ServerSelection {
        /// A description of the error.
        message: String,
    },

    /// The deployment does not support sessions.
    #[error("Attempted to start a session on a deployment that does not support sessions")]
    SessionsNotSupported,

    /// An operation was requested in a session state that does not allow it, or an error
    /// occurred during a transaction.
    #[error("{message}")]
    #[non_exhaustive]
    Transaction {
        /// A description of the error.
        message: String,
    },

    /// The server could not satisfy the write concern of a commit or abort.
    #[error("An error occurred when trying to execute a write operation: {0:?}")]
    Write(WriteFailure),

    /// The `with_transaction` callback returned an error or panicked.
    #[error("The transaction callback failed: {message}")]
    #[non_exhaustive]
    Callback {
        /// A description of the error.
        message: String,
    },
}

impl ErrorKind {
    fn get_write_concern_error(&self) -> Option<&WriteConcernError> {
        match self {
            ErrorKind::Write(WriteFailure::WriteConcernError(wc_error)) => Some(wc_error),
            _ => None,
        }
    }
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct CommandError {
    /// Identifies the type of error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "Error code {} ({}): {}",
            self.code, self.code_name, self.message
        )
    }
}

/// An error that occurred due to not being able to satisfy a write concern.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct WriteConcernError {
    /// Identifies the type of write concern error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,

    /// Labels categorizing the error, as reported by the server.
    #[serde(rename = "errorLabels", default)]
    pub labels: Vec<String>,
}

/// An error that occurred when trying to execute a write operation.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum WriteFailure {
    /// The write concern was not satisfied.
    WriteConcernError(WriteConcernError),
}
