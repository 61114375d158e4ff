//! Models of the commands the session core issues itself, together with the shared plumbing for
//! building command bodies and validating server replies.

mod abort_transaction;
mod commit_transaction;

pub(crate) use abort_transaction::AbortTransaction;
pub(crate) use commit_transaction::CommitTransaction;

use serde::{Deserialize, Serialize};

use crate::{
    bson::{Bson, Document},
    bson_util,
    error::{CommandError, Error, ErrorKind, Result, WriteConcernError, WriteFailure},
};

/// Appends a serializable options value into a command body. Fields that are unset are dropped
/// rather than appended as null.
pub(crate) fn append_options<T: Serialize>(doc: &mut Document, options: Option<&T>) -> Result<()> {
    match options {
        Some(options) => {
            let temp_doc = bson::to_bson(options)?;
            match temp_doc {
                Bson::Document(d) => {
                    doc.extend(d);
                    Ok(())
                }
                _ => Err(Error::internal("options did not serialize to a Document")),
            }
        }
        None => Ok(()),
    }
}

/// Checks a server reply for `ok: 0` and surfaces it as a command error, with any error labels
/// the server attached.
pub(crate) fn validate_reply(reply: &Document) -> Result<()> {
    if bson_util::is_success(reply) {
        return Ok(());
    }
    let body: CommandErrorBody = bson::from_document(reply.clone())
        .map_err(|e| Error::invalid_response(format!("invalid server error response: {e}")))?;
    Err(Error::new(
        ErrorKind::Command(body.command_error),
        body.error_labels,
    ))
}

#[derive(Debug, Deserialize)]
struct CommandErrorBody {
    #[serde(flatten)]
    command_error: CommandError,

    #[serde(rename = "errorLabels")]
    error_labels: Option<Vec<String>>,
}

/// Body of a write response that could possibly have a write concern error but not write errors.
#[derive(Debug, Deserialize, Default, Clone)]
pub(crate) struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    pub(crate) fn validate(&self) -> Result<()> {
        match self.write_concern_error {
            Some(ref wc_error) => Err(Error::new(
                ErrorKind::Write(WriteFailure::WriteConcernError(wc_error.clone())),
                self.labels.clone(),
            )),
            None => Ok(()),
        }
    }
}

/// Validates a reply to a commit or abort: first the `ok` field, then any write concern error.
pub(crate) fn handle_write_concern_only_response(reply: &Document) -> Result<()> {
    validate_reply(reply)?;
    let body: WriteConcernOnlyBody = bson::from_document(reply.clone())
        .map_err(|e| Error::invalid_response(format!("invalid server response: {e}")))?;
    body.validate()
}
