use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::{
    bson::{Bson, Document, Timestamp},
    concern::{ReadConcern, ReadConcernInternal, ReadConcernLevel, WriteConcern},
    error::Result,
};

/// Driver-side model of a database command. The session core decorates commands with session
/// and transaction metadata before they are framed onto the wire; every optional field that is
/// unset is omitted from the serialized document rather than sent as null.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(skip)]
    pub(crate) name: String,

    #[serde(flatten)]
    pub(crate) body: Document,

    #[serde(rename = "$db")]
    pub(crate) target_db: String,

    pub(crate) lsid: Option<Document>,

    pub(crate) txn_number: Option<i64>,

    start_transaction: Option<bool>,

    autocommit: Option<bool>,

    read_concern: Option<ReadConcernInternal>,

    #[serde(skip_serializing_if = "write_concern_is_empty")]
    write_concern: Option<WriteConcern>,

    recovery_token: Option<Document>,
}

fn write_concern_is_empty(write_concern: &Option<WriteConcern>) -> bool {
    write_concern
        .as_ref()
        .map_or(true, |write_concern| write_concern.is_empty())
}

impl Command {
    /// Creates a command with the given name, target database, and body. The name must match the
    /// first key of the body.
    ///
    /// A `readConcern` or `writeConcern` inlined in the body is honored: session decoration
    /// merges into or strips the body key in place, and the typed
    /// [`set_read_concern`](Self::set_read_concern)/[`set_write_concern`](Self::set_write_concern)
    /// setters replace it, so a command never carries two copies of either key.
    pub fn new(name: impl ToString, target_db: impl ToString, body: Document) -> Self {
        Self {
            name: name.to_string(),
            target_db: target_db.to_string(),
            body,
            lsid: None,
            txn_number: None,
            start_transaction: None,
            autocommit: None,
            read_concern: None,
            write_concern: None,
            recovery_token: None,
        }
    }

    /// The name of this command, i.e. the first key of its body.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database this command targets.
    pub fn target_db(&self) -> &str {
        &self.target_db
    }

    /// Sets a read concern supplied by the caller, replacing any `readConcern` inlined in the
    /// body. Sessions may augment or strip it during decoration depending on their transaction
    /// state.
    pub fn set_read_concern(&mut self, read_concern: ReadConcern) {
        self.body.remove("readConcern");
        self.read_concern = Some(read_concern.into());
    }

    /// Sets a write concern supplied by the caller, replacing any `writeConcern` inlined in the
    /// body. Stripped again for commands bound inside a transaction, where a write concern is
    /// only valid on the commit or abort itself.
    pub fn set_write_concern(&mut self, write_concern: WriteConcern) {
        self.body.remove("writeConcern");
        self.write_concern = Some(write_concern);
    }

    pub(crate) fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern.as_ref()
    }

    pub(crate) fn set_lsid(&mut self, lsid: Document) {
        self.lsid = Some(lsid);
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.txn_number = Some(txn_number);
    }

    pub(crate) fn set_start_transaction(&mut self) {
        self.start_transaction = Some(true);
    }

    pub(crate) fn set_autocommit(&mut self) {
        self.autocommit = Some(false);
    }

    pub(crate) fn set_recovery_token(&mut self, recovery_token: &Document) {
        self.recovery_token = Some(recovery_token.clone());
    }

    /// Sets the read concern level for this command without overwriting any other read concern
    /// options. A read concern map the caller inlined in the body is updated in place.
    pub(crate) fn set_read_concern_level(&mut self, level: ReadConcernLevel) {
        match self.body.get_mut("readConcern") {
            Some(Bson::Document(read_concern)) => {
                read_concern.insert("level", level.as_str());
            }
            // A malformed read concern is left for the server to reject.
            Some(_) => {}
            None => {
                let inner = self.read_concern.get_or_insert(ReadConcernInternal {
                    level: None,
                    after_cluster_time: None,
                });
                inner.level = Some(level);
            }
        }
    }

    /// Sets `readConcern.afterClusterTime`, preserving any caller-supplied level. The timestamp
    /// is merged into a read concern map the caller inlined in the body, so exactly one merged
    /// `readConcern` reaches the wire.
    pub(crate) fn set_after_cluster_time(&mut self, operation_time: Timestamp) {
        match self.body.get_mut("readConcern") {
            Some(Bson::Document(read_concern)) => {
                read_concern.insert("afterClusterTime", operation_time);
            }
            // A malformed read concern is left for the server to reject.
            Some(_) => {}
            None => {
                let inner = self.read_concern.get_or_insert(ReadConcernInternal {
                    level: None,
                    after_cluster_time: None,
                });
                inner.after_cluster_time = Some(operation_time);
            }
        }
    }

    pub(crate) fn clear_write_concern(&mut self) {
        self.write_concern = None;
        self.body.remove("writeConcern");
    }

    pub(crate) fn clear_concerns(&mut self) {
        self.read_concern = None;
        self.write_concern = None;
        self.body.remove("readConcern");
        self.body.remove("writeConcern");
    }

    /// Serializes this command into the document that is framed onto the wire. Unset fields are
    /// filtered out entirely.
    pub fn into_document(self) -> Result<Document> {
        Ok(bson::to_document(&self)?)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        bson::{doc, Bson, Timestamp},
        concern::{Acknowledgment, ReadConcern, WriteConcern},
    };

    use super::Command;

    #[test]
    fn serialization_filters_absent_fields() {
        let cmd = Command::new("find", "db", doc! { "find": "coll" });
        let doc = cmd.into_document().unwrap();
        assert_eq!(doc, doc! { "find": "coll", "$db": "db" });
    }

    #[test]
    fn decorated_command_has_documented_shape() {
        let mut cmd = Command::new("insert", "db", doc! { "insert": "coll" });
        cmd.set_lsid(doc! { "id": 42 });
        cmd.set_txn_number(1);
        cmd.set_start_transaction();
        cmd.set_autocommit();
        let doc = cmd.into_document().unwrap();
        assert_eq!(doc.get_document("lsid").unwrap(), &doc! { "id": 42 });
        assert_eq!(doc.get("txnNumber"), Some(&Bson::Int64(1)));
        assert_eq!(doc.get_bool("startTransaction"), Ok(true));
        assert_eq!(doc.get_bool("autocommit"), Ok(false));
    }

    #[test]
    fn empty_write_concern_is_omitted() {
        let mut cmd = Command::new("insert", "db", doc! { "insert": "coll" });
        cmd.set_write_concern(WriteConcern::builder().build());
        let doc = cmd.into_document().unwrap();
        assert!(!doc.contains_key("writeConcern"));

        let mut cmd = Command::new("insert", "db", doc! { "insert": "coll" });
        cmd.set_write_concern(WriteConcern::builder().w(Acknowledgment::Nodes(1)).build());
        let doc = cmd.into_document().unwrap();
        assert_eq!(doc.get_document("writeConcern").unwrap(), &doc! { "w": 1 });
    }

    #[test]
    fn after_cluster_time_preserves_caller_level() {
        let mut cmd = Command::new("find", "db", doc! { "find": "coll" });
        cmd.set_read_concern(ReadConcern::majority());
        cmd.set_after_cluster_time(Timestamp {
            time: 42,
            increment: 1,
        });
        let doc = cmd.into_document().unwrap();
        let read_concern = doc.get_document("readConcern").unwrap();
        assert_eq!(read_concern.get_str("level"), Ok("majority"));
        assert_eq!(
            read_concern.get("afterClusterTime"),
            Some(&Bson::Timestamp(Timestamp {
                time: 42,
                increment: 1
            }))
        );
    }

    #[test]
    fn after_cluster_time_merges_into_body_read_concern() {
        let mut cmd = Command::new(
            "find",
            "db",
            doc! { "find": "coll", "readConcern": { "level": "majority" } },
        );
        cmd.set_after_cluster_time(Timestamp {
            time: 42,
            increment: 1,
        });
        let doc = cmd.into_document().unwrap();
        assert_eq!(
            doc.get_document("readConcern").unwrap(),
            &doc! {
                "level": "majority",
                "afterClusterTime": Bson::Timestamp(Timestamp {
                    time: 42,
                    increment: 1
                }),
            }
        );
    }

    #[test]
    fn typed_concerns_replace_body_inlined_keys() {
        let mut cmd = Command::new(
            "find",
            "db",
            doc! { "find": "coll", "readConcern": { "level": "local" } },
        );
        cmd.set_read_concern(ReadConcern::majority());
        let doc = cmd.into_document().unwrap();
        assert_eq!(
            doc.get_document("readConcern").unwrap(),
            &doc! { "level": "majority" }
        );

        let mut cmd = Command::new(
            "insert",
            "db",
            doc! { "insert": "coll", "writeConcern": { "w": 2 } },
        );
        cmd.set_write_concern(WriteConcern::builder().w(Acknowledgment::Nodes(1)).build());
        let doc = cmd.into_document().unwrap();
        assert_eq!(doc.get_document("writeConcern").unwrap(), &doc! { "w": 1 });
    }

    #[test]
    fn clear_concerns_strips_stray_body_keys() {
        let mut cmd = Command::new(
            "insert",
            "db",
            doc! { "insert": "coll", "writeConcern": { "w": 1 } },
        );
        cmd.set_read_concern(ReadConcern::local());
        cmd.clear_concerns();
        let doc = cmd.into_document().unwrap();
        assert!(!doc.contains_key("readConcern"));
        assert!(!doc.contains_key("writeConcern"));
    }
}
