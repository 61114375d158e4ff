use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson_util,
    concern::{ReadConcern, WriteConcern},
    error::Result,
};

/// Contains the options that can be used to create a new [`ClientSession`](crate::ClientSession).
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into, strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SessionOptions {
    /// If true, read operations performed using this session are decorated with
    /// `readConcern.afterClusterTime`, guaranteeing the session observes its own writes and any
    /// writes whose cluster time it has seen. Defaults to false.
    pub causal_consistency: Option<bool>,

    /// The default options to use for transactions started on this session.
    ///
    /// If these options are not specified, they will be inherited from the
    /// [`Client`](crate::Client) associated with this session.
    pub default_transaction_options: Option<TransactionOptions>,
}

impl SessionOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(ref options) = self.default_transaction_options {
            if let Some(ref write_concern) = options.write_concern {
                write_concern.validate()?;
            }
        }
        Ok(())
    }
}

/// Contains the options that can be used for a transaction.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into, strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TransactionOptions {
    /// The read concern to use for the transaction. Applied to the command that starts the
    /// transaction rather than serialized with these options.
    #[serde(skip_serializing)]
    pub read_concern: Option<ReadConcern>,

    /// The write concern to use when committing or aborting a transaction.
    pub write_concern: Option<WriteConcern>,

    /// The maximum amount of time to allow a single commitTransaction to run.
    #[serde(
        serialize_with = "bson_util::serialize_duration_option_as_int_millis",
        deserialize_with = "bson_util::deserialize_duration_option_from_u64_millis",
        rename(serialize = "maxTimeMS", deserialize = "maxCommitTimeMS"),
        default
    )]
    pub max_commit_time: Option<Duration>,
}

impl TransactionOptions {
    /// Fills unset fields of `options` from these defaults.
    pub(crate) fn merged_into(&self, mut options: TransactionOptions) -> TransactionOptions {
        if options.read_concern.is_none() {
            options.read_concern = self.read_concern.clone();
        }
        if options.write_concern.is_none() {
            options.write_concern = self.write_concern.clone();
        }
        if options.max_commit_time.is_none() {
            options.max_commit_time = self.max_commit_time;
        }
        options
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        bson::doc,
        concern::{Acknowledgment, ReadConcern, WriteConcern},
    };

    use super::TransactionOptions;

    #[test]
    fn transaction_options_serialize_for_commit() {
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::majority())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Nodes(1)).build())
            .max_commit_time(Duration::from_millis(10000))
            .build();
        let doc = bson::to_document(&options).expect("serialization should succeed");
        // The read concern travels on the transaction's first command, not on the commit.
        assert_eq!(
            doc,
            doc! { "writeConcern": { "w": 1 }, "maxTimeMS": 10000 }
        );
    }

    #[test]
    fn defaults_fill_unset_fields_only() {
        let defaults = TransactionOptions::builder()
            .read_concern(ReadConcern::majority())
            .max_commit_time(Duration::from_millis(5000))
            .build();
        let merged = defaults.merged_into(
            TransactionOptions::builder()
                .read_concern(ReadConcern::local())
                .build(),
        );
        assert_eq!(merged.read_concern, Some(ReadConcern::local()));
        assert_eq!(merged.max_commit_time, Some(Duration::from_millis(5000)));
        assert!(merged.write_concern.is_none());
    }
}
