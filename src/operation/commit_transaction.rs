use crate::{
    bson::doc,
    client::options::TransactionOptions,
    conn::Command,
    error::Result,
    operation::append_options,
};

pub(crate) struct CommitTransaction {
    options: Option<TransactionOptions>,
}

impl CommitTransaction {
    pub(crate) const NAME: &'static str = "commitTransaction";

    pub(crate) fn new(options: Option<TransactionOptions>) -> Self {
        Self { options }
    }

    pub(crate) fn build(&mut self) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };

        if let Some(ref mut options) = self.options {
            if options
                .write_concern
                .as_ref()
                .map_or(false, |wc| wc.is_empty())
            {
                options.write_concern = None;
            }
        }
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, "admin", body))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        bson::doc,
        client::options::TransactionOptions,
        concern::{Acknowledgment, WriteConcern},
    };

    use super::CommitTransaction;

    #[test]
    fn build() {
        let mut op = CommitTransaction::new(Some(
            TransactionOptions::builder()
                .write_concern(
                    WriteConcern::builder()
                        .w(Acknowledgment::Custom("abc".to_string()))
                        .build(),
                )
                .max_commit_time(Duration::from_millis(5000))
                .build(),
        ));

        let cmd = op.build().expect("build should succeed");
        assert_eq!(cmd.name(), "commitTransaction");
        assert_eq!(cmd.target_db(), "admin");
        assert_eq!(
            cmd.body,
            doc! {
                "commitTransaction": 1,
                "writeConcern": { "w": "abc" },
                "maxTimeMS": 5000,
            }
        );

        let mut op = CommitTransaction::new(None);
        let cmd = op.build().expect("build should succeed");
        assert_eq!(
            cmd.body,
            doc! {
                "commitTransaction": 1,
            }
        );
    }

    #[test]
    fn build_omits_empty_write_concern() {
        let mut op = CommitTransaction::new(Some(
            TransactionOptions::builder()
                .write_concern(WriteConcern::builder().build())
                .build(),
        ));
        let cmd = op.build().expect("build should succeed");
        assert_eq!(cmd.body, doc! { "commitTransaction": 1 });
    }
}
