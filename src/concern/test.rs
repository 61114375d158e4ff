use std::time::Duration;

use crate::{
    bson::{doc, Bson},
    concern::{Acknowledgment, ReadConcern, ReadConcernInternal, WriteConcern},
};

#[test]
fn write_concern_is_acknowledged() {
    let w_1 = WriteConcern::builder()
        .w(Acknowledgment::Nodes(1))
        .journal(false)
        .build();
    assert!(w_1.is_acknowledged());

    let w_majority = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .journal(false)
        .build();
    assert!(w_majority.is_acknowledged());

    let w_0 = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(false)
        .build();
    assert!(!w_0.is_acknowledged());

    let w_0 = WriteConcern::builder().w(Acknowledgment::Nodes(0)).build();
    assert!(!w_0.is_acknowledged());

    let w_0_journaled = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(true)
        .build();
    assert!(w_0_journaled.is_acknowledged());

    let empty = WriteConcern::builder().build();
    assert!(empty.is_acknowledged());
}

#[test]
fn write_concern_validate() {
    let w_0_j_true = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(true)
        .build();
    w_0_j_true.validate().expect_err("w=0 and j=true is invalid");

    let negative = WriteConcern::builder().w(Acknowledgment::Nodes(-1)).build();
    negative.validate().expect_err("negative w is invalid");

    let majority = WriteConcern::builder().w(Acknowledgment::Majority).build();
    majority.validate().expect("majority is valid");
}

#[test]
fn write_concern_serialize() {
    let wc = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .w_timeout(Duration::from_millis(100))
        .journal(true)
        .build();
    let doc = bson::to_document(&wc).expect("serialization should succeed");
    assert_eq!(doc, doc! { "w": "majority", "wtimeout": 100, "j": true });

    let wc = WriteConcern::builder().w(Acknowledgment::Nodes(2)).build();
    let doc = bson::to_document(&wc).expect("serialization should succeed");
    assert_eq!(doc, doc! { "w": 2 });
}

#[test]
fn write_concern_deserialize() {
    let w_1 = doc! { "w": 1 };
    let wc: WriteConcern = bson::from_bson(Bson::Document(w_1)).unwrap();
    assert_eq!(
        wc,
        WriteConcern {
            w: Acknowledgment::Nodes(1).into(),
            w_timeout: None,
            journal: None
        }
    );

    let w_timeout = doc! { "w": "majority", "wtimeout": 100 };
    let wc: WriteConcern = bson::from_bson(Bson::Document(w_timeout)).unwrap();
    assert_eq!(
        wc,
        WriteConcern {
            w: Acknowledgment::Majority.into(),
            w_timeout: Duration::from_millis(100).into(),
            journal: None
        }
    );

    let custom = doc! { "w": "myTag", "j": true };
    let wc: WriteConcern = bson::from_bson(Bson::Document(custom)).unwrap();
    assert_eq!(
        wc,
        WriteConcern {
            w: Acknowledgment::Custom("myTag".to_string()).into(),
            w_timeout: None,
            journal: Some(true)
        }
    );
}

#[test]
fn read_concern_serialize() {
    let rc = ReadConcern::majority();
    let doc = bson::to_document(&rc).expect("serialization should succeed");
    assert_eq!(doc, doc! { "level": "majority" });

    let internal: ReadConcernInternal = ReadConcern::local().into();
    let doc = bson::to_document(&internal).expect("serialization should succeed");
    assert_eq!(doc, doc! { "level": "local" });
}
