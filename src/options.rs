//! Contains all of the types needed to specify options to the methods in this crate.

pub use crate::{
    client::options::{SessionOptions, TransactionOptions},
    concern::{Acknowledgment, ReadConcern, ReadConcernLevel, WriteConcern},
};
