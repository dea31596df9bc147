#![deny(unreachable_pub)]

//! Shared data model for the job coordinator: job keys, job records,
//! worker records, validators, configuration, and the error type
//! surfaced by coordinator operations.

pub mod blacklist;
pub mod config;
pub mod error;
pub mod job;
pub mod validators;
pub mod worker;

pub use error::{CoordinatorError, ErrorKind};
