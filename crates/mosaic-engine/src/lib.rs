#![doc = include_str!("../README.md")]

//! Fixpoint evaluation over partitioned colored Kripke structures.

pub mod checker;
pub mod error;
pub mod job;
pub mod queue;

pub use checker::ModelChecker;
pub use error::CheckError;
pub use job::{Job, JobKind};
pub use queue::{JobSink, SingleWorkerQueue};
