//! Epoch committer.
//!
//! [`RootWriter`] stages writes and periodically commits them: one chunk per
//! touched topic, then a new directory version, then the root pointer.
//! [`EpochWorker`] drives `run_epoch` on a timer.

mod root_writer;
mod worker;

pub use root_writer::{EpochOutcome, EpochPhase, EpochSummary, RootWriter, TopicSummary};
pub use worker::{EpochWorker, EpochWorkerHandle};
