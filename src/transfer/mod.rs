//! Transfer of backup files from the source tree onto the cold disk.

pub mod engine;
pub mod naming;
pub mod source;

pub use engine::{LoopExit, TransferEngine, TransferOutcome, TransferRecord, TransferSummary};
