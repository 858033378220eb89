//! Mount reconciliation for the external backup disk.

pub mod reconciler;

pub use reconciler::{MountReconciler, MountState};
