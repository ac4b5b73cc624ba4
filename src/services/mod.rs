//! Domain services.
//!
//! `CommitService`, `BranchService` and `SnapshotService` each own one kind of
//! record; `VersionControl` sequences them into the operations exposed over HTTP.

mod branch;
mod commit;
mod snapshot;
mod version_control;

pub use branch::*;
pub use commit::*;
pub use snapshot::*;
pub use version_control::*;
