// src/lib.rs

//! Zest package-management backend
//!
//! The backend's long-running operations (refresh a repository, resolve a
//! transaction, install packages) nest many levels deep, and every level
//! must report progress, accept cancellation and hold resource locks. This
//! crate is the coordinator those operations are built on:
//!
//! - [`State`]: a tree of cooperating nodes reporting one monotonically
//!   increasing 0-100% value at the root, with AND-reduced cancellability
//!   and named-activity propagation
//! - [`Cancellation`]: a shared token, created lazily and observed
//!   cooperatively between units of work
//! - [`LockManager`]: named resource claims whose release is tied to node
//!   completion rather than explicit caller cleanup
//! - [`monitor`]: log and console-bar observers for the events the tree
//!   raises
//!
//! The coordinator does no I/O and runs no threads of its own; it is a
//! bookkeeping and signalling primitive invoked synchronously by the code
//! doing the actual work.

mod error;
pub mod lock;
pub mod monitor;
pub mod state;

pub use error::{Error, ErrorAction, Result};
pub use lock::{LockId, LockKind, LockManager, LockMode, LockPolicy};
pub use monitor::{BarMonitor, LogMonitor, MonitorGuard};
pub use state::{Action, ActionChange, Cancellation, HandlerId, PackageProgress, State};
