// src/state/cancel.rs

//! Shared cancellation token.
//!
//! One token is created lazily by whichever node in a tree needs it first
//! and is then cloned into every node created afterwards. Cancelling it is
//! visible to every holder without locking; nodes observe it cooperatively
//! from `check()` and `done()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheaply-cloneable cancellation flag shared by a whole state tree.
///
/// May be set from any thread (e.g. a signal handler or a UI thread); the
/// tree only reads it between units of work.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the whole tree as cancelled.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_visible_to_clones() {
        let token = Cancellation::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = Cancellation::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
