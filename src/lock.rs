// src/lock.rs

//! Named resource claims with completion-bound release.
//!
//! A package backend serialises access to a handful of system resources:
//! the installed-package database, repository caches, downloaded files and
//! so on. `LockManager` grants claims on those resources, refcounted per
//! kind, and in process mode additionally holds an exclusive flock on a
//! pid file so concurrent processes exclude each other.
//!
//! The progress coordinator records the granted [`LockId`]s against the
//! node that took them and releases them exactly once when the node
//! reaches 100% (or is torn down), so callers get scope-bound release
//! without explicit cleanup. The [`LockPolicy`] trait is the seam between
//! the two; tests inject recording fakes through it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use fs2::FileExt;
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::error::{Error, Result};

/// The system resources a backend claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum LockKind {
    Database,
    Repository,
    Metadata,
    Download,
    Config,
    History,
}

/// Scope of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LockMode {
    /// In-process claim, refcounted only.
    Thread,
    /// Also excludes other processes via a flocked pid file.
    Process,
}

/// Handle to one granted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId(pub(crate) u64);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The seam the progress coordinator takes and releases claims through.
pub trait LockPolicy {
    fn take(&self, kind: LockKind, mode: LockMode) -> Result<LockId>;
    fn release(&self, id: LockId) -> Result<()>;
}

struct LockFile {
    file: fs::File,
    path: PathBuf,
}

#[derive(Default)]
struct ManagerInner {
    next_id: u64,
    holds: HashMap<u64, (LockKind, LockMode)>,
    process_counts: HashMap<LockKind, u32>,
    process_files: HashMap<LockKind, LockFile>,
}

/// Grants refcounted claims; the default `LockPolicy` implementation.
pub struct LockManager {
    dir: PathBuf,
    inner: RefCell<ManagerInner>,
}

impl LockManager {
    /// Manager whose process-mode pid files live under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Rc<Self> {
        Rc::new(Self {
            dir: dir.into(),
            inner: RefCell::new(ManagerInner::default()),
        })
    }

    /// Path of the pid file guarding `kind`.
    pub fn lock_path(&self, kind: LockKind) -> PathBuf {
        self.dir.join(format!("{kind}.lock"))
    }

    /// Whether any claim of `kind` is currently held through this manager.
    pub fn is_locked(&self, kind: LockKind) -> bool {
        self.inner
            .borrow()
            .holds
            .values()
            .any(|(held, _)| *held == kind)
    }

    fn acquire_file(&self, kind: LockKind) -> Result<LockFile> {
        let path = self.lock_path(kind);
        // no truncate before the flock is ours, the file may be live
        let mut file = OpenOptions::new().create(true).write(true).open(&path)?;
        file.try_lock_exclusive().map_err(|err| {
            Error::LockUnavailable(format!("{kind} is held by another process: {err}"))
        })?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(LockFile { file, path })
    }
}

impl LockPolicy for LockManager {
    fn take(&self, kind: LockKind, mode: LockMode) -> Result<LockId> {
        if mode == LockMode::Process && !self.inner.borrow().process_files.contains_key(&kind) {
            let lock_file = self.acquire_file(kind)?;
            self.inner.borrow_mut().process_files.insert(kind, lock_file);
        }
        let mut inner = self.inner.borrow_mut();
        if mode == LockMode::Process {
            *inner.process_counts.entry(kind).or_insert(0) += 1;
        }
        let id = LockId(inner.next_id);
        inner.next_id += 1;
        inner.holds.insert(id.0, (kind, mode));
        debug!("granted {kind} lock {id} ({mode})");
        Ok(id)
    }

    fn release(&self, id: LockId) -> Result<()> {
        let removed_file = {
            let mut inner = self.inner.borrow_mut();
            let (kind, mode) = inner
                .holds
                .remove(&id.0)
                .ok_or_else(|| Error::InvalidState(format!("lock {id} is not held")))?;
            debug!("released {kind} lock {id} ({mode})");
            if mode != LockMode::Process {
                return Ok(());
            }
            let count = inner
                .process_counts
                .get_mut(&kind)
                .expect("process hold without refcount");
            *count -= 1;
            if *count > 0 {
                return Ok(());
            }
            inner.process_counts.remove(&kind);
            inner.process_files.remove(&kind)
        };
        if let Some(lock_file) = removed_file {
            let path = lock_file.path.clone();
            // closing the handle drops the flock before the unlink
            drop(lock_file);
            if let Err(err) = fs::remove_file(&path) {
                debug!("could not remove {}: {err}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_thread_lock_has_no_file() {
        let dir = tempdir().unwrap();
        let manager = LockManager::new(dir.path());

        let id = manager.take(LockKind::Metadata, LockMode::Thread).unwrap();
        assert!(manager.is_locked(LockKind::Metadata));
        assert!(!manager.lock_path(LockKind::Metadata).exists());

        manager.release(id).unwrap();
        assert!(!manager.is_locked(LockKind::Metadata));
    }

    #[test]
    fn test_process_lock_writes_pid_file() {
        let dir = tempdir().unwrap();
        let manager = LockManager::new(dir.path());

        let id = manager.take(LockKind::Database, LockMode::Process).unwrap();
        let path = manager.lock_path(LockKind::Database);
        assert!(path.exists());
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        manager.release(id).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_process_lock_is_refcounted() {
        let dir = tempdir().unwrap();
        let manager = LockManager::new(dir.path());

        let first = manager.take(LockKind::Repository, LockMode::Process).unwrap();
        let second = manager.take(LockKind::Repository, LockMode::Process).unwrap();
        assert_ne!(first, second);

        manager.release(first).unwrap();
        assert!(manager.lock_path(LockKind::Repository).exists());

        manager.release(second).unwrap();
        assert!(!manager.lock_path(LockKind::Repository).exists());
    }

    #[test]
    fn test_contended_process_lock_fails() {
        let dir = tempdir().unwrap();
        let holder = LockManager::new(dir.path());
        let contender = LockManager::new(dir.path());

        let id = holder.take(LockKind::Database, LockMode::Process).unwrap();
        assert!(matches!(
            contender.take(LockKind::Database, LockMode::Process),
            Err(Error::LockUnavailable(_))
        ));

        holder.release(id).unwrap();
        let taken = contender.take(LockKind::Database, LockMode::Process).unwrap();
        contender.release(taken).unwrap();
    }

    #[test]
    fn test_release_unknown_id_fails() {
        let dir = tempdir().unwrap();
        let manager = LockManager::new(dir.path());

        let id = manager.take(LockKind::Config, LockMode::Thread).unwrap();
        manager.release(id).unwrap();
        assert!(matches!(manager.release(id), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_kinds_are_independent() {
        let dir = tempdir().unwrap();
        let manager = LockManager::new(dir.path());

        let db = manager.take(LockKind::Database, LockMode::Process).unwrap();
        let repo = manager.take(LockKind::Repository, LockMode::Process).unwrap();

        manager.release(db).unwrap();
        assert!(!manager.lock_path(LockKind::Database).exists());
        assert!(manager.lock_path(LockKind::Repository).exists());
        manager.release(repo).unwrap();
    }
}
