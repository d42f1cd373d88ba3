//! Scoped reader/writer access to a shared table.

use std::fmt;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, LockMode, Result};

/// Shared read access, released when dropped.
pub type ReadGuard<'a, T> = RwLockReadGuard<'a, T>;

/// Exclusive write access, released when dropped.
pub type WriteGuard<'a, T> = RwLockWriteGuard<'a, T>;

/// A table behind a reader/writer lock.
///
/// The table itself is only reachable through a guard, so every operation
/// runs with the lock held in the right mode and releases it on every exit
/// path. Without an acquire timeout, acquisition blocks until granted and
/// cannot fail. With one, an acquisition that is not granted in time fails the
/// operation with [`Error::LockTimeout`].
pub struct TableLock<T> {
    name: &'static str,
    inner: RwLock<T>,
    acquire_timeout: Option<Duration>,
}

impl<T> TableLock<T> {
    /// Wrap a table that blocks indefinitely on contention.
    pub fn new(name: &'static str, table: T) -> Self {
        Self::with_timeout(name, table, None)
    }

    /// Wrap a table with an optional acquire timeout.
    pub fn with_timeout(name: &'static str, table: T, acquire_timeout: Option<Duration>) -> Self {
        Self {
            name,
            inner: RwLock::new(table),
            acquire_timeout,
        }
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire shared access.
    pub fn read(&self) -> Result<ReadGuard<'_, T>> {
        match self.acquire_timeout {
            None => Ok(self.inner.read()),
            Some(timeout) => self
                .inner
                .try_read_for(timeout)
                .ok_or_else(|| self.timed_out(LockMode::Read, timeout)),
        }
    }

    /// Acquire exclusive access.
    pub fn write(&self) -> Result<WriteGuard<'_, T>> {
        match self.acquire_timeout {
            None => Ok(self.inner.write()),
            Some(timeout) => self
                .inner
                .try_write_for(timeout)
                .ok_or_else(|| self.timed_out(LockMode::Write, timeout)),
        }
    }

    fn timed_out(&self, mode: LockMode, timeout: Duration) -> Error {
        tracing::error!(table = self.name, %mode, ?timeout, "Failed to acquire table lock");
        Error::LockTimeout {
            table: self.name,
            mode,
        }
    }
}

impl<T> fmt::Debug for TableLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLock")
            .field("name", &self.name)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}
