//! Reentrant lock coordination
//!
//! The backend supplies the real store-wide exclusive lock; this wrapper
//! adds depth counting so nested façade calls in one call stack re-enter
//! without deadlocking. At most one process is inside a locked region at a
//! time, globally; the depth counter is strictly process-local.

use crate::backend::PersistenceBackend;
use crate::error::Result;
use tracing::warn;

#[derive(Debug, Default)]
pub struct LockCoordinator {
    depth: u32,
}

impl LockCoordinator {
    pub fn new() -> Self {
        LockCoordinator { depth: 0 }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_held(&self) -> bool {
        self.depth > 0
    }

    /// Acquire the lock, or re-enter it if this call stack already holds
    /// it. Returns `false` only for a non-blocking probe that found the
    /// backend lock taken elsewhere; in that case the depth is untouched.
    pub fn acquire(&mut self, backend: &dyn PersistenceBackend, blocking: bool) -> Result<bool> {
        if self.depth == 0 && !backend.acquire_lock(blocking)? {
            return Ok(false);
        }
        self.depth += 1;
        Ok(true)
    }

    /// Release one level. The backend lock is actually released when the
    /// depth reaches 0, or immediately when `force` is set (administrative
    /// recovery from a stuck holder). Releasing more times than acquired is
    /// a no-op beyond depth 0.
    pub fn release(&mut self, backend: &dyn PersistenceBackend, force: bool) -> Result<()> {
        if self.depth == 1 || force {
            backend.release_lock(force)?;
        }

        if self.depth > 0 {
            self.depth -= 1;
        } else if !force {
            warn!("lock released more times than acquired");
        }
        Ok(())
    }

    /// Release every nested hold. Used before snapshot switch/recovery,
    /// which replace what "live" means and must not run inside an in-flight
    /// nested transaction.
    pub fn drain(&mut self, backend: &dyn PersistenceBackend) -> Result<()> {
        while self.depth > 0 {
            self.release(backend, false)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn test_reentrant_depth() {
        let backend = MemoryBackend::new();
        let mut lock = LockCoordinator::new();

        for n in 1..=3 {
            assert!(lock.acquire(&backend, true).unwrap());
            assert_eq!(lock.depth(), n);
        }

        // after N-1 releases the backend lock is still held
        lock.release(&backend, false).unwrap();
        lock.release(&backend, false).unwrap();
        assert_eq!(lock.depth(), 1);
        assert!(!backend.acquire_lock(false).unwrap());

        lock.release(&backend, false).unwrap();
        assert_eq!(lock.depth(), 0);
        assert!(backend.acquire_lock(false).unwrap());
        backend.release_lock(false).unwrap();
    }

    #[test]
    fn test_nonblocking_probe_leaves_depth() {
        let backend = MemoryBackend::new();
        // someone else holds the backend lock
        backend.acquire_lock(false).unwrap();

        let mut lock = LockCoordinator::new();
        assert!(!lock.acquire(&backend, false).unwrap());
        assert_eq!(lock.depth(), 0);

        backend.release_lock(false).unwrap();
        assert!(lock.acquire(&backend, false).unwrap());
        assert_eq!(lock.depth(), 1);
        lock.release(&backend, false).unwrap();
    }

    #[test]
    fn test_reentry_skips_backend() {
        let backend = MemoryBackend::new();
        let mut lock = LockCoordinator::new();

        assert!(lock.acquire(&backend, true).unwrap());
        // a re-entering acquire must not touch the (already held) backend
        // lock, even non-blocking
        assert!(lock.acquire(&backend, false).unwrap());
        assert_eq!(lock.depth(), 2);

        lock.drain(&backend).unwrap();
        assert_eq!(lock.depth(), 0);
        assert!(backend.acquire_lock(false).unwrap());
        backend.release_lock(false).unwrap();
    }

    #[test]
    fn test_force_release_collapses() {
        let backend = MemoryBackend::new();
        let mut lock = LockCoordinator::new();

        for _ in 0..3 {
            lock.acquire(&backend, true).unwrap();
        }

        lock.release(&backend, true).unwrap();
        // one forced release frees the backend lock even at depth 3
        assert!(backend.acquire_lock(false).unwrap());
        backend.release_lock(false).unwrap();
    }

    #[test]
    fn test_over_release_is_noop() {
        let backend = MemoryBackend::new();
        let mut lock = LockCoordinator::new();

        lock.acquire(&backend, true).unwrap();
        lock.release(&backend, false).unwrap();
        // extra releases must not underflow or touch the backend
        lock.release(&backend, false).unwrap();
        lock.release(&backend, false).unwrap();
        assert_eq!(lock.depth(), 0);

        assert!(backend.acquire_lock(false).unwrap());
        backend.release_lock(false).unwrap();
    }
}
