//! Exclusive device-path ownership.
//!
//! An OS device may be captured by at most one loop at a time. The claim
//! table is checked-and-updated under one lock, so concurrent starts for
//! the same path cannot both succeed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::InputError;

/// Tracks which device paths are currently owned by a capture.
#[derive(Debug, Default)]
pub struct ClaimTable {
    paths: Mutex<HashSet<PathBuf>>,
}

impl ClaimTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path. Fails with [`InputError::DeviceBusy`] if already
    /// claimed, with no other side effects.
    pub fn claim(&self, path: &Path) -> Result<(), InputError> {
        let mut paths = self.paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !paths.insert(path.to_path_buf()) {
            return Err(InputError::DeviceBusy(path.to_path_buf()));
        }
        Ok(())
    }

    /// Release a previously claimed path. Releasing an unclaimed path is
    /// a no-op.
    pub fn release(&self, path: &Path) {
        let mut paths = self.paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        paths.remove(path);
    }

    #[must_use]
    pub fn is_claimed(&self, path: &Path) -> bool {
        let paths = self.paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        paths.contains(path)
    }

    /// Snapshot of all claimed paths.
    #[must_use]
    pub fn claimed(&self) -> Vec<PathBuf> {
        let paths = self.paths.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        paths.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn double_claim_rejected() {
        let table = ClaimTable::new();
        let path = Path::new("/dev/input/event11");
        table.claim(path).unwrap();
        assert!(matches!(
            table.claim(path),
            Err(InputError::DeviceBusy(_))
        ));

        table.release(path);
        table.claim(path).unwrap();
    }

    #[test]
    fn concurrent_claims_one_winner() {
        let table = Arc::new(ClaimTable::new());
        let path = PathBuf::from("/dev/input/event3");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let path = path.clone();
                std::thread::spawn(move || table.claim(&path).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn release_unclaimed_is_noop() {
        let table = ClaimTable::new();
        table.release(Path::new("/dev/input/event9"));
        assert!(!table.is_claimed(Path::new("/dev/input/event9")));
    }
}
