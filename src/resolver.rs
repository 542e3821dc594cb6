//! Cross-file dependency resolver
//!
//! Thread-safe registry of file identifiers discovered while parsing. A file
//! id is in exactly one of three states: unseen, pending (discovered, not yet
//! claimed) or claimed (handed to a worker); once claimed it never returns to
//! pending. Both sets, the active-worker count and the stop flag live under
//! one mutex so claim checks and termination detection cannot race.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ImportError;

/// Normalized identifier of a file inside the archive.
///
/// Normalization turns backslashes into `/`, drops `.` segments and empty
/// segments, and anchors the path with a single leading `/`. Equality and
/// ordering are by the normalized string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    pub fn new(raw: &str) -> Self {
        let mut normalized = String::with_capacity(raw.len() + 1);
        for segment in raw.split(['/', '\\']) {
            if segment.is_empty() || segment == "." {
                continue;
            }
            normalized.push('/');
            normalized.push_str(segment);
        }
        if normalized.is_empty() {
            normalized.push('/');
        }
        FileId(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// What a worker should do after asking the registry for work.
#[derive(Debug)]
pub(crate) enum WorkerTurn {
    /// Parse this file; the id has been moved to the claimed set.
    Claim(FileId),
    /// The graph is drained or the import was halted; exit the loop.
    Finished,
}

#[derive(Debug, Default)]
struct RegistryState {
    pending: BTreeSet<FileId>,
    claimed: HashSet<FileId>,
    active_workers: usize,
    stopped: bool,
    error: Option<ImportError>,
}

/// Shared work queue and claim registry for one import session.
///
/// `add` may be called from any worker thread while consumers drain the
/// pending set; idle workers block on the internal condvar until new work
/// appears or the graph is exhausted.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    state: Mutex<RegistryState>,
    work_available: Condvar,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a discovered file. No-op if the id is already pending or
    /// claimed; a newly inserted id wakes exactly one blocked consumer.
    /// Returns whether the id was newly enqueued.
    pub fn add(&self, id: FileId) -> bool {
        let mut state = self.lock();
        if state.claimed.contains(&id) || state.pending.contains(&id) {
            return false;
        }
        trace!(file = %id, "dependency discovered");
        state.pending.insert(id);
        self.work_available.notify_one();
        true
    }

    /// Atomically move one pending id to the claimed set and return it.
    /// Non-blocking; returns `None` when pending is empty.
    pub fn try_next(&self) -> Option<FileId> {
        Self::claim_locked(&mut self.lock())
    }

    fn claim_locked(state: &mut RegistryState) -> Option<FileId> {
        let id = state.pending.pop_first()?;
        state.claimed.insert(id.clone());
        Some(id)
    }

    /// Count this worker as active. Must be called once per worker before its
    /// first `next_or_park`.
    pub(crate) fn register_worker(&self) {
        self.lock().active_workers += 1;
    }

    /// Claim the next file or park until work appears.
    ///
    /// The caller must be counted active. A worker finding no work decrements
    /// the active count; the one that reaches zero with pending empty wakes
    /// all others so they observe drainage and exit.
    pub(crate) fn next_or_park(&self) -> WorkerTurn {
        let mut state = self.lock();
        loop {
            if state.stopped {
                state.active_workers -= 1;
                self.work_available.notify_all();
                return WorkerTurn::Finished;
            }
            if let Some(id) = Self::claim_locked(&mut state) {
                return WorkerTurn::Claim(id);
            }
            state.active_workers -= 1;
            if state.active_workers == 0 {
                debug!(
                    claimed = state.claimed.len(),
                    "dependency graph drained"
                );
                self.work_available.notify_all();
                return WorkerTurn::Finished;
            }
            state = self
                .work_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.active_workers += 1;
        }
    }

    /// Record a fatal error and halt the session. Only the first error is
    /// kept; all blocked workers are woken so they can exit.
    pub(crate) fn fail(&self, error: ImportError) {
        let mut state = self.lock();
        if state.error.is_none() {
            state.error = Some(error);
        }
        state.stopped = true;
        self.work_available.notify_all();
    }

    /// First error recorded by `fail`, if any.
    pub(crate) fn take_error(&self) -> Option<ImportError> {
        self.lock().error.take()
    }

    /// Whether no pending work remains and no worker is active.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.active_workers == 0
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn claimed_count(&self) -> usize {
        self.lock().claimed.len()
    }

    /// Whether the id has been claimed by some worker this session.
    pub fn is_claimed(&self, id: &FileId) -> bool {
        self.lock().claimed.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_file_id_normalization() {
        assert_eq!(FileId::new("3D/model.xml").as_str(), "/3D/model.xml");
        assert_eq!(FileId::new("/3D/model.xml").as_str(), "/3D/model.xml");
        assert_eq!(FileId::new("3D\\sub\\part.xml").as_str(), "/3D/sub/part.xml");
        assert_eq!(FileId::new("./3D//model.xml").as_str(), "/3D/model.xml");
        assert_eq!(FileId::new(""), FileId::new("/"));
    }

    #[test]
    fn test_file_id_equality_and_ordering() {
        assert_eq!(FileId::new("a/b.xml"), FileId::new("/a/b.xml"));
        assert!(FileId::new("/a.xml") < FileId::new("/b.xml"));
    }

    #[test]
    fn test_add_then_next() {
        let registry = DependencyRegistry::new();
        assert!(registry.add(FileId::new("/x.xml")));
        assert_eq!(registry.pending_count(), 1);

        let claimed = registry.try_next().unwrap();
        assert_eq!(claimed.as_str(), "/x.xml");
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.claimed_count(), 1);
        assert!(registry.is_claimed(&claimed));
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = DependencyRegistry::new();
        assert!(registry.add(FileId::new("/x.xml")));
        assert!(!registry.add(FileId::new("/x.xml")));
        assert!(!registry.add(FileId::new("x.xml")));
        assert_eq!(registry.pending_count(), 1);

        // Re-adding a claimed id is also a no-op.
        registry.try_next().unwrap();
        assert!(!registry.add(FileId::new("/x.xml")));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_next_never_returns_same_id_twice() {
        let registry = DependencyRegistry::new();
        for i in 0..20 {
            registry.add(FileId::new(&format!("/f{i}.xml")));
        }
        let mut seen = HashSet::new();
        while let Some(id) = registry.try_next() {
            assert!(seen.insert(id), "id returned twice");
            // Interleave re-adds to try to smuggle duplicates in.
            registry.add(FileId::new("/f3.xml"));
            registry.add(FileId::new("/f7.xml"));
        }
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_next_on_empty_is_none() {
        let registry = DependencyRegistry::new();
        assert!(registry.try_next().is_none());
        assert!(registry.is_drained());
    }

    #[test]
    fn test_pending_drains_in_normalized_order() {
        let registry = DependencyRegistry::new();
        registry.add(FileId::new("/b.xml"));
        registry.add(FileId::new("/a.xml"));
        registry.add(FileId::new("/c.xml"));
        assert_eq!(registry.try_next().unwrap().as_str(), "/a.xml");
        assert_eq!(registry.try_next().unwrap().as_str(), "/b.xml");
        assert_eq!(registry.try_next().unwrap().as_str(), "/c.xml");
    }

    #[test]
    fn test_concurrent_add_of_same_id() {
        use rayon::prelude::*;

        let registry = Arc::new(DependencyRegistry::new());
        (0..64).into_par_iter().for_each(|_| {
            registry.add(FileId::new("/shared.xml"));
        });

        // The id appears exactly once across pending and claimed.
        assert_eq!(registry.pending_count() + registry.claimed_count(), 1);
        assert_eq!(registry.try_next().unwrap().as_str(), "/shared.xml");
        assert!(registry.try_next().is_none());
    }

    #[test]
    fn test_concurrent_add_and_drain() {
        use rayon::prelude::*;

        let registry = Arc::new(DependencyRegistry::new());
        (0..256).into_par_iter().for_each(|i| {
            registry.add(FileId::new(&format!("/f{}.xml", i % 32)));
            registry.try_next();
        });
        while registry.try_next().is_some() {}

        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.claimed_count(), 32);
    }

    #[test]
    fn test_fail_records_first_error_only() {
        let registry = DependencyRegistry::new();
        registry.fail(ImportError::Archive {
            file: "/a.xml".to_string(),
            details: "first".to_string(),
        });
        registry.fail(ImportError::Archive {
            file: "/b.xml".to_string(),
            details: "second".to_string(),
        });

        let error = registry.take_error().unwrap();
        assert!(error.to_string().contains("first"));
        assert!(registry.take_error().is_none());
    }

    #[test]
    fn test_worker_protocol_drains_cleanly() {
        let registry = Arc::new(DependencyRegistry::new());
        registry.add(FileId::new("/root.xml"));
        registry.register_worker();

        match registry.next_or_park() {
            WorkerTurn::Claim(id) => assert_eq!(id.as_str(), "/root.xml"),
            WorkerTurn::Finished => panic!("expected a claim"),
        }
        // No more work and this is the only active worker: drained.
        assert!(matches!(registry.next_or_park(), WorkerTurn::Finished));
        assert!(registry.is_drained());
    }

    #[test]
    fn test_parked_worker_woken_by_add() {
        let registry = Arc::new(DependencyRegistry::new());
        registry.register_worker();
        registry.register_worker();

        let consumer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let mut claims = Vec::new();
                loop {
                    match registry.next_or_park() {
                        WorkerTurn::Claim(id) => claims.push(id),
                        WorkerTurn::Finished => break,
                    }
                }
                claims
            })
        };

        // Give the consumer time to park, then publish work while still
        // counted active ourselves, and run the same loop.
        std::thread::sleep(std::time::Duration::from_millis(50));
        registry.add(FileId::new("/late.xml"));

        let mut own_claims = Vec::new();
        loop {
            match registry.next_or_park() {
                WorkerTurn::Claim(id) => own_claims.push(id),
                WorkerTurn::Finished => break,
            }
        }
        let consumer_claims = consumer.join().unwrap();

        // Exactly one of the two workers claimed the late file, and the
        // drain cascade let both exit.
        assert_eq!(consumer_claims.len() + own_claims.len(), 1);
        assert!(registry.is_drained());
        assert!(registry.is_claimed(&FileId::new("/late.xml")));
    }

    #[test]
    fn test_stop_wakes_parked_workers() {
        let registry = Arc::new(DependencyRegistry::new());
        registry.register_worker();
        registry.register_worker();

        let consumer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.next_or_park())
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        registry.fail(ImportError::Archive {
            file: "/gone.xml".to_string(),
            details: "missing".to_string(),
        });

        assert!(matches!(consumer.join().unwrap(), WorkerTurn::Finished));
        assert!(matches!(registry.next_or_park(), WorkerTurn::Finished));
    }
}
