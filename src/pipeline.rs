//! Worker pool / pipeline driver
//!
//! Thin orchestration over the schema engine and the dependency registry:
//! a fixed pool of OS worker threads repeatedly claims file ids, runs the
//! document schema over each file, and collects the per-file accumulators.
//! Leaf actions register newly discovered cross-references through the
//! registry handle captured in the accumulator, so the pool keeps running
//! until the whole dependency graph is drained. The first error from any
//! worker halts the import; partial scenes are never returned.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::Archive;
use crate::engine::validate_document;
use crate::error::Result;
use crate::resolver::{DependencyRegistry, FileId, WorkerTurn};
use crate::schema::DocumentSchema;

/// Import session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Number of OS worker threads racing to claim discovered files
    pub worker_count: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
        }
    }
}

impl ImportConfig {
    /// Set the worker thread count (clamped to at least one).
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }
}

/// Summary of a completed import session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStats {
    /// Number of files parsed across the whole dependency graph
    pub files_parsed: usize,
    /// Worker threads used
    pub worker_count: usize,
    /// Wall-clock duration of the session
    pub duration: Duration,
}

/// Accumulator produced by parsing one file.
#[derive(Debug)]
pub struct ParsedFile<S> {
    pub file: FileId,
    pub state: S,
}

/// Everything a successful import session produces.
#[derive(Debug)]
pub struct ImportOutcome<S> {
    /// Per-file accumulators, sorted by file id.
    pub files: Vec<ParsedFile<S>>,
    pub stats: ImportStats,
}

impl<S> ImportOutcome<S> {
    /// Accumulator for one file, if it was part of the graph.
    pub fn state_of(&self, file: &FileId) -> Option<&S> {
        self.files
            .iter()
            .find(|parsed| &parsed.file == file)
            .map(|parsed| &parsed.state)
    }
}

/// Parse the whole document graph reachable from `root`.
///
/// `new_state` builds the per-file accumulator; it receives the registry
/// handle so leaf actions can register cross-file references via
/// [`DependencyRegistry::add`]. Every transitively discovered file is parsed
/// exactly once; the first [`crate::error::ImportError`] from any worker
/// fails the whole session.
pub fn import<A, S, F>(
    archive: &A,
    schema: &DocumentSchema<S>,
    root: FileId,
    config: &ImportConfig,
    new_state: F,
) -> Result<ImportOutcome<S>>
where
    A: Archive + ?Sized,
    S: Send,
    F: Fn(&FileId, &Arc<DependencyRegistry>) -> S + Send + Sync,
{
    let started = Instant::now();
    let worker_count = config.worker_count.max(1);

    let registry = Arc::new(DependencyRegistry::new());
    registry.add(root);

    let parsed: Mutex<Vec<ParsedFile<S>>> = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for worker in 0..worker_count {
            let registry = &registry;
            let parsed = &parsed;
            let new_state = &new_state;
            scope.spawn(move || {
                worker_loop(worker, archive, schema, registry, parsed, new_state)
            });
        }
    });

    if let Some(error) = registry.take_error() {
        return Err(error);
    }

    let mut files = parsed
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    files.sort_by(|a, b| a.file.cmp(&b.file));

    let stats = ImportStats {
        files_parsed: files.len(),
        worker_count,
        duration: started.elapsed(),
    };
    debug!(
        files = stats.files_parsed,
        workers = stats.worker_count,
        "import session complete"
    );
    Ok(ImportOutcome { files, stats })
}

fn worker_loop<A, S, F>(
    worker: usize,
    archive: &A,
    schema: &DocumentSchema<S>,
    registry: &Arc<DependencyRegistry>,
    parsed: &Mutex<Vec<ParsedFile<S>>>,
    new_state: &F,
) where
    A: Archive + ?Sized,
    S: Send,
    F: Fn(&FileId, &Arc<DependencyRegistry>) -> S + Send + Sync,
{
    registry.register_worker();
    loop {
        match registry.next_or_park() {
            WorkerTurn::Finished => break,
            WorkerTurn::Claim(file) => {
                debug!(worker, file = %file, "claimed file");
                match parse_file(archive, schema, &file, registry, new_state) {
                    Ok(state) => {
                        parsed
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(ParsedFile { file, state });
                    }
                    Err(error) => {
                        debug!(worker, file = %file, %error, "file failed, halting import");
                        registry.fail(error);
                    }
                }
            }
        }
    }
}

fn parse_file<A, S, F>(
    archive: &A,
    schema: &DocumentSchema<S>,
    file: &FileId,
    registry: &Arc<DependencyRegistry>,
    new_state: &F,
) -> Result<S>
where
    A: Archive + ?Sized,
    F: Fn(&FileId, &Arc<DependencyRegistry>) -> S,
{
    let mut source = archive.open(file)?;
    let mut state = new_state(file, registry);
    validate_document(schema, source.as_mut(), file, &mut state)?;
    Ok(state)
}
