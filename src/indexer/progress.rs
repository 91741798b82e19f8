use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Shared run counters, readable while the traversal is in flight.
#[derive(Clone, Default)]
pub struct IndexingProgress {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    files_total: AtomicUsize,
    files_processed: AtomicUsize,
    defs: AtomicUsize,
    usages: AtomicUsize,
    refs: AtomicUsize,
    merges: AtomicUsize,
    unresolved: AtomicUsize,
    is_active: AtomicBool,
    started_at: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub is_active: bool,
    pub files_total: usize,
    pub files_processed: usize,
    pub defs: usize,
    pub usages: usize,
    pub refs: usize,
    pub merges: usize,
    pub unresolved: usize,
    pub elapsed_ms: u64,
    pub progress_pct: f64,
}

/// Per-file deltas folded into the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCounts {
    pub defs: usize,
    pub usages: usize,
    pub refs: usize,
    pub merges: usize,
    pub unresolved: usize,
}

impl IndexingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, total_files: usize) {
        self.inner.files_total.store(total_files, Ordering::Release);
        self.inner.files_processed.store(0, Ordering::Release);
        self.inner.defs.store(0, Ordering::Release);
        self.inner.usages.store(0, Ordering::Release);
        self.inner.refs.store(0, Ordering::Release);
        self.inner.merges.store(0, Ordering::Release);
        self.inner.unresolved.store(0, Ordering::Release);
        self.inner.is_active.store(true, Ordering::Release);
        if let Ok(mut started) = self.inner.started_at.lock() {
            *started = Some(Instant::now());
        }
    }

    pub fn inc(&self, counts: FileCounts) {
        self.inner.files_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.defs.fetch_add(counts.defs, Ordering::Relaxed);
        self.inner.usages.fetch_add(counts.usages, Ordering::Relaxed);
        self.inner.refs.fetch_add(counts.refs, Ordering::Relaxed);
        self.inner.merges.fetch_add(counts.merges, Ordering::Relaxed);
        self.inner
            .unresolved
            .fetch_add(counts.unresolved, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.inner.is_active.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let is_active = self.inner.is_active.load(Ordering::Acquire);
        let files_total = self.inner.files_total.load(Ordering::Acquire);
        let files_processed = self.inner.files_processed.load(Ordering::Acquire);

        let elapsed_ms = self
            .inner
            .started_at
            .lock()
            .ok()
            .and_then(|started| started.map(|t| t.elapsed().as_millis() as u64))
            .unwrap_or(0);

        let progress_pct = if files_total > 0 {
            (files_processed as f64 / files_total as f64) * 100.0
        } else {
            0.0
        };

        ProgressSnapshot {
            is_active,
            files_total,
            files_processed,
            defs: self.inner.defs.load(Ordering::Acquire),
            usages: self.inner.usages.load(Ordering::Acquire),
            refs: self.inner.refs.load(Ordering::Acquire),
            merges: self.inner.merges.load(Ordering::Acquire),
            unresolved: self.inner.unresolved.load(Ordering::Acquire),
            elapsed_ms,
            progress_pct,
        }
    }
}
