//! Concurrency primitives for the photon emission and irradiance-precompute
//! passes (spec.md §4.G, §5): a chunked worker pool over an index range, a
//! throttled progress reporter, and a cooperative cancellation flag.
//!
//! Grounded on `integrator::SamplerIntegrator::render_parallel`'s own
//! pattern (`rayon`'s `into_par_iter` over tiles plus one shared
//! `indicatif::ProgressBar`), generalized from "one tile per pixel region"
//! to "one chunk of photon/sample indices".

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

/// Shared stop flag the outer renderer can set; every chunked pass checks it
/// between chunks so a cancelled render unwinds through balanced
/// `MediumStackGuard`s rather than aborting mid-walk (spec.md §5, property
/// P6).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An atomic counter plus a throttled `indicatif` bar, updated at chunk
/// granularity so contention stays low even with many worker threads
/// (mirrors `SamplerIntegrator::make_progress_bar`'s `set_draw_delta`).
pub struct ProgressReporter {
    bar: ProgressBar,
    completed: AtomicU64,
}

impl ProgressReporter {
    pub fn new(total: u64, message: &str) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_draw_delta((total / 200).max(1));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}")
        {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        Self { bar, completed: AtomicU64::new(0) }
    }

    pub fn inc(&self, n: u64) {
        let done = self.completed.fetch_add(n, Ordering::Relaxed) + n;
        self.bar.set_position(done);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Splits `0..count` into `chunk_size`-sized index ranges and runs `body` on
/// each in parallel via the global rayon pool (or a configured one via
/// `run_on_pool`), checking `cancel` between chunks. `body` receives the
/// chunk's `(start, end)` half-open range and a per-chunk worker slot index
/// in `0..num_chunks`, suitable for `PhotonBuffer::push`'s shard argument.
pub struct ChunkedWorkerPool {
    chunk_size: usize,
}

impl ChunkedWorkerPool {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }

    fn chunks(&self, count: u64) -> Vec<(u64, u64)> {
        let chunk_size = self.chunk_size as u64;
        let mut chunks = Vec::with_capacity((count / chunk_size + 1) as usize);
        let mut start = 0u64;
        while start < count {
            let end = (start + chunk_size).min(count);
            chunks.push((start, end));
            start = end;
        }
        chunks
    }

    pub fn run<F>(&self, count: u64, cancel: &CancellationToken, body: F)
    where
        F: Fn(u64, u64, usize) + Sync,
    {
        let chunks = self.chunks(count);
        chunks.into_par_iter().enumerate().for_each(|(shard, (start, end))| {
            if cancel.is_cancelled() {
                return;
            }
            body(start, end, shard);
        });
    }

    /// Same as `run`, but pinned to a specific thread pool (spec.md §4.G,
    /// "configurable worker count").
    pub fn run_on_pool<F>(&self, count: u64, cancel: &CancellationToken, pool: &rayon::ThreadPool, body: F)
    where
        F: Fn(u64, u64, usize) + Sync,
    {
        pool.install(|| self.run(count, cancel, body));
    }

    pub fn num_chunks(&self, count: u64) -> usize {
        self.chunks(count).len()
    }
}

pub fn build_thread_pool(num_threads: usize) -> rayon::ThreadPool {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if num_threads > 0 {
        builder = builder.num_threads(num_threads);
    }
    builder.build().expect("failed to build thread pool")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn chunks_cover_the_whole_range_without_overlap() {
        let pool = ChunkedWorkerPool::new(7);
        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(vec![false; 100]));
        let seen_ref = seen.clone();
        pool.run(100, &cancel, move |start, end, _shard| {
            let mut g = seen_ref.lock();
            for i in start..end {
                assert!(!g[i as usize], "index {} visited twice", i);
                g[i as usize] = true;
            }
        });
        assert!(seen.lock().iter().all(|&v| v));
    }

    use parking_lot::Mutex;

    #[test]
    fn cancellation_stops_new_chunks_from_running() {
        let pool = ChunkedWorkerPool::new(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ran = AtomicUsize::new(0);
        pool.run(50, &cancel, |_s, _e, _shard| {
            ran.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(ran.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn num_chunks_matches_ceiling_division() {
        let pool = ChunkedWorkerPool::new(10);
        assert_eq!(pool.num_chunks(95), 10);
        assert_eq!(pool.num_chunks(100), 10);
        assert_eq!(pool.num_chunks(101), 11);
    }
}
