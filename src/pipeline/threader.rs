//! Region-split parallel execution.
//!
//! A node's generation is cut into work items by a [`SplitStrategy`]; the
//! items run on the process-wide [`WorkerPool`] and the calling thread blocks
//! until every one of them has returned. Each item yields its own `Result`:
//! the join keeps the first captured error that was not merely a sibling
//! stopping because of it.
//!
//! Output writes need no locking. When every piece is a contiguous span of
//! the output buffer (always the case for [`SplitStrategy::SlowestAxis`]) the
//! workers receive disjoint mutable slices. Otherwise each worker fills a
//! private buffer that the joining thread scatters back.

use crate::config::{default_number_of_threads, MAX_THREADS};
use crate::image::{Image, Pixel};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::progress::ProgressTracker;
use crate::region::{Index, Region, SplitStrategy};
use crossbeam_channel::unbounded;
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

static GLOBAL_POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();

/// A pool of reusable worker threads.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    threads: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("parallel", &self.pool.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// Builds a pool of `threads` workers (clamped to `1..=MAX_THREADS`).
    ///
    /// If the threads cannot be spawned the pool degrades to running every
    /// item on the calling thread.
    pub fn new(threads: usize) -> Self {
        let threads = threads.clamp(1, MAX_THREADS);
        if threads == 1 {
            return Self {
                pool: None,
                threads,
            };
        }
        let built = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("voxflow-worker-{i}"))
            .build();
        match built {
            Ok(pool) => Self {
                pool: Some(pool),
                threads,
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to start {} worker threads, running sequentially: {}",
                    threads,
                    e
                );
                Self {
                    pool: None,
                    threads: 1,
                }
            }
        }
    }

    /// The process-wide pool, built on first use with the default thread count.
    pub fn global() -> Arc<WorkerPool> {
        Self::global_with(default_number_of_threads())
    }

    /// The process-wide pool; `threads` only matters for the call that builds it.
    pub fn global_with(threads: usize) -> Arc<WorkerPool> {
        let pool = GLOBAL_POOL.get_or_init(|| {
            tracing::debug!("Starting process-wide worker pool with {} threads", threads);
            Arc::new(WorkerPool::new(threads))
        });
        if pool.threads != threads.clamp(1, MAX_THREADS) {
            tracing::debug!(
                "Worker pool already running with {} threads; requested {}",
                pool.threads,
                threads
            );
        }
        Arc::clone(pool)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `f` once per item and joins.
    ///
    /// Results come back in item order. On failure the first captured error
    /// wins; panics are converted into [`PipelineError::WorkerPanicked`].
    pub(crate) fn execute<W, T, F>(
        &self,
        items: Vec<W>,
        tracker: &ProgressTracker,
        poll_rows: u64,
        f: F,
    ) -> PipelineResult<Vec<T>>
    where
        W: Send,
        T: Send,
        F: Fn(W, &WorkerContext<'_>) -> PipelineResult<T> + Sync,
    {
        let count = items.len();
        let run = |worker: usize, item: W| -> PipelineResult<T> {
            let ctx = WorkerContext::new(worker, tracker, poll_rows);
            let result = match panic::catch_unwind(AssertUnwindSafe(|| f(item, &ctx))) {
                Ok(result) => result,
                Err(payload) => Err(PipelineError::WorkerPanicked {
                    worker,
                    message: panic_message(payload.as_ref()),
                }),
            };
            if result.is_err() {
                tracker.halt();
            }
            result
        };

        let pool = match &self.pool {
            Some(pool) if count > 1 => pool,
            _ => {
                return items
                    .into_iter()
                    .enumerate()
                    .map(|(worker, item)| run(worker, item))
                    .collect();
            }
        };

        let (tx, rx) = unbounded();
        pool.scope(|scope| {
            for (worker, item) in items.into_iter().enumerate() {
                let tx = tx.clone();
                let run = &run;
                scope.spawn(move |_| {
                    let _ = tx.send((worker, run(worker, item)));
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
        let mut first_error = None;
        let mut cancelled = false;
        // Arrival order is capture order.
        for (worker, result) in rx.iter() {
            match result {
                Ok(value) => slots[worker] = Some(value),
                Err(PipelineError::Cancelled) => cancelled = true,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if cancelled {
            return Err(PipelineError::Cancelled);
        }
        slots
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| PipelineError::Filter("a work item returned no result".to_string()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// What one work item sees of the generation it belongs to.
pub struct WorkerContext<'a> {
    worker: usize,
    tracker: &'a ProgressTracker,
    poll_rows: u64,
    rows_since_poll: Cell<u64>,
}

impl<'a> WorkerContext<'a> {
    pub(crate) fn new(worker: usize, tracker: &'a ProgressTracker, poll_rows: u64) -> Self {
        Self {
            worker,
            tracker,
            poll_rows: poll_rows.max(1),
            rows_since_poll: Cell::new(0),
        }
    }

    /// Position of this item among the items of the call.
    pub fn worker_id(&self) -> usize {
        self.worker
    }

    pub fn is_aborted(&self) -> bool {
        self.tracker.abort_requested() || self.tracker.halted()
    }

    /// Fails with [`PipelineError::ProcessAborted`] once the node's abort flag
    /// is set, or with [`PipelineError::Cancelled`] once a sibling item failed.
    pub fn check_abort(&self) -> PipelineResult<()> {
        if self.tracker.abort_requested() {
            Err(PipelineError::ProcessAborted {
                node_id: self.tracker.node(),
            })
        } else if self.tracker.halted() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Counts `pixels` towards the node's progress.
    pub fn complete_pixels(&self, pixels: u64) {
        self.tracker.complete(pixels);
    }

    /// Marks one scan line of `pixels` done and polls the abort flag at the
    /// configured row granularity.
    pub fn complete_row(&self, pixels: u64) -> PipelineResult<()> {
        self.tracker.complete(pixels);
        let rows = self.rows_since_poll.get() + 1;
        if rows >= self.poll_rows {
            self.rows_since_poll.set(0);
            self.check_abort()
        } else {
            self.rows_since_poll.set(rows);
            Ok(())
        }
    }
}

/// Mutable view of the part of an output buffer one work item produces.
///
/// The data is laid out over [`region`](Self::region) with axis 0 fastest.
pub struct OutputChunk<'a, P: Pixel, const D: usize> {
    region: Region<D>,
    data: &'a mut [P],
}

impl<'a, P: Pixel, const D: usize> OutputChunk<'a, P, D> {
    pub(crate) fn new(region: Region<D>, data: &'a mut [P]) -> Self {
        debug_assert_eq!(region.number_of_pixels() as usize, data.len());
        Self { region, data }
    }

    pub fn region(&self) -> Region<D> {
        self.region
    }

    pub fn as_mut_slice(&mut self) -> &mut [P] {
        self.data
    }

    pub fn fill(&mut self, value: P) {
        self.data.fill(value);
    }

    pub fn get_mut(&mut self, index: &Index<D>) -> Option<&mut P> {
        if !self.region.contains_index(index) {
            return None;
        }
        let offset = self.region.compute_offset(index);
        self.data.get_mut(offset)
    }

    /// Slice of an axis-0 scan line inside this chunk.
    pub fn row_mut(&mut self, row: &Region<D>) -> PipelineResult<&mut [P]> {
        if row.is_empty() || !self.region.contains(row) {
            return Err(PipelineError::RegionOutOfBounds {
                requested: row.to_string(),
                largest: self.region.to_string(),
            });
        }
        let start = self.region.compute_offset(&row.index());
        let end = start + row.size().0[0] as usize;
        Ok(&mut self.data[start..end])
    }

    /// Every cell with its index, in buffer order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index<D>, &mut P)> + '_ {
        self.region.iter().zip(self.data.iter_mut())
    }
}

/// Execution services handed to a generating filter.
pub struct ExecContext<'a> {
    pool: &'a WorkerPool,
    strategy: SplitStrategy,
    threads: usize,
    poll_rows: u64,
    tracker: &'a ProgressTracker,
}

impl<'a> ExecContext<'a> {
    pub(crate) fn new(
        pool: &'a WorkerPool,
        strategy: SplitStrategy,
        threads: usize,
        poll_rows: u64,
        tracker: &'a ProgressTracker,
    ) -> Self {
        Self {
            pool,
            strategy,
            threads: threads.max(1),
            poll_rows,
            tracker,
        }
    }

    /// Work items this node may use.
    pub fn number_of_threads(&self) -> usize {
        self.threads
    }

    pub fn split_strategy(&self) -> SplitStrategy {
        self.strategy
    }

    /// Work items for `region`. A region with fewer cells than workers stays whole.
    pub fn split<const D: usize>(&self, region: &Region<D>) -> Vec<Region<D>> {
        if self.threads <= 1 || region.number_of_pixels() < self.threads as u64 {
            return vec![*region];
        }
        self.strategy.split_all(region, self.threads)
    }

    /// A context for work the filter runs on the calling thread.
    pub fn worker(&self) -> WorkerContext<'_> {
        WorkerContext::new(0, self.tracker, self.poll_rows)
    }

    /// Runs `body` once per work item of `region` and joins.
    pub fn parallel_for<const D: usize, F>(&self, region: &Region<D>, body: F) -> PipelineResult<()>
    where
        F: Fn(&Region<D>, &WorkerContext<'_>) -> PipelineResult<()> + Sync,
    {
        let pieces = self.split(region);
        self.pool
            .execute(pieces, self.tracker, self.poll_rows, |piece, w| body(&piece, w))
            .map(|_| ())
    }

    /// Per-item accumulators over `region`, merged in item order.
    ///
    /// Every item folds into a fresh `init()`; the partial results are then
    /// combined left to right. The split depends on the thread count, so the
    /// result is only independent of it when `combine` is associative and
    /// exact for the accumulator type.
    pub fn reduce<const D: usize, A, I, F, C>(
        &self,
        region: &Region<D>,
        init: I,
        fold: F,
        combine: C,
    ) -> PipelineResult<A>
    where
        A: Send,
        I: Fn() -> A + Sync,
        F: Fn(A, &Region<D>, &WorkerContext<'_>) -> PipelineResult<A> + Sync,
        C: Fn(A, A) -> A,
    {
        let pieces = self.split(region);
        let partials = self
            .pool
            .execute(pieces, self.tracker, self.poll_rows, |piece, w| {
                fold(init(), &piece, w)
            })?;
        Ok(partials.into_iter().fold(init(), combine))
    }

    /// Runs `body` over disjoint chunks covering the output's buffered region.
    pub fn for_each_output_chunk<P, const D: usize, F>(
        &self,
        output: &mut Image<P, D>,
        body: F,
    ) -> PipelineResult<()>
    where
        P: Pixel,
        F: Fn(&mut OutputChunk<'_, P, D>, &WorkerContext<'_>) -> PipelineResult<()> + Sync,
    {
        let buffered = output.buffered_region();
        if buffered.is_empty() {
            return Ok(());
        }
        let pieces = self.split(&buffered);

        if let Some(chunks) = carve_contiguous(output.as_mut_slice(), &buffered, &pieces) {
            self.pool
                .execute(chunks, self.tracker, self.poll_rows, |mut chunk, w| {
                    body(&mut chunk, w)
                })?;
            return Ok(());
        }

        let filled = self
            .pool
            .execute(pieces, self.tracker, self.poll_rows, |piece, w| {
                let mut scratch = vec![P::default(); piece.number_of_pixels() as usize];
                body(&mut OutputChunk::new(piece, &mut scratch), w)?;
                Ok((piece, scratch))
            })?;
        for (piece, scratch) in filled {
            output.write_region(&piece, &scratch)?;
        }
        Ok(())
    }
}

/// Cuts `buffer` into one slice per piece when every piece is a contiguous,
/// ascending span of it.
fn carve_contiguous<'b, P, const D: usize>(
    buffer: &'b mut [P],
    buffered: &Region<D>,
    pieces: &[Region<D>],
) -> Option<Vec<OutputChunk<'b, P, D>>>
where
    P: Pixel,
{
    let mut spans = Vec::with_capacity(pieces.len());
    let mut cursor = 0usize;
    for piece in pieces {
        if piece.is_empty() || !piece.is_contiguous_in(buffered) {
            return None;
        }
        let start = buffered.compute_offset(&piece.index());
        if start < cursor {
            return None;
        }
        let len = piece.number_of_pixels() as usize;
        spans.push((start, len));
        cursor = start + len;
    }
    if cursor > buffer.len() {
        return None;
    }

    let mut chunks = Vec::with_capacity(pieces.len());
    let mut rest = buffer;
    let mut consumed = 0usize;
    for (piece, (start, len)) in pieces.iter().zip(spans) {
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(start - consumed);
        let (chunk, tail) = tail.split_at_mut(len);
        rest = tail;
        consumed = start + len;
        chunks.push(OutputChunk::new(*piece, chunk));
    }
    Some(chunks)
}
