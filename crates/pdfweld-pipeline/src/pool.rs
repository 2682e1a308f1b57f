// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded-concurrency worker pool for the pipeline's parallel phases.
//
// Workers receive only the explicit per-item argument — no shared mutable
// state crosses the dispatch boundary. A failing item never cancels its
// siblings: jobs return their outcome as a value and the pool always drains
// every item before the caller inspects results.

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use pdfweld_core::error::{Result, WeldError};
use tracing::debug;

/// Fixed-size executor for page-range and per-page jobs.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool with exactly `workers` threads (floored at 1).
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("weld-worker-{index}"))
            .build()
            .map_err(|err| WeldError::Pipeline(format!("failed to build worker pool: {err}")))?;
        debug!(workers, "worker pool ready");
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` over every item, blocking until all are done.
    ///
    /// Results come back in item order regardless of completion order.
    pub fn run_all<T, R, F>(&self, items: Vec<T>, job: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        // An hour-long tick keeps the probe machinery dormant.
        self.run_all_with_progress(items, job, Duration::from_secs(3600), |_, _| {})
    }

    /// Like [`run_all`](Self::run_all), but invokes `on_tick(completed,
    /// total)` roughly every `tick` while items are still in flight, so the
    /// caller can report liveness during long batches. The probe never
    /// blocks the workers.
    pub fn run_all_with_progress<T, R, F, P>(
        &self,
        items: Vec<T>,
        job: F,
        tick: Duration,
        mut on_tick: P,
    ) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
        P: FnMut(usize, usize),
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<(usize, R)>();
        let mut slots: Vec<Option<R>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        std::thread::scope(|threads| {
            let job = &job;
            let pool = &self.pool;

            // Dispatch from a scoped thread so this thread stays free to
            // collect results and emit progress ticks. The scope joins the
            // dispatcher on exit.
            let _dispatcher = threads.spawn(move || {
                pool.scope(|scope| {
                    for (index, item) in items.into_iter().enumerate() {
                        let sender = sender.clone();
                        scope.spawn(move |_| {
                            let result = job(item);
                            // The receiver outlives this scope; send can only
                            // fail if the collector vanished, which it never
                            // does.
                            let _ = sender.send((index, result));
                        });
                    }
                });
                // All sender clones are gone once the scope drains, which
                // disconnects the channel.
            });

            let mut completed = 0;
            while completed < total {
                match receiver.recv_timeout(tick) {
                    Ok((index, result)) => {
                        slots[index] = Some(result);
                        completed += 1;
                    }
                    Err(RecvTimeoutError::Timeout) => on_tick(completed, total),
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.expect("worker pool delivered every result"))
            .collect()
    }
}
