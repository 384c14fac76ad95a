use crate::cancel::CancellationToken;
use crate::CuboidError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

/// Fixed set of worker threads fed through a bounded queue.
///
/// The dispatching thread blocks once `queue_depth` jobs are waiting. Each
/// worker gets a stable id in `0..threads`.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    threads: usize,
    queue_depth: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(threads: usize, queue_depth: usize, cancel: CancellationToken) -> Self {
        Self {
            threads: threads.max(1),
            queue_depth: queue_depth.max(1),
            cancel,
        }
    }

    /// Runs `work(worker_id, job)` for every job and waits for all workers.
    ///
    /// Dispatch stops at the first job error or on cancellation; jobs still in
    /// the queue are dropped. The first error wins. A panicking worker is
    /// reported as `CuboidError::Worker`.
    pub fn run<J, I, F>(&self, jobs: I, work: F) -> Result<(), CuboidError>
    where
        I: IntoIterator<Item = J>,
        J: Send,
        F: Fn(usize, J) -> Result<(), CuboidError> + Sync,
    {
        let (tx, rx) = crossbeam_channel::bounded::<J>(self.queue_depth);
        let first_error: Mutex<Option<CuboidError>> = Mutex::new(None);
        let failed = AtomicBool::new(false);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.threads)
                .map(|worker_id| {
                    let rx = rx.clone();
                    let work = &work;
                    let first_error = &first_error;
                    let failed = &failed;
                    let cancel = &self.cancel;
                    thread::Builder::new()
                        .name(format!("cuboid-worker-{}", worker_id))
                        .spawn_scoped(scope, move || {
                            for job in rx.iter() {
                                if failed.load(Ordering::Acquire) || cancel.is_cancelled() {
                                    continue;
                                }
                                if let Err(e) = work(worker_id, job) {
                                    failed.store(true, Ordering::Release);
                                    let mut slot =
                                        first_error.lock().unwrap_or_else(PoisonError::into_inner);
                                    if slot.is_none() {
                                        *slot = Some(e);
                                    }
                                }
                            }
                        })
                })
                .collect();
            drop(rx);

            for job in jobs {
                if failed.load(Ordering::Acquire) || self.cancel.is_cancelled() {
                    break;
                }
                if tx.send(job).is_err() {
                    // Every worker is gone.
                    break;
                }
            }
            drop(tx);

            for (worker_id, handle) in handles.into_iter().enumerate() {
                let outcome = match handle {
                    Ok(handle) => handle
                        .join()
                        .map_err(|_| CuboidError::Worker(format!("worker {} panicked", worker_id))),
                    Err(e) => Err(CuboidError::Worker(format!(
                        "failed to spawn worker {}: {}",
                        worker_id, e
                    ))),
                };
                if let Err(e) = outcome {
                    failed.store(true, Ordering::Release);
                    let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
            }
        });

        if let Some(e) = first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(e);
        }
        self.cancel.check()
    }
}
