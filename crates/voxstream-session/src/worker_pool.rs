//! Blocking engine pool. Runs CPU-bound model inference off the async runtime.
//!
//! Speech models are not safe to share between threads and are expensive to
//! load. The pool owns a fixed number of named OS threads; each one lazily
//! builds its own engine from a shared factory on its first job and keeps it
//! for the lifetime of the thread. Engines never leave their thread, so the
//! engine type does not need to be `Send`.
//!
//! Callers submit closures through [`EnginePool::run`] and await the result
//! over a oneshot channel. A job that panics is reported to its caller as
//! [`VoxError::JobPanicked`]; the worker drops its engine and keeps serving.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;

use tokio::sync::oneshot;

use voxstream_core::VoxError;

/// Builds an engine on the worker thread that will own it.
pub type EngineFactory<E> = Arc<dyn Fn() -> Result<E, VoxError> + Send + Sync>;

/// A unit of work handed to a worker: receives the thread's engine, or the
/// error that prevented building it.
type Job<E> = Box<dyn FnOnce(Result<&mut E, VoxError>) -> JobStatus + Send>;

/// How a job left the worker's engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Finished,
    /// The job unwound mid-call; the engine may be half-updated.
    Panicked,
}

/// Fixed-size pool of threads, each owning one lazily created engine.
pub struct EnginePool<E: 'static> {
    name: String,
    jobs: Option<mpsc::Sender<Job<E>>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl<E: 'static> EnginePool<E> {
    /// Spawn `size` worker threads named `<name>-<n>`.
    ///
    /// A `size` of zero is treated as one.
    pub fn spawn(name: &str, size: usize, factory: EngineFactory<E>) -> Result<Self, VoxError> {
        let (job_tx, job_rx) = mpsc::channel::<Job<E>>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let factory = Arc::clone(&factory);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || Self::run_worker(&job_rx, &factory))?;
            workers.push(handle);
        }

        tracing::debug!(pool = name, workers = workers.len(), "Engine pool started");
        Ok(Self {
            name: name.to_string(),
            jobs: Some(job_tx),
            workers,
        })
    }

    /// Run `job` against a worker's engine and await its result.
    ///
    /// If the worker's engine could not be built, the factory error is
    /// returned and the next job on that worker tries again.
    pub async fn run<T, F>(&self, job: F) -> Result<T, VoxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut E) -> Result<T, VoxError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<E> = Box::new(move |engine| {
            let (result, status) = match engine {
                Ok(engine) => match panic::catch_unwind(AssertUnwindSafe(|| job(engine))) {
                    Ok(result) => (result, JobStatus::Finished),
                    Err(_) => (Err(VoxError::JobPanicked), JobStatus::Panicked),
                },
                Err(e) => (Err(e), JobStatus::Finished),
            };
            let _ = reply_tx.send(result);
            status
        });

        self.jobs
            .as_ref()
            .ok_or(VoxError::WorkerPoolClosed)?
            .send(job)
            .map_err(|_| VoxError::WorkerPoolClosed)?;

        reply_rx.await.map_err(|_| VoxError::WorkerPoolClosed)?
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    fn run_worker(job_rx: &Mutex<mpsc::Receiver<Job<E>>>, factory: &EngineFactory<E>) {
        let mut engine: Option<E> = None;

        loop {
            let next = job_rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
            let Ok(job) = next else {
                break;
            };

            if engine.is_none() {
                match factory() {
                    Ok(built) => {
                        tracing::debug!("Engine initialised on worker thread");
                        engine = Some(built);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Engine initialisation failed");
                        job(Err(e));
                        continue;
                    }
                }
            }

            let status = engine.as_mut().map(|engine| job(Ok(engine)));
            if status == Some(JobStatus::Panicked) {
                tracing::error!("Engine job panicked; rebuilding the engine on the next job");
                engine = None;
            }
        }

        // The engine is dropped here, on its own thread.
        tracing::debug!("Engine worker shutting down");
    }
}

impl<E: 'static> std::fmt::Debug for EnginePool<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePool")
            .field("name", &self.name)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl<E: 'static> Drop for EnginePool<E> {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop once its current job is done.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
