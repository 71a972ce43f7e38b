//! Long-lived worker threads for the CPU backend.
//!
//! Workers are spawned once and each keeps its own state (kernel scratch) for
//! its whole life. A run hands one job to each of the first `n` workers over
//! a bounded channel and then waits for `n` completion messages, which is the
//! barrier between dispatches. Panics inside a job are caught on the worker
//! and reported as a failed run; the worker stays alive for the next one.
//!
//! With a single worker no thread is spawned and jobs run on the caller's
//! thread, under the same panic guard.

use crossbeam::channel::{self, Receiver, Sender};
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::debug;

type Task<J, S> = Arc<dyn Fn(J, &mut S) + Send + Sync>;

/// Why a run did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("{0} job(s) panicked")]
    Panicked(usize),

    #[error("worker thread exited")]
    Disconnected,
}

enum Mode<J, S> {
    Inline(S),
    Threads {
        senders: Vec<Sender<J>>,
        done: Receiver<bool>,
        handles: Vec<JoinHandle<()>>,
    },
}

/// Fixed set of workers running `task` on jobs of type `J` with state `S`.
pub struct WorkerPool<J, S> {
    task: Task<J, S>,
    mode: Mode<J, S>,
}

impl<J, S> WorkerPool<J, S>
where
    J: Send + 'static,
    S: Send + 'static,
{
    /// Start `workers` workers, each with state from `make_state`.
    pub fn new<F>(
        name: &str,
        workers: usize,
        mut make_state: impl FnMut() -> S,
        task: F,
    ) -> io::Result<Self>
    where
        F: Fn(J, &mut S) + Send + Sync + 'static,
    {
        let task: Task<J, S> = Arc::new(task);
        if workers <= 1 {
            return Ok(Self {
                task,
                mode: Mode::Inline(make_state()),
            });
        }

        let (done_tx, done) = channel::bounded(workers);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for i in 0..workers {
            let (tx, rx) = channel::bounded::<J>(1);
            let task = Arc::clone(&task);
            let done_tx = done_tx.clone();
            let mut state = make_state();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || {
                    for job in rx.iter() {
                        let ok = panic::catch_unwind(AssertUnwindSafe(|| task(job, &mut state)))
                            .is_ok();
                        if done_tx.send(ok).is_err() {
                            break;
                        }
                    }
                })?;

            senders.push(tx);
            handles.push(handle);
        }

        debug!("Spawned {} {} workers", workers, name);
        Ok(Self {
            task,
            mode: Mode::Threads {
                senders,
                done,
                handles,
            },
        })
    }

    /// Number of jobs a single run can take.
    pub fn workers(&self) -> usize {
        match &self.mode {
            Mode::Inline(_) => 1,
            Mode::Threads { senders, .. } => senders.len(),
        }
    }

    /// Threads owned by the pool (0 when running inline).
    pub fn threads(&self) -> usize {
        match &self.mode {
            Mode::Inline(_) => 0,
            Mode::Threads { handles, .. } => handles.len(),
        }
    }

    /// Run `jobs` (at most [`workers`](Self::workers) of them) and wait until
    /// every one has finished.
    pub fn run<I>(&mut self, jobs: I) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = J>,
    {
        match &mut self.mode {
            Mode::Inline(state) => {
                let mut panicked = 0;
                for job in jobs {
                    let task = &self.task;
                    if panic::catch_unwind(AssertUnwindSafe(|| task(job, state))).is_err() {
                        panicked += 1;
                    }
                }
                match panicked {
                    0 => Ok(()),
                    n => Err(PoolError::Panicked(n)),
                }
            }
            Mode::Threads { senders, done, .. } => {
                let mut sent = 0;
                let mut disconnected = false;
                for (job, sender) in jobs.into_iter().zip(senders.iter()) {
                    match sender.send(job) {
                        Ok(()) => sent += 1,
                        Err(_) => disconnected = true,
                    }
                }

                // Wait for every accepted job so no completion leaks into the
                // next run.
                let mut panicked = 0;
                for _ in 0..sent {
                    match done.recv() {
                        Ok(true) => {}
                        Ok(false) => panicked += 1,
                        Err(_) => {
                            disconnected = true;
                            break;
                        }
                    }
                }

                if disconnected {
                    Err(PoolError::Disconnected)
                } else if panicked > 0 {
                    Err(PoolError::Panicked(panicked))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl<J, S> Drop for WorkerPool<J, S> {
    fn drop(&mut self) {
        if let Mode::Threads {
            senders, handles, ..
        } = &mut self.mode
        {
            // Closing the job channels ends each worker loop.
            senders.clear();
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

impl<J, S> fmt::Debug for WorkerPool<J, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (mode, threads) = match &self.mode {
            Mode::Inline(_) => ("inline", 0),
            Mode::Threads { handles, .. } => ("threads", handles.len()),
        };
        f.debug_struct("WorkerPool")
            .field("mode", &mode)
            .field("threads", &threads)
            .finish()
    }
}
