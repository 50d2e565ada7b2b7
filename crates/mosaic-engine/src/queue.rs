//! Per-phase job queues.
//!
//! A queue spans one communication phase: it owns the phase's messenger,
//! routes posted jobs to the local in-process queue or to the owning
//! partition over the network, and drains the local queue on a single
//! worker thread. The worker idles the messenger whenever the local queue
//! runs dry; a delivered remote job reactivates it. Ending the phase
//! consumes the queue, so "wait for termination twice" cannot be written.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use mosaic_comm::{CommError, Communicator, Messenger};
use mosaic_graph::{Colors, Node, PartitionFunction};

use crate::{Job, JobKind};

/// Per-job callback. Runs on the worker thread and may post follow-up
/// jobs through the supplied sink — that is how propagation recurses.
pub type JobCallback<N, C> =
    Box<dyn FnMut(&JobSink<N, C>, Job<N, C>) -> Result<(), CommError> + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct LocalState<N, C> {
    jobs: VecDeque<Job<N, C>>,
    closed: bool,
}

struct LocalQueue<N, C> {
    state: Mutex<LocalState<N, C>>,
    ready: Condvar,
}

impl<N, C> LocalQueue<N, C> {
    fn new() -> Self {
        LocalQueue {
            state: Mutex::new(LocalState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn push(&self, job: Job<N, C>) -> Result<(), CommError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(CommError::ProtocolViolation(
                "posting a job on a finished job queue".into(),
            ));
        }
        state.jobs.push_back(job);
        self.ready.notify_one();
        Ok(())
    }

    fn close(&self) {
        lock(&self.state).closed = true;
        self.ready.notify_all();
    }
}

/// Cheap posting handle shared between the phase owner, the worker
/// callback and the delivery thread.
pub struct JobSink<N: Node, C: Colors> {
    partition: Arc<dyn PartitionFunction<N>>,
    messenger: Arc<dyn Messenger<Job<N, C>>>,
    local: Arc<LocalQueue<N, C>>,
}

impl<N: Node, C: Colors> Clone for JobSink<N, C> {
    fn clone(&self) -> Self {
        JobSink {
            partition: self.partition.clone(),
            messenger: self.messenger.clone(),
            local: self.local.clone(),
        }
    }
}

impl<N: Node, C: Colors> JobSink<N, C> {
    /// Enqueue a job: in-process when this rank owns the destination,
    /// through the messenger otherwise. Never blocks.
    pub fn post(&self, job: Job<N, C>) -> Result<(), CommError> {
        let owner = self.partition.owner_of(job.destination());
        if owner == self.partition.my_id() {
            self.local.push(job)
        } else {
            // message_sent accounting happens inside the messenger
            self.messenger.send_task(owner, job)
        }
    }
}

/// A single-worker job queue for one communication phase.
///
/// Lifecycle: create (registers the phase messenger — a global barrier),
/// post the seed jobs, then [`SingleWorkerQueue::wait_for_termination`].
/// Processing starts with the wait call; everything posted before it is
/// initial work, everything after only originates from the callback. This
/// ordering is what makes the idle/done accounting sound: the queue never
/// declares itself idle while the owner is still seeding.
pub struct SingleWorkerQueue<N: Node, C: Colors> {
    sink: JobSink<N, C>,
    callback: JobCallback<N, C>,
}

impl<N: Node, C: Colors> SingleWorkerQueue<N, C> {
    /// Open the phase for `kind` jobs. A global barrier: every rank must
    /// create the matching queue.
    pub fn new(
        communicator: &dyn Communicator<Job<N, C>>,
        partition: Arc<dyn PartitionFunction<N>>,
        kind: JobKind,
        callback: JobCallback<N, C>,
    ) -> Result<Self, CommError> {
        let local = Arc::new(LocalQueue::new());
        let delivery_local = local.clone();
        let messenger = communicator.listen_to(
            kind,
            Box::new(move |_, job| delivery_local.push(job)),
        )?;
        Ok(SingleWorkerQueue {
            sink: JobSink {
                partition,
                messenger,
                local,
            },
            callback,
        })
    }

    /// Post an initial job before processing starts.
    pub fn post(&self, job: Job<N, C>) -> Result<(), CommError> {
        self.sink.post(job)
    }

    pub fn sink(&self) -> &JobSink<N, C> {
        &self.sink
    }

    /// Start the worker, block until the phase is globally quiescent,
    /// then close the messenger (a global barrier) and stop the worker.
    ///
    /// Consumes the queue: a finished phase cannot be posted to or waited
    /// on again. Callback failures are recorded, the phase still drains
    /// to completion (termination detection must not be starved), and the
    /// first failure is returned.
    pub fn wait_for_termination(self) -> Result<(), CommError> {
        let SingleWorkerQueue { sink, callback } = self;
        let worker_sink = sink.clone();
        let worker = thread::spawn(move || worker_loop(worker_sink, callback));

        let close_result = sink.messenger.close();
        sink.local.close();
        let worker_result = worker
            .join()
            .map_err(|_| CommError::ProtocolViolation("job queue worker panicked".into()))?;
        close_result?;
        worker_result
    }
}

fn worker_loop<N: Node, C: Colors>(
    sink: JobSink<N, C>,
    mut callback: JobCallback<N, C>,
) -> Result<(), CommError> {
    let mut failure: Option<CommError> = None;
    loop {
        let job = {
            let mut state = lock(&sink.local.state);
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break Some(job);
                }
                if state.closed {
                    break None;
                }
                // Local queue drained: idle until a job arrives. The
                // terminator un-idles itself on any remote delivery.
                sink.messenger.set_idle()?;
                state = sink
                    .local
                    .ready
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };
        let Some(job) = job else {
            return match failure {
                Some(error) => Err(error),
                None => Ok(()),
            };
        };
        if failure.is_none() {
            if let Err(error) = callback(&sink, job) {
                tracing::debug!(%error, "job callback failed; draining phase");
                failure = Some(error);
            }
        }
    }
}
