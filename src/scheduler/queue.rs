use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::TranscribeError;
use crate::scheduler::job::Job;

/// A job the queue refused, handed back so its submitter can release the input.
#[derive(Debug)]
pub struct Rejection {
    pub job: Job,
    pub error: TranscribeError,
}

impl Rejection {
    pub fn into_parts(self) -> (Job, TranscribeError) {
        (self.job, self.error)
    }
}

/// Submitter side of the bounded FIFO of admitted jobs.
///
/// Capacity is enforced by the channel itself: `try_send` and
/// `try_reserve_owned` check and claim a slot in one step.
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<Job>,
    stopped: CancellationToken,
}

/// Worker side of the admission queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Job>,
}

/// A reserved queue slot. Admitting through it cannot fail.
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: mpsc::OwnedPermit<Job>,
}

/// Create a queue holding at most `capacity` jobs.
///
/// `stopped` is cancelled when shutdown begins; from then on every admission
/// is refused with `ServiceStopped`.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn admission_queue(capacity: usize, stopped: CancellationToken) -> (AdmissionQueue, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (AdmissionQueue { tx, stopped }, QueueReceiver { rx })
}

impl AdmissionQueue {
    /// Append `job`, or hand it back if the queue is full or stopped.
    pub fn enqueue(&self, job: Job) -> Result<(), Rejection> {
        if self.stopped.is_cancelled() {
            return Err(Rejection {
                job,
                error: TranscribeError::ServiceStopped,
            });
        }

        let job_id = job.id;
        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, depth = self.len(), "Job admitted");
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                tracing::warn!(job_id = %job_id, capacity = self.capacity(), "Admission queue at capacity, job rejected");
                Err(Rejection {
                    job,
                    error: TranscribeError::AdmissionRejected {
                        capacity: self.capacity(),
                    },
                })
            }
            Err(TrySendError::Closed(job)) => Err(Rejection {
                job,
                error: TranscribeError::ServiceStopped,
            }),
        }
    }

    /// Claim a slot before the job exists, so a full queue is detected
    /// before any input is staged.
    pub fn try_reserve(&self) -> Result<AdmissionPermit, TranscribeError> {
        if self.stopped.is_cancelled() {
            return Err(TranscribeError::ServiceStopped);
        }

        match self.tx.clone().try_reserve_owned() {
            Ok(permit) => Ok(AdmissionPermit { permit }),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(capacity = self.capacity(), "Admission queue at capacity, submission rejected");
                Err(TranscribeError::AdmissionRejected {
                    capacity: self.capacity(),
                })
            }
            Err(TrySendError::Closed(_)) => Err(TranscribeError::ServiceStopped),
        }
    }

    /// Refuse all further admissions. Already queued jobs are left for the worker.
    pub fn stop(&self) {
        self.stopped.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled() || self.tx.is_closed()
    }

    /// Jobs waiting for the worker, including reserved slots.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }
}

impl AdmissionPermit {
    pub fn admit(self, job: Job) {
        let job_id = job.id;
        self.permit.send(job);
        tracing::debug!(job_id = %job_id, "Job admitted");
    }
}

impl QueueReceiver {
    /// Wait for the oldest job. Returns `None` once the queue is closed and empty.
    pub async fn dequeue(&mut self) -> Option<Job> {
        self.rx.recv().await
    }

    pub fn try_dequeue(&mut self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting jobs. Jobs already queued can still be dequeued.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
