use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::{Result, TranscribeError};
use crate::scheduler::{admission_queue, AdmissionQueue, CompletionHandle, Job, JobParams, QueueReceiver, Transcription};
use crate::staging::{StagedFile, Stager};
use crate::worker::{InferenceEngine, Worker};

/// Admission front of the transcription pipeline.
///
/// Callers stage their input, are admitted into the bounded queue (or rejected
/// immediately when it is full), then suspend until the worker delivers their
/// result.
pub struct TranscriptionService {
    config: ServiceConfig,
    queue: AdmissionQueue,
    stager: Stager,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TranscriptionService {
    /// Create the service and the receiving end of its queue. No worker runs
    /// until [`start_worker`](Self::start_worker) is called.
    pub fn new(config: ServiceConfig) -> Result<(Self, QueueReceiver)> {
        Self::with_shutdown(config, CancellationToken::new())
    }

    /// Like [`new`](Self::new), stopping when `shutdown` is cancelled.
    pub fn with_shutdown(
        config: ServiceConfig,
        shutdown: CancellationToken,
    ) -> Result<(Self, QueueReceiver)> {
        if config.queue_capacity == 0 {
            return Err(TranscribeError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }

        let (queue, rx) = admission_queue(config.queue_capacity, shutdown.clone());
        let service = Self {
            stager: Stager::new(config.staging_dir.clone()),
            config,
            queue,
            shutdown,
            worker: Mutex::new(None),
        };

        tracing::info!(
            capacity = service.config.queue_capacity,
            staging_dir = %service.config.staging_dir.display(),
            "Transcription service initialized"
        );
        Ok((service, rx))
    }

    /// Create the service and spawn its worker around `engine`.
    pub async fn start<E: InferenceEngine>(engine: E, config: ServiceConfig) -> Result<Self> {
        Self::start_with_shutdown(engine, config, CancellationToken::new()).await
    }

    pub async fn start_with_shutdown<E: InferenceEngine>(
        engine: E,
        config: ServiceConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let (service, rx) = Self::with_shutdown(config, shutdown)?;
        service.start_worker(engine, rx).await?;
        Ok(service)
    }

    /// Spawn the worker loop. Only one worker may run per service.
    pub async fn start_worker<E: InferenceEngine>(&self, engine: E, jobs: QueueReceiver) -> Result<()> {
        let mut slot = self.worker.lock().await;
        if slot.is_some() {
            return Err(TranscribeError::Internal(
                "worker already started".to_string(),
            ));
        }

        let worker = Worker::new(
            engine,
            jobs,
            self.shutdown.clone(),
            self.config.shutdown_policy,
        );
        *slot = Some(tokio::spawn(worker.run()));
        tracing::info!("Background worker started");
        Ok(())
    }

    /// Stage `data`, admit it and wait for its transcription.
    ///
    /// A queue slot is reserved before anything touches the disk, so a full
    /// queue rejects without staging.
    pub async fn submit(
        &self,
        data: &[u8],
        file_name: Option<&str>,
        params: JobParams,
    ) -> Result<Transcription> {
        let permit = self.queue.try_reserve()?;
        let input = self.stager.stage(data, file_name).await?;

        let (job, handle) = Job::new(input, params);
        let job_id = job.id();
        permit.admit(job);

        tracing::info!(job_id = %job_id, depth = self.queue.len(), "Job submitted");
        self.wait(handle).await
    }

    /// Admit an already staged input and wait for its transcription.
    ///
    /// If admission fails the input is released before the error is returned.
    pub async fn submit_staged(&self, input: StagedFile, params: JobParams) -> Result<Transcription> {
        let (job, handle) = Job::new(input, params);
        let job_id = job.id();

        if let Err(rejection) = self.queue.enqueue(job) {
            let (job, error) = rejection.into_parts();
            if let Err(e) = job.input.release().await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to release rejected input");
            }
            return Err(error);
        }

        tracing::info!(job_id = %job_id, depth = self.queue.len(), "Job submitted");
        self.wait(handle).await
    }

    async fn wait(&self, handle: CompletionHandle) -> Result<Transcription> {
        match self.config.request_timeout {
            Some(limit) => wait_with_deadline(handle, limit).await,
            None => handle.wait().await,
        }
    }

    /// Stop admission, let the worker apply its shutdown policy and wait for it.
    pub async fn shutdown(&self) {
        self.queue.stop();
        self.shutdown.cancel();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Transcription service stopped");
    }

    /// True while the worker loop task is alive.
    pub async fn worker_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn is_accepting(&self) -> bool {
        !self.queue.is_stopped()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

async fn wait_with_deadline(handle: CompletionHandle, limit: Duration) -> Result<Transcription> {
    match tokio::time::timeout(limit, handle.wait()).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(timeout = ?limit, "Caller gave up waiting for result");
            Err(TranscribeError::DeadlineExceeded(limit))
        }
    }
}
