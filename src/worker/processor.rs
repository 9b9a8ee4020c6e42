use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ShutdownPolicy;
use crate::error::{Result, TranscribeError};
use crate::scheduler::{Job, QueueReceiver, Transcription};
use crate::worker::engine::{EngineOptions, InferenceEngine};

/// The single consumer of the admission queue.
///
/// Owns the engine for the lifetime of the service. Every call goes through
/// the engine mutex, so at most one inference is in flight even if more than
/// one worker were ever pointed at the same engine.
pub struct Worker<E: InferenceEngine> {
    engine: Arc<Mutex<E>>,
    jobs: QueueReceiver,
    shutdown: CancellationToken,
    policy: ShutdownPolicy,
}

impl<E: InferenceEngine> Worker<E> {
    pub fn new(
        engine: E,
        jobs: QueueReceiver,
        shutdown: CancellationToken,
        policy: ShutdownPolicy,
    ) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            jobs,
            shutdown,
            policy,
        }
    }

    /// Process jobs in admission order until shutdown.
    ///
    /// The loop ends when the shutdown token is cancelled or every submitter
    /// handle is gone. A failing job never ends it.
    pub async fn run(mut self) {
        tracing::info!(policy = ?self.policy, "Worker loop started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                job = self.jobs.dequeue() => job,
            };

            match job {
                Some(job) => self.process(job).await,
                None => {
                    tracing::info!("Admission queue closed, worker loop exiting");
                    return;
                }
            }
        }

        self.stop().await;
    }

    async fn stop(&mut self) {
        self.jobs.close();
        let pending = self.jobs.len();
        tracing::info!(pending, policy = ?self.policy, "Worker loop stopping");

        while let Some(job) = self.jobs.dequeue().await {
            match self.policy {
                ShutdownPolicy::Drain => self.process(job).await,
                ShutdownPolicy::FailPending => {
                    tracing::info!(job_id = %job.id, "Failing queued job on shutdown");
                    job.finish(Err(TranscribeError::ServiceStopped)).await;
                }
            }
        }

        tracing::info!("Worker loop stopped");
    }

    async fn process(&self, job: Job) {
        if job.slot.is_abandoned() {
            tracing::info!(job_id = %job.id, "Caller gone before processing, skipping job");
            job.finish(Err(TranscribeError::ServiceStopped)).await;
            return;
        }

        let options = EngineOptions::from(&job.params);
        tracing::info!(
            job_id = %job.id,
            language = %options.language,
            admitted_at = %job.admitted_at.to_rfc3339(),
            queued_ms = job.elapsed().as_millis() as u64,
            "Processing job"
        );

        let language = options.language.clone();
        let outcome = self
            .infer(job.input.path().to_path_buf(), options)
            .await
            .map(|raw| Transcription::from_raw(&job, raw, language));

        match &outcome {
            Ok(t) => tracing::info!(
                job_id = %job.id,
                processing_seconds = t.processing_seconds,
                cleaned = t.cleaned,
                "Job completed"
            ),
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "Job failed"),
        }

        job.finish(outcome).await;
    }

    async fn infer(&self, input: std::path::PathBuf, options: EngineOptions) -> Result<String> {
        let mut engine = self.engine.clone().lock_owned().await;

        let task = tokio::task::spawn_blocking(move || engine.transcribe(&input, &options));

        match task.await {
            Ok(result) => result.map_err(TranscribeError::from),
            Err(e) => Err(TranscribeError::ProcessingFailed(format!(
                "inference task aborted: {}",
                e
            ))),
        }
    }
}
