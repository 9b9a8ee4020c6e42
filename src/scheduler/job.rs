use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::scheduler::completion::{completion_pair, Completion, CompletionHandle, CompletionSlot};
use crate::staging::StagedFile;
use crate::text::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    VerboseJson,
    Text,
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ResponseFormat::Json),
            "verbose_json" => Ok(ResponseFormat::VerboseJson),
            "text" => Ok(ResponseFormat::Text),
            other => Err(format!("Unsupported response_format: {}", other)),
        }
    }
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseFormat::Json => write!(f, "json"),
            ResponseFormat::VerboseJson => write!(f, "verbose_json"),
            ResponseFormat::Text => write!(f, "text"),
        }
    }
}

/// Per-job options consumed by the engine and by post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    /// Language hint passed to the engine ("auto" lets it detect).
    pub language: String,
    /// Strip engine markup from the primary output.
    pub clean: bool,
    /// Inverse text normalization ("one hundred" -> "100").
    pub use_itn: bool,
    pub response_format: ResponseFormat,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
            clean: true,
            use_itn: true,
            response_format: ResponseFormat::default(),
        }
    }
}

impl JobParams {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }
}

/// Result delivered to the caller of a successful job.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub job_id: Uuid,
    /// Post-processed output, identical to `raw_text` when `cleaned` is false.
    pub text: String,
    pub raw_text: String,
    pub language: String,
    pub admitted_at: DateTime<Utc>,
    /// Seconds from admission to completion.
    pub processing_seconds: f64,
    pub cleaned: bool,
}

impl Transcription {
    /// Build the result of `job` from the engine's raw output.
    ///
    /// `language` is the hint the engine actually ran with, after mapping.
    pub fn from_raw(job: &Job, raw_text: String, language: impl Into<String>) -> Self {
        let text = if job.params.clean {
            normalize(&raw_text)
        } else {
            raw_text.clone()
        };

        Self {
            job_id: job.id,
            text,
            raw_text,
            language: language.into(),
            admitted_at: job.admitted_at,
            processing_seconds: job.elapsed().as_secs_f64(),
            cleaned: job.params.clean,
        }
    }
}

/// One unit of work: a staged input, its options and the slot its outcome goes to.
#[derive(Debug)]
pub struct Job {
    pub(crate) id: Uuid,
    pub(crate) input: StagedFile,
    pub(crate) params: JobParams,
    pub(crate) admitted_at: DateTime<Utc>,
    pub(crate) admitted: Instant,
    pub(crate) slot: CompletionSlot,
}

impl Job {
    /// Create a job that owns `input`, and the handle its caller waits on.
    pub fn new(input: StagedFile, params: JobParams) -> (Self, CompletionHandle) {
        let (slot, handle) = completion_pair();
        let job = Self {
            id: Uuid::new_v4(),
            input,
            params,
            admitted_at: Utc::now(),
            admitted: Instant::now(),
            slot,
        };
        (job, handle)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    pub fn input(&self) -> &StagedFile {
        &self.input
    }

    pub fn admitted_at(&self) -> DateTime<Utc> {
        self.admitted_at
    }

    /// Time since admission
    pub fn elapsed(&self) -> Duration {
        self.admitted.elapsed()
    }

    /// Release the staged input and deliver `outcome`, in that order.
    ///
    /// A cleanup failure is logged and never replaces the outcome.
    pub async fn finish(self, outcome: Completion) -> bool {
        let Job {
            id,
            input,
            mut slot,
            ..
        } = self;

        if let Err(e) = input.release().await {
            tracing::warn!(job_id = %id, error = %e, "Failed to release staged input");
        }

        let delivered = slot.fill(outcome);
        if !delivered {
            tracing::debug!(job_id = %id, "Caller no longer waiting, outcome discarded");
        }
        delivered
    }
}
