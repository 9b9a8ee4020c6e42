pub mod completion;
pub mod job;
pub mod queue;

pub use completion::{Completion, CompletionHandle, CompletionSlot};
pub use job::{Job, JobParams, ResponseFormat, Transcription};
pub use queue::{admission_queue, AdmissionPermit, AdmissionQueue, QueueReceiver, Rejection};
