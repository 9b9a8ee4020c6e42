//! Single-flight execution of transcription jobs.
//!
//! - **Engine**: the exclusive inference context and its command-line implementation
//! - **Processor**: the worker loop that drains the admission queue
//!
//! # Execution Flow
//!
//! 1. [`Worker::run`] dequeues the oldest admitted job
//! 2. The engine runs on a blocking thread while holding the engine lock
//! 3. Raw output is post-processed into a [`Transcription`](crate::scheduler::Transcription)
//! 4. The staged input is released, then the caller's completion slot is filled

pub mod engine;
pub mod processor;

pub use engine::{CommandEngine, EngineError, EngineOptions, InferenceEngine};
pub use processor::Worker;
