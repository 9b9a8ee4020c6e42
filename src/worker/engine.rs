use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::runtime::Handle;

use crate::config::EngineConfig;
use crate::scheduler::JobParams;

/// Languages the engine understands natively. Anything else runs as "auto".
pub const SUPPORTED_LANGUAGES: [&str; 5] = ["zh", "en", "yue", "ja", "ko"];

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine not loaded")]
    NotLoaded,

    #[error("Engine must be loaded from within a tokio runtime")]
    NoRuntime,

    #[error("Engine program not found: {0}")]
    NotFound(String),

    #[error("Inference failed: {0}")]
    Failed(String),

    #[error("Inference timed out after {0:?}")]
    TimedOut(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for a single inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub language: String,
    pub use_itn: bool,
}

impl EngineOptions {
    pub fn new(language: &str, use_itn: bool) -> Self {
        let language = if SUPPORTED_LANGUAGES.contains(&language) {
            language.to_string()
        } else {
            "auto".to_string()
        };
        Self { language, use_itn }
    }
}

impl From<&JobParams> for EngineOptions {
    fn from(params: &JobParams) -> Self {
        Self::new(&params.language, params.use_itn)
    }
}

/// A stateful inference context that must never run two calls at once.
///
/// `transcribe` blocks; callers run it on a blocking thread and hold the
/// engine exclusively for the duration of the call.
pub trait InferenceEngine: Send + 'static {
    /// Prepare the engine (load weights, warm up). Called once before serving.
    fn load(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn transcribe(&mut self, input: &Path, options: &EngineOptions) -> Result<String, EngineError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn load(&mut self) -> Result<(), EngineError> {
        (**self).load()
    }

    fn transcribe(&mut self, input: &Path, options: &EngineOptions) -> Result<String, EngineError> {
        (**self).transcribe(input, options)
    }
}

/// Runs an external inference program once per job and returns its stdout.
///
/// The child process is driven on the runtime captured by [`load`]. Calls to
/// `transcribe` block on that runtime, so they must come from a blocking
/// thread such as one started by `spawn_blocking`.
///
/// [`load`]: InferenceEngine::load
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: EngineConfig,
    runtime: Option<Handle>,
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            runtime: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn render_args(&self, input: &Path, options: &EngineOptions) -> Vec<String> {
        let input = input.to_string_lossy();
        let itn = if options.use_itn { "true" } else { "false" };
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{language}", &options.language)
                    .replace("{itn}", itn)
                    .replace("{model}", &self.config.model_id)
            })
            .collect()
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.config.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }

        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, EngineError> {
        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => Ok(output?),
                Err(_) => {
                    // Dropping the output future drops the child, which kills it.
                    tracing::warn!(timeout = ?limit, "Inference process timed out, killed");
                    Err(EngineError::TimedOut(limit))
                }
            },
            None => Ok(child.wait_with_output().await?),
        }
    }

    fn process_output(output: Output) -> Result<String, EngineError> {
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() {
            format!("Exit code: {:?}", output.status.code())
        } else {
            stderr.trim().to_string()
        };
        Err(EngineError::Failed(message))
    }
}

impl InferenceEngine for CommandEngine {
    fn load(&mut self) -> Result<(), EngineError> {
        if self.runtime.is_some() {
            tracing::warn!("Engine already loaded, skipping");
            return Ok(());
        }

        let program = self
            .resolve_program()
            .ok_or_else(|| EngineError::NotFound(self.config.program.clone()))?;
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        tracing::info!(
            program = %program.display(),
            model = %self.config.model_id,
            "Inference engine ready"
        );
        self.runtime = Some(runtime);
        Ok(())
    }

    fn transcribe(&mut self, input: &Path, options: &EngineOptions) -> Result<String, EngineError> {
        let Some(runtime) = self.runtime.clone() else {
            return Err(EngineError::NotLoaded);
        };

        let args = self.render_args(input, options);
        tracing::debug!(program = %self.config.program, ?args, "Running inference");

        let output = runtime.block_on(self.run(args))?;
        Self::process_output(output)
    }
}
