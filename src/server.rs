use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::http::{router, AppState};
use crate::service::TranscriptionService;
use crate::worker::{CommandEngine, EngineError, InferenceEngine};

/// Process-level wiring of engine, service and HTTP listener.
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run with the configured command-line engine until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
        let engine = CommandEngine::new(self.config.engine.clone());
        self.run_with_engine(engine, shutdown).await
    }

    /// Run the server around `engine`.
    ///
    /// 1. Loads the engine (fails fast if it cannot be prepared)
    /// 2. Starts the transcription service and its worker loop
    /// 3. Serves HTTP until `shutdown` is cancelled
    /// 4. Stops admission and waits for the worker to finish
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to load, the configuration is
    /// invalid, or the listener cannot be bound.
    pub async fn run_with_engine<E: InferenceEngine>(
        self,
        mut engine: E,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        tracing::info!(model = %self.config.engine.model_id, "Loading inference engine");
        let engine = tokio::task::spawn_blocking(move || -> Result<E, EngineError> {
            engine.load()?;
            Ok(engine)
        })
        .await??;

        let service = Arc::new(
            TranscriptionService::start_with_shutdown(
                engine,
                self.config.service.clone(),
                shutdown.clone(),
            )
            .await?,
        );

        let app = router(AppState {
            service: service.clone(),
            model_id: self.config.engine.model_id.clone(),
        });

        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        tracing::info!(addr = %self.config.listen_addr, "Listening for requests");

        let serve_shutdown = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await;

        service.shutdown().await;
        served?;
        Ok(())
    }
}
