use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use transcribe_lite::config::{
    EngineConfig, ServerConfig, ServiceConfig, ShutdownPolicy, DEFAULT_QUEUE_CAPACITY,
};
use transcribe_lite::server::Server;
use transcribe_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "transcribe-lite")]
#[command(version)]
#[command(about = "A single-flight speech transcription service with bounded admission")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the transcription HTTP server
    Server(ServerArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the HTTP server to
    #[arg(long, env = "TRANSCRIBE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "TRANSCRIBE_PORT", default_value = "50070")]
    port: u16,

    /// Maximum number of jobs waiting for the engine
    #[arg(long, env = "TRANSCRIBE_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Directory for staged uploads (defaults to the system temp dir)
    #[arg(long, env = "TRANSCRIBE_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Inference program invoked once per job
    #[arg(long, env = "TRANSCRIBE_ENGINE_PROGRAM", default_value = "sensevoice")]
    engine_program: String,

    /// Argument for the inference program (repeatable). Supports the
    /// placeholders {input}, {language}, {itn} and {model}.
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Model identifier passed to the engine as {model}
    #[arg(long, env = "TRANSCRIBE_MODEL_ID", default_value = "iic/SenseVoiceSmall")]
    model_id: String,

    /// Upper bound on a single inference, in seconds (0 disables)
    #[arg(long, default_value = "600")]
    engine_timeout_secs: u64,

    /// How long a request waits for its result, in seconds (0 waits forever)
    #[arg(long, default_value = "0")]
    request_timeout_secs: u64,

    /// Fail queued jobs on shutdown instead of draining them
    #[arg(long)]
    fail_pending_on_shutdown: bool,
}

impl ServerArgs {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let listen_addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;

        let mut service = ServiceConfig::default().with_capacity(self.queue_capacity);
        if let Some(dir) = self.staging_dir {
            service = service.with_staging_dir(dir);
        }
        if self.request_timeout_secs > 0 {
            service = service.with_request_timeout(Duration::from_secs(self.request_timeout_secs));
        }
        if self.fail_pending_on_shutdown {
            service = service.with_shutdown_policy(ShutdownPolicy::FailPending);
        }

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            program: self.engine_program,
            args: if self.engine_args.is_empty() {
                defaults.args
            } else {
                self.engine_args
            },
            model_id: self.model_id,
            timeout: (self.engine_timeout_secs > 0)
                .then(|| Duration::from_secs(self.engine_timeout_secs)),
        };

        Ok(ServerConfig {
            listen_addr,
            service,
            engine,
        })
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config()?;
    tracing::info!(
        addr = %config.listen_addr,
        queue_capacity = config.service.queue_capacity,
        engine = %config.engine.program,
        "Starting transcribe-lite server"
    );

    let shutdown = install_shutdown_handler()?;
    Server::new(config).run(shutdown).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await,
    }
}
