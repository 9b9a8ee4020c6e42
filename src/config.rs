use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// What the worker does with jobs still queued when shutdown begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Run every already-admitted job to completion before stopping.
    #[default]
    Drain,
    /// Fail every still-queued job with `ServiceStopped`.
    FailPending,
}

/// Configuration for the admission queue and worker loop.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum number of jobs waiting for the engine.
    pub queue_capacity: usize,
    /// Directory staged inputs are written to.
    pub staging_dir: PathBuf,
    pub shutdown_policy: ShutdownPolicy,
    /// Deadline for a caller waiting on its result. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            staging_dir: std::env::temp_dir(),
            shutdown_policy: ShutdownPolicy::default(),
            request_timeout: None,
        }
    }
}

impl ServiceConfig {
    pub fn with_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_staging_dir(mut self, staging_dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = staging_dir.into();
        self
    }

    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Configuration for the external inference program.
///
/// Arguments may contain the placeholders `{input}`, `{language}`, `{itn}`
/// and `{model}`, substituted per job.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub program: String,
    pub args: Vec<String>,
    pub model_id: String,
    /// Upper bound on a single transcription. `None` disables the limit.
    pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "sensevoice".to_string(),
            args: vec![
                "--model".to_string(),
                "{model}".to_string(),
                "--language".to_string(),
                "{language}".to_string(),
                "--use-itn".to_string(),
                "{itn}".to_string(),
                "{input}".to_string(),
            ],
            model_id: "iic/SenseVoiceSmall".to_string(),
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub service: ServiceConfig,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:50070"
                .parse()
                .expect("default listen address is valid"),
            service: ServiceConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_config_default() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.queue_capacity, 50);
        assert_eq!(cfg.staging_dir, std::env::temp_dir());
        assert_eq!(cfg.shutdown_policy, ShutdownPolicy::Drain);
        assert!(cfg.request_timeout.is_none());
    }

    #[test]
    fn service_config_builders() {
        let cfg = ServiceConfig::default()
            .with_capacity(5)
            .with_staging_dir("/var/tmp/stage")
            .with_shutdown_policy(ShutdownPolicy::FailPending)
            .with_request_timeout(Duration::from_secs(30));
        assert_eq!(cfg.queue_capacity, 5);
        assert_eq!(cfg.staging_dir, PathBuf::from("/var/tmp/stage"));
        assert_eq!(cfg.shutdown_policy, ShutdownPolicy::FailPending);
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn engine_config_default_has_input_placeholder() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.model_id, "iic/SenseVoiceSmall");
        assert!(cfg.args.iter().any(|a| a == "{input}"));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:50070");
        assert_eq!(cfg.service.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn server_config_new() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr);
        assert_eq!(cfg.listen_addr, addr);
    }
}
