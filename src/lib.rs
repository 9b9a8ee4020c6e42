pub mod config;
pub mod error;
pub mod http;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod staging;
pub mod text;
pub mod worker;
