//! # scholar-badges
//!
//! Keeps the Google Scholar badges in a README current.
//!
//! ## Modules
//!
//! - [`scholar`] - Scholar profile retrieval and parsing
//! - [`fetcher`] - Retry loop with hard per-attempt timeouts (worker process)
//! - [`proxy`] - Proxy list loading and rotation
//! - [`patcher`] - Badge rewriting
//! - [`pipeline`] - Fetch-then-patch run
//! - [`metrics`] - The metrics record
//! - [`config`] - Run configuration
//! - [`cookies`] - Cookie persistence
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scholar_badges::{config::RunConfig, fetcher::WorkerCommand, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::default();
//!     let worker = WorkerCommand::current_exe(&config)?;
//!     let summary = pipeline::run(&config, worker).await?;
//!     println!("{:?}", summary.update);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cookies;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod patcher;
pub mod pipeline;
pub mod proxy;
pub mod scholar;

pub use error::{MetricsError, Result};
