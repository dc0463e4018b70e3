//! Parameter store synchronization library.
//!
//! This library pushes `.env` files into a path-addressed parameter store
//! (AWS SSM Parameter Store by default), pulls namespaces back into `.env`
//! form, and purges namespaces behind a confirmation gate.
//!
//! # Features
//!
//! - **Lossless parsing**: quoted, escaped and multi-line values survive the trip
//! - **Secret detection**: sensitive keys and opaque-looking values are stored encrypted
//! - **Bounded batches**: at most three remote calls in flight, with per-item results
//! - **Fatal error triage**: credential, expiry and permission failures stop a batch early
//! - **Optional tracing**: Detailed logging when the `tracing` feature is enabled
//!
//! # Example
//!
//! ```rust,no_run
//! use paramsync::console::Console;
//! use paramsync::ssm::{SsmConfig, SsmStore};
//! use paramsync::sync::{SyncEngine, SyncOptions};
//! use std::path::PathBuf;
//!
//! # async fn run() -> Result<(), paramsync::sync::SyncError> {
//! let store = SsmStore::connect(&SsmConfig::default()).await;
//! let console = Console::stdout(false);
//! let options = SyncOptions {
//!     namespace: Some("/prod/api".to_string()),
//!     file: Some(PathBuf::from(".env")),
//!     ..SyncOptions::default()
//! };
//!
//! SyncEngine::new(&store, &console).sync(options).await?;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod confirm;
pub mod console;
pub mod export;
pub mod memory;
pub mod parse;
pub mod path;
pub mod pool;
pub mod purge;
#[cfg(feature = "ssm")]
pub mod ssm;
pub mod store;
pub mod sync;
