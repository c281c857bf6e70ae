//! Core types for the Lectern document ingestion service.
//!
//! This crate holds the error taxonomy, configuration, and domain models
//! shared by the storage, database, worker, and API crates. It has no
//! I/O of its own beyond reading the environment at startup.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
