//! submit-runner library crate
//!
//! Wires the submission engine to its collaborators: the HTTP submitter,
//! the PostgreSQL write-back gateway and the metrics exporter.
//! The binary entrypoint is in `main.rs`.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod pipeline;

pub use client::{HttpSubmitter, Submitter};
pub use config::Config;
pub use db::{PersistenceGateway, PgGateway, SubmittedIds};
pub use error::RunnerError;
pub use pipeline::{BatchSummary, Pipeline, RecordOutcome, SubmissionRecord};
