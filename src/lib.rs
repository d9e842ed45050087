//! Queue-driven orchestration of containerised training jobs.
//!
//! `trainbot` accepts training-job requests, queues them, and runs each one
//! inside an isolated container on a Docker-compatible engine, capturing its
//! output to per-attempt log files and recording the final status.
//!
//! # Architecture
//!
//! A single [`worker::Worker`] consumes the bounded [`queue::JobQueue`] one
//! job at a time and drives it through an [`agent::TrainingAgent`], which
//! owns the container for each attempt and applies the retry policy. The
//! [`api::Orchestrator`] façade owns the worker's lifecycle and exposes
//! submission, lookup, listing, cancellation and statistics.
//!
//! # Modules
//!
//! - [`agent`]: Container lifecycle controller and log streaming
//! - [`api`]: Orchestration façade
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Container engine connection and the `ContainerRuntime` seam
//! - [`error`]: Semantic error types for the application
//! - [`job`]: Job records, statuses, and per-job configuration
//! - [`logging`]: `tracing` subscriber installation
//! - [`queue`]: Job store and bounded FIFO queue
//! - [`worker`]: The single consuming worker loop

pub mod agent;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod queue;
pub mod worker;
