//! Worker host crate (C3 Activity Layer, C7 Worker Host): binds the domain
//! ports from `agentctl-core` to concrete activities, registers the Build
//! and Task workflows, and drives both through a Temporal task queue.

pub mod activities;
pub mod client;
pub mod config;
pub mod registry;
pub mod worker;
pub mod workflows;

pub use activities::Dependencies;
pub use client::TemporalClient;
pub use config::{BuildConfig, DatabaseConfig, KvConfig, LlmConfig, PlatformConfig, WorkerConfig};
pub use registry::WorkflowRegistry;
pub use worker::{build_registry, TemporalWorker};
