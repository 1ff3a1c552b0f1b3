//! Declarative system provisioning engine.
//!
//! Blueprint files (YAML, JSON or TOML) describe the desired state of a
//! machine: package managers, repositories, packages, services, scripts and
//! more. The engine locates them, resolves templates, imports and profiles,
//! and hands each file to the processor for its kind in a fixed run order,
//! using whichever package managers the host provides.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: init file, profiles and template variables
//! - **[`blueprint`]**: decoding, imports, templating and file order
//! - **[`providers`]**: package manager definitions, detection and commands
//! - **[`processors`]**: per-kind appliers behind the [`processors::Processor`] trait
//! - **[`engine`]**: the bootstrap and the run-order orchestrator
//! - **[`commands`]**: top-level subcommand orchestration (`all`, `providers`, `profiles`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod blueprint;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod logging;
pub mod platform;
pub mod processors;
pub mod providers;
