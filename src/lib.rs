//! Stackbridge - hierarchy-preserving migration between work trackers and wikis
//!
//! This crate provides the core functionality for the `sb` CLI tool: it
//! reconciles a source system (Jira, Confluence) against a target system
//! (OpenProject, BookStack) so that re-running a migration never duplicates
//! records and parent/child structure survives the move.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Layered settings (flags/env, config file, defaults)
//! - [`connector`] - Platform connectors behind source/target traits
//! - [`mapping`] - Issue type/status/priority name tables
//! - [`model`] - Entity snapshots, payloads and hierarchy roles
//! - [`sync`] - Pagination, matching, planning, hierarchy and reporting
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod connector;
pub mod error;
pub mod mapping;
pub mod model;
pub mod sync;

pub use error::{Error, Result};
