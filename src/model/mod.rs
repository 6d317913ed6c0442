//! Data models for Stackbridge.
//!
//! This module contains the record snapshots exchanged with connectors:
//! - SourceEntity / TargetEntity
//! - EntityPayload (write payload)
//! - Role / Domain (hierarchy roles and their concrete names)

pub mod entity;
pub mod role;

pub use entity::{EntityPayload, SourceEntity, TargetEntity};
pub use role::{Domain, Role};
