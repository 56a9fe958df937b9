//! core
//!
//! Core domain types, configuration and coordination primitives.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, BranchName, RefName, RepoId, GitlinkPath
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for gitlink-sync storage
//! - [`ops`] - Per-branch locking
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Configuration is resolved once and passed down explicitly

pub mod config;
pub mod ops;
pub mod paths;
pub mod types;
