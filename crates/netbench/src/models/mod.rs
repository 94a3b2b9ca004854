//! Data models and domain types for the netbench load generator.
//!
//! This module contains the core data structures used throughout the tool:
//! typed configuration models deserialized from CLI flags or a JSON config
//! file, and the error types shared by every component.
//!
//! # Module Organization
//!
//! - [`error`] - Benchmark-specific error types
//! - [`settings`] - Run and per-protocol configuration models

pub mod error;
pub mod settings;
