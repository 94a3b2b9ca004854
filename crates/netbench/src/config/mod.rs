//! Configuration loading and validation.
//!
//! - [`settings`] - JSON config file loading
//! - [`validation`] - cross-field validation of a run configuration

pub mod settings;
pub mod validation;
