// src/config/mod.rs

//! Configuration loading and validation for taskexec.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate engine settings and matcher definitions (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, EngineSection, EngineSettings, parse_duration};
pub use validate::{MAX_KILL_TIMEOUT, validate_config};
