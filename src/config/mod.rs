//! Pipeline Configuration Module
//!
//! Provides the TOML-backed configuration consumed by `Pipeline::new`.
//!
//! ## Loading
//!
//! 1. `PipelineConfig::load_from_file(path)` for an operator-supplied file
//! 2. `PipelineConfig::default()` for the built-in values
//!
//! The configuration is an explicit value: callers construct it once and
//! pass it in. There is no process-wide instance.
//!
//! ## Usage
//!
//! ```ignore
//! let config = PipelineConfig::load_from_file(Path::new("rigscan.toml"))?;
//! let pipeline = Pipeline::new(config, Arc::new(BaselineModel::new()))?;
//! ```

mod pipeline_config;
pub mod defaults;
pub mod validation;

pub use pipeline_config::*;
