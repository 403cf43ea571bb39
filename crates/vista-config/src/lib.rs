//! Configuration for the Vista terrain streaming engine.
//!
//! Settings persist to disk as RON files, accept CLI overrides via clap,
//! and stay forward/backward compatible through `#[serde(default)]`.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{BuildConfig, Config, DebugConfig, DemoConfig, FieldConfig, LodConfig, MeshConfig};
pub use error::ConfigError;
