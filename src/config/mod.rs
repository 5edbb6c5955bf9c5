//! Configuration for composition-watcher
//!
//! Built-in defaults, then an optional YAML file, then environment overrides.

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{Config, parse_duration};
