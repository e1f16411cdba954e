//! Data-driven configuration for Bathys: tuning constants and boat layouts
//! loaded from RON, TOML or JSON files.

pub mod loader;
pub mod schema;

pub use loader::{Boat, DataLoadError, load_boat_dir, load_layout, load_tuning};
