//! Layered configuration.
//!
//! The tree is built once at startup (defaults, then `LLM_KNIFE_*`
//! environment overrides, then up to four YAML/JSON files) and passed by
//! reference to whatever needs it.
//!
//! # Module layout
//!
//! - **tree**: `ConfigStore` with dotted-path `get`/`set` and deep merge.
//! - **load**: the three layers, candidate file paths, `save`.
//! - **types**: validated settings structs consumed by providers.

mod load;
mod tree;
mod types;

pub use load::{ConfigFormat, ENV_PREFIX, FileLayerReport, candidate_paths, default_save_path};
pub use tree::{ConfigStore, merge_values};
pub use types::*;
