//! On-disk cache for vmdiff runs.
//!
//! Persists diff bodies in a directory tree that mirrors the entity keys,
//! persists the tree index as two JSON blobs, and reads both back for the
//! browsing surface (`forest`, `children`, `get_diff`).
//!
//! # Key Types
//!
//! - [`RunLayout`] -- Where one run's files live
//! - [`DiffCache`] -- Store, load and query diffs and the tree index
//! - [`ApiMaterializer`] -- Export a ready cache as static per-key files

pub mod api;
pub mod error;
pub mod layout;
pub mod store;

pub use api::{api_file_name, ApiMaterializer, MaterializeSummary};
pub use error::{CacheError, CacheResult};
pub use layout::RunLayout;
pub use store::{DiffCache, SENTINEL_FILE};
