//! Configuration management for the external tool's config files
//!
//! - **document**: one `key = value` file with comment-preserving save
//! - **registry**: cache of documents for an installation, profile overlays
//! - **profile**: profile directories (snapshot, rename, delete)

pub mod document;
pub mod error;
pub mod profile;
pub mod registry;

pub use document::ConfigDocument;
pub use profile::{ProfileStore, SnapshotStrategy};
pub use registry::ConfigRegistry;
