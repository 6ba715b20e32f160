//! Hearth Test - Shared test utilities for the Hearth plugin host.
//!
//! Builders for unit blobs, `.tgz` bundles and development projects, plus a
//! handful of sample extensions with their constructors.
//!
//! # Usage
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! hearth-test.workspace = true
//! ```
//!
//! Then, from an integration test:
//!
//! ```rust,ignore
//! use hearth_plugins::{BundleScanner, PluginLoader, PluginsLoadedListener};
//! use hearth_test::{sample_constructors, simple_bundle};
//!
//! #[tokio::test]
//! async fn loads_simple_bundle() {
//!     let tmp = tempfile::tempdir().unwrap();
//!     simple_bundle().write_to(tmp.path(), "simple");
//!
//!     let bundles = BundleScanner::new(tmp.path())
//!         .scan_default_locations()
//!         .await
//!         .unwrap();
//!     let registry = PluginLoader::new(sample_constructors())
//!         .load(bundles)
//!         .unwrap()
//!         .registry();
//!     assert_eq!(
//!         registry
//!             .get_implementations::<dyn PluginsLoadedListener>()
//!             .unwrap()
//!             .len(),
//!         1
//!     );
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod samples;

pub use fixtures::*;
pub use samples::*;
