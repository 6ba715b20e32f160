//! Runtime plugin loading for the Hearth host.
//!
//! Plugins ship as bundles of code units and resources. Loading runs in
//! three steps:
//!
//! - [`BundleScanner`]: finds `.tgz` bundles in the plugins directory and
//!   reads development projects' build output, fanning out one task per
//!   directory and file
//! - [`PluginLoader`]: merges all bundles into one [`LoadingContext`],
//!   defines and links every unit, and instantiates each final unit that
//!   implements the [`Extension`] marker
//! - [`CapabilityRegistry`]: answers `get_implementations::<dyn T>()` with
//!   per-type caching
//!
//! [`PluginHost`] runs all three from a [`PluginsSection`](hearth_config::PluginsSection).
//!
//! # Plugin State
//!
//! Every bundle gets one [`PluginInstance`] shared by all of its extensions.
//! Its state slot is untyped and never shared with other plugins.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use hearth_plugins::{ConstructorTable, InterfaceCatalog, PluginHost};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), hearth_plugins::PluginError> {
//! let config = hearth_config::Config::load(Some(Path::new(".")))?;
//! let host = PluginHost::load(
//!     &config.config.plugins,
//!     Path::new("."),
//!     ConstructorTable::new(),
//!     InterfaceCatalog::standard(),
//!     CancellationToken::new(),
//! )
//! .await?;
//! host.notify_plugins_loaded()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bundle;
pub mod capability;
pub mod error;
pub mod host;
pub mod loader;
pub mod plugin;
pub mod registry;
pub mod resource;
pub mod scanner;
pub mod unit;

pub use hearth_config::DevLayoutSection;

pub use bundle::{BundleContent, BundleOrigin, DiscoveredBundle, unit_name_from_path};
pub use capability::{
    CapabilityType, Constructor, ConstructorTable, Exports, Extension, InterfaceCatalog, MARKER,
    PluginsLoadedListener, TypeHierarchy,
};
pub use error::{PluginError, PluginResult};
pub use host::PluginHost;
pub use loader::{CapabilityInstance, LoadingContext, PluginLoader};
pub use plugin::{PluginInfo, PluginInstance};
pub use registry::{CapabilityRegistry, Implementation};
pub use resource::{RESOURCE_HOST, RESOURCE_SCHEME, ResourceResolver, resource_url};
pub use scanner::{BundleScanner, read_archive};
pub use unit::{DefinedUnit, UnitDescriptor, UnitKind};
