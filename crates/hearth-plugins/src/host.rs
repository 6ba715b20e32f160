//! One-call plugin host: scan, load, and index.

use std::path::Path;
use std::sync::Arc;

use hearth_config::PluginsSection;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capability::{CapabilityType, ConstructorTable, InterfaceCatalog, PluginsLoadedListener};
use crate::error::PluginResult;
use crate::loader::{LoadingContext, PluginLoader};
use crate::plugin::PluginInstance;
use crate::registry::{CapabilityRegistry, Implementation};
use crate::scanner::BundleScanner;

/// Loaded plugins and the registry over their extensions.
#[derive(Debug)]
pub struct PluginHost {
    context: LoadingContext,
    registry: CapabilityRegistry,
}

impl PluginHost {
    /// Scan the locations in `section`, load every bundle found, and build
    /// the registry.
    ///
    /// # Errors
    ///
    /// Any scan or load error; nothing is loaded if one occurs.
    pub async fn load(
        section: &PluginsSection,
        workspace_root: &Path,
        constructors: ConstructorTable,
        catalog: InterfaceCatalog,
        cancel: CancellationToken,
    ) -> PluginResult<Self> {
        let scanner =
            BundleScanner::from_config(section, workspace_root).with_cancellation(cancel);
        let loader = PluginLoader::new(constructors)
            .with_catalog(catalog)
            .with_duplicate_policy(section.duplicate_units);
        Self::build(&scanner, &loader, |_| Ok(())).await
    }

    /// Scan with `scanner` (running `prepare` first) and load with `loader`.
    ///
    /// # Errors
    ///
    /// Any scan or load error.
    pub async fn build<F>(
        scanner: &BundleScanner,
        loader: &PluginLoader,
        prepare: F,
    ) -> PluginResult<Self>
    where
        F: FnOnce(&Path) -> PluginResult<()>,
    {
        let bundles = scanner.scan(prepare).await?;
        let context = loader.load(bundles)?;
        let registry = context.registry();
        info!(
            plugins = context.plugins().len(),
            capabilities = registry.len(),
            "Plugin host ready"
        );
        Ok(Self { context, registry })
    }

    /// The loading context.
    #[must_use]
    pub fn context(&self) -> &LoadingContext {
        &self.context
    }

    /// The capability registry.
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Every loaded plugin.
    #[must_use]
    pub fn plugins(&self) -> &[Arc<PluginInstance>] {
        self.context.plugins()
    }

    /// Shorthand for [`CapabilityRegistry::get_implementations`].
    ///
    /// # Errors
    ///
    /// See [`CapabilityRegistry::get_implementations`].
    pub fn get_implementations<T>(&self) -> PluginResult<Arc<[Implementation<T>]>>
    where
        T: ?Sized + CapabilityType,
    {
        self.registry.get_implementations::<T>()
    }

    /// Call every [`PluginsLoadedListener`] with its owning plugin, returning
    /// how many were called.
    ///
    /// # Errors
    ///
    /// See [`CapabilityRegistry::get_implementations`].
    pub fn notify_plugins_loaded(&self) -> PluginResult<usize> {
        let listeners = self.get_implementations::<dyn PluginsLoadedListener>()?;
        for listener in listeners.iter() {
            listener
                .capability
                .after_plugins_loaded(&listener.plugin, self.context.resources());
        }
        Ok(listeners.len())
    }
}
