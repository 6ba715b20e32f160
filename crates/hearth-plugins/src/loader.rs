//! Loading context construction.
//!
//! [`PluginLoader::load`] turns scanned bundles into a [`LoadingContext`] in
//! strictly sequential stages:
//!
//! 1. merge every bundle's units and resources into one namespace,
//! 2. define every unit from its blob,
//! 3. link every unit against the defined units and the host catalog,
//! 4. instantiate each concrete unit that implements the extension marker.
//!
//! Any error aborts the load; no partially loaded context is returned.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use hearth_config::DuplicatePolicy;
use tracing::{debug, info, warn};
use url::Url;

use crate::bundle::DiscoveredBundle;
use crate::capability::{
    CapabilityType, ConstructorTable, Exports, InterfaceCatalog, MARKER, TypeHierarchy,
};
use crate::error::{PluginError, PluginResult};
use crate::plugin::PluginInstance;
use crate::registry::CapabilityRegistry;
use crate::resource::ResourceResolver;
use crate::unit::{DefinedUnit, UnitDescriptor};

/// One instantiated extension unit and the plugin that owns it.
pub struct CapabilityInstance {
    unit: Arc<DefinedUnit>,
    exports: Exports,
}

impl CapabilityInstance {
    /// Dotted name of the instantiated unit.
    #[must_use]
    pub fn unit_name(&self) -> &str {
        self.unit.name()
    }

    /// The instantiated unit.
    #[must_use]
    pub fn unit(&self) -> &Arc<DefinedUnit> {
        &self.unit
    }

    /// The owning plugin.
    #[must_use]
    pub fn plugin(&self) -> &Arc<PluginInstance> {
        self.unit.plugin()
    }

    /// The views returned by the unit's constructor.
    #[must_use]
    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    /// This instance viewed as capability `C`.
    #[must_use]
    pub fn get<C: ?Sized + CapabilityType>(&self) -> Option<Arc<C>> {
        self.exports.get::<C>()
    }
}

impl fmt::Debug for CapabilityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityInstance")
            .field("unit", &self.unit.name())
            .field("plugin", &self.plugin().name())
            .field("exports", &self.exports)
            .finish()
    }
}

/// Builds [`LoadingContext`]s from scanned bundles.
#[derive(Debug, Clone)]
pub struct PluginLoader {
    constructors: ConstructorTable,
    catalog: InterfaceCatalog,
    duplicates: DuplicatePolicy,
}

impl PluginLoader {
    /// A loader using `constructors`, the standard catalog, and
    /// last-write-wins duplicate handling.
    #[must_use]
    pub fn new(constructors: ConstructorTable) -> Self {
        Self {
            constructors,
            catalog: InterfaceCatalog::standard(),
            duplicates: DuplicatePolicy::default(),
        }
    }

    /// Use `catalog` as the host capability set.
    #[must_use]
    pub fn with_catalog(mut self, catalog: InterfaceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set how unit names supplied by several bundles are handled.
    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    /// Load `bundles` in order. Later bundles are "scanned later" for
    /// duplicate handling.
    ///
    /// # Errors
    ///
    /// Fails on duplicates under [`DuplicatePolicy::Reject`], malformed unit
    /// blobs, unresolvable unit names, and extension units that are not final
    /// or lack a registered zero-argument constructor.
    pub fn load(&self, bundles: Vec<DiscoveredBundle>) -> PluginResult<LoadingContext> {
        let merged = self.merge(bundles)?;
        let plugins = merged.plugins;

        let units = Definer::new(merged.units).define_all()?;
        debug!(units = units.len(), "Units defined");

        let hierarchy = self.build_hierarchy(&units);
        self.link(&units)?;
        debug!(units = units.len(), "Units linked");

        let instances = self.instantiate(&units, &hierarchy)?;
        info!(
            plugins = plugins.len(),
            units = units.len(),
            capabilities = instances.len(),
            "Plugins loaded"
        );

        Ok(LoadingContext {
            units,
            hierarchy: Arc::new(hierarchy),
            resources: ResourceResolver::new(merged.resources),
            instances: instances.into(),
            plugins,
        })
    }

    fn merge(&self, bundles: Vec<DiscoveredBundle>) -> PluginResult<Merged> {
        let mut merged = Merged::default();
        let mut resource_owners: HashMap<String, Arc<PluginInstance>> = HashMap::new();

        for bundle in bundles {
            let plugin = bundle.plugin;
            for (name, blob) in bundle.content.units {
                if let Some(previous) = merged.units.get(&name) {
                    self.on_duplicate(&previous.plugin, &plugin, || PluginError::DuplicateUnit {
                        name: name.clone(),
                        first: previous.plugin.name().to_owned(),
                        second: plugin.name().to_owned(),
                    })?;
                    warn!(
                        unit = %name,
                        replaced = previous.plugin.name(),
                        plugin = plugin.name(),
                        "Duplicate unit, keeping the later definition"
                    );
                }
                merged.units.insert(
                    name,
                    Pending {
                        blob,
                        plugin: Arc::clone(&plugin),
                    },
                );
            }
            for (path, bytes) in bundle.content.resources {
                if let Some(previous) = resource_owners.get(&path) {
                    self.on_duplicate(previous, &plugin, || PluginError::DuplicateResource {
                        path: path.clone(),
                        first: previous.name().to_owned(),
                        second: plugin.name().to_owned(),
                    })?;
                    warn!(
                        resource = %path,
                        replaced = previous.name(),
                        plugin = plugin.name(),
                        "Duplicate resource, keeping the later copy"
                    );
                }
                resource_owners.insert(path.clone(), Arc::clone(&plugin));
                merged.resources.insert(path, bytes);
            }
            merged.plugins.push(plugin);
        }
        Ok(merged)
    }

    fn on_duplicate(
        &self,
        previous: &Arc<PluginInstance>,
        current: &Arc<PluginInstance>,
        error: impl FnOnce() -> PluginError,
    ) -> PluginResult<()> {
        // A bundle cannot collide with itself.
        if Arc::ptr_eq(previous, current) {
            return Ok(());
        }
        match self.duplicates {
            DuplicatePolicy::LastWins => Ok(()),
            DuplicatePolicy::Reject => Err(error()),
        }
    }

    fn build_hierarchy(&self, units: &BTreeMap<String, Arc<DefinedUnit>>) -> TypeHierarchy {
        let mut hierarchy = TypeHierarchy::from_catalog(&self.catalog);
        for unit in units.values().filter(|u| u.is_interface()) {
            if !hierarchy.insert(unit.name(), unit.interfaces().to_vec()) {
                warn!(
                    unit = unit.name(),
                    plugin = unit.plugin().name(),
                    "Host capability shadows bundle interface"
                );
            }
        }
        hierarchy
    }

    fn link(&self, units: &BTreeMap<String, Arc<DefinedUnit>>) -> PluginResult<()> {
        for unit in units.values() {
            for name in unit.interfaces() {
                if self.catalog.contains(name) {
                    continue;
                }
                match units.get(name) {
                    Some(target) if !target.is_interface() => {
                        return Err(PluginError::InvalidUnit {
                            name: unit.name().to_owned(),
                            message: format!("{name} is a class, not an interface"),
                        });
                    },
                    Some(_) => {},
                    None => return Err(PluginError::UnitNotFound(name.clone())),
                }
            }
            for name in &unit.descriptor().references {
                if !self.catalog.contains(name) && !units.contains_key(name) {
                    return Err(PluginError::UnitNotFound(name.clone()));
                }
            }
        }
        Ok(())
    }

    fn instantiate(
        &self,
        units: &BTreeMap<String, Arc<DefinedUnit>>,
        hierarchy: &TypeHierarchy,
    ) -> PluginResult<Vec<Arc<CapabilityInstance>>> {
        let mut instances = Vec::new();
        for unit in units.values() {
            if !hierarchy.implements(unit.interfaces(), MARKER) {
                continue;
            }
            if !unit.descriptor().is_concrete() {
                debug!(unit = unit.name(), "Skipping non-concrete extension unit");
                continue;
            }
            instances.push(Arc::new(self.construct(unit, hierarchy)?));
        }
        Ok(instances)
    }

    fn construct(
        &self,
        unit: &Arc<DefinedUnit>,
        hierarchy: &TypeHierarchy,
    ) -> PluginResult<CapabilityInstance> {
        let invalid = |reason: String| PluginError::InvalidExtension {
            unit: unit.name().to_owned(),
            reason,
        };
        let descriptor = unit.descriptor();

        if !descriptor.is_final {
            return Err(invalid("extension units must be final".to_owned()));
        }
        let symbol = descriptor
            .constructor
            .as_deref()
            .ok_or_else(|| invalid("no zero-argument constructor".to_owned()))?;
        let constructor = self.constructors.get(symbol).ok_or_else(|| {
            invalid(format!(
                "zero-argument constructor '{symbol}' is not registered"
            ))
        })?;

        let exports = constructor();
        for capability in hierarchy.closure(unit.interfaces()) {
            if capability != MARKER
                && self.catalog.contains(&capability)
                && !exports.provides(&capability)
            {
                return Err(invalid(format!(
                    "constructor '{symbol}' does not export {capability}"
                )));
            }
        }

        debug!(
            unit = unit.name(),
            plugin = unit.plugin().name(),
            "Instantiated extension"
        );
        Ok(CapabilityInstance {
            unit: Arc::clone(unit),
            exports,
        })
    }
}

#[derive(Default)]
struct Merged {
    units: HashMap<String, Pending>,
    resources: HashMap<String, Vec<u8>>,
    plugins: Vec<Arc<PluginInstance>>,
}

struct Pending {
    blob: Vec<u8>,
    plugin: Arc<PluginInstance>,
}

/// Defines units from pending blobs, each exactly once.
struct Definer {
    pending: HashMap<String, Pending>,
    defined: BTreeMap<String, Arc<DefinedUnit>>,
}

impl Definer {
    fn new(pending: HashMap<String, Pending>) -> Self {
        Self {
            pending,
            defined: BTreeMap::new(),
        }
    }

    fn define_all(mut self) -> PluginResult<BTreeMap<String, Arc<DefinedUnit>>> {
        let mut names: Vec<String> = self.pending.keys().cloned().collect();
        names.sort();
        for name in names {
            self.define_or_get(&name)?;
        }
        // Blobs are released here; only parsed descriptors survive.
        Ok(self.defined)
    }

    /// Return the defined unit `name`, defining it (and every pending unit it
    /// reaches) first if needed. Reachable units are walked with a worklist,
    /// so reference chains of any length are fine.
    fn define_or_get(&mut self, name: &str) -> PluginResult<Arc<DefinedUnit>> {
        if let Some(unit) = self.defined.get(name) {
            return Ok(Arc::clone(unit));
        }
        let unit = self.define(name)?;
        let mut worklist = self.pending_dependencies(&unit);
        while let Some(next) = worklist.pop() {
            // Queued more than once before its first definition.
            if !self.pending.contains_key(&next) {
                continue;
            }
            let dependency = self.define(&next)?;
            worklist.extend(self.pending_dependencies(&dependency));
        }
        Ok(unit)
    }

    fn define(&mut self, name: &str) -> PluginResult<Arc<DefinedUnit>> {
        let pending = self
            .pending
            .remove(name)
            .ok_or_else(|| PluginError::UnitNotFound(name.to_owned()))?;
        let descriptor = UnitDescriptor::parse(name, &pending.blob)?;
        let unit = Arc::new(DefinedUnit::new(name, descriptor, pending.plugin));
        self.defined.insert(name.to_owned(), Arc::clone(&unit));
        Ok(unit)
    }

    fn pending_dependencies(&self, unit: &DefinedUnit) -> Vec<String> {
        unit.interfaces()
            .iter()
            .chain(&unit.descriptor().references)
            .filter(|dep| self.pending.contains_key(dep.as_str()))
            .cloned()
            .collect()
    }
}

/// The finished, read-only result of loading all bundles.
#[derive(Debug)]
pub struct LoadingContext {
    units: BTreeMap<String, Arc<DefinedUnit>>,
    hierarchy: Arc<TypeHierarchy>,
    resources: ResourceResolver,
    instances: Arc<[Arc<CapabilityInstance>]>,
    plugins: Vec<Arc<PluginInstance>>,
}

impl LoadingContext {
    /// The defined unit `name`. Repeated calls return the same unit.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnitNotFound`] if no bundle defines `name`.
    pub fn resolve_unit(&self, name: &str) -> PluginResult<Arc<DefinedUnit>> {
        self.units
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::UnitNotFound(name.to_owned()))
    }

    /// All defined unit names, sorted.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Merged resources of every bundle.
    #[must_use]
    pub fn resources(&self) -> &ResourceResolver {
        &self.resources
    }

    /// URL addressing resource `path`, or `None` if no bundle ships it.
    #[must_use]
    pub fn find_resource(&self, path: &str) -> Option<Url> {
        self.resources.find(path)
    }

    /// Open the resource addressed by `url`.
    ///
    /// # Errors
    ///
    /// See [`ResourceResolver::open_url`].
    pub fn open_resource_url(&self, url: &Url) -> PluginResult<std::io::Cursor<Arc<[u8]>>> {
        self.resources.open_url(url)
    }

    /// Every instantiated extension, in unit-name order.
    #[must_use]
    pub fn capability_instances(&self) -> &[Arc<CapabilityInstance>] {
        &self.instances
    }

    /// Every loaded plugin, in load order.
    #[must_use]
    pub fn plugins(&self) -> &[Arc<PluginInstance>] {
        &self.plugins
    }

    /// The interface hierarchy used for capability matching.
    #[must_use]
    pub fn hierarchy(&self) -> &Arc<TypeHierarchy> {
        &self.hierarchy
    }

    /// A registry over this context's capability instances.
    #[must_use]
    pub fn registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::new(Arc::clone(&self.instances), Arc::clone(&self.hierarchy))
    }
}
