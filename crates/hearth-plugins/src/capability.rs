//! Capability types, constructor registration, and the interface hierarchy.
//!
//! Host capabilities are Rust traits bound to a stable dotted name through
//! [`CapabilityType`], implemented on the trait object type:
//!
//! ```rust
//! use hearth_plugins::{CapabilityType, Extension, MARKER};
//!
//! /// Something a plugin can greet with.
//! pub trait Greeter: Extension {
//!     fn greet(&self) -> String;
//! }
//!
//! impl CapabilityType for dyn Greeter {
//!     const NAME: &'static str = "demo.Greeter";
//!     const EXTENDS: &'static [&'static str] = &[MARKER];
//! }
//! ```
//!
//! Units name capabilities in their `interfaces` list. A unit's constructor
//! is a plain `fn() -> Exports` registered in a [`ConstructorTable`]; the
//! [`Exports`] it returns carry one typed view per capability.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::plugin::PluginInstance;
use crate::resource::ResourceResolver;

/// Name of the root capability marker.
pub const MARKER: &str = "hearth.Extension";

/// Binds a capability trait object type to its dotted name and direct supers.
pub trait CapabilityType: Send + Sync + 'static {
    /// Stable dotted name units use to refer to this capability.
    const NAME: &'static str;
    /// Names of the capabilities this one directly extends.
    const EXTENDS: &'static [&'static str];
}

/// Root marker every capability extends, directly or transitively.
pub trait Extension: Send + Sync {}

impl CapabilityType for dyn Extension {
    const NAME: &'static str = MARKER;
    const EXTENDS: &'static [&'static str] = &[];
}

/// Called once the host has finished loading all plugins.
pub trait PluginsLoadedListener: Extension {
    /// React to plugin loading. `plugin` is the plugin that owns this
    /// capability; `resources` resolves every bundle's resources.
    fn after_plugins_loaded(&self, plugin: &PluginInstance, resources: &ResourceResolver);
}

impl CapabilityType for dyn PluginsLoadedListener {
    const NAME: &'static str = "hearth.PluginsLoadedListener";
    const EXTENDS: &'static [&'static str] = &[MARKER];
}

/// The host's capability interfaces, by name.
///
/// Host entries take precedence over bundle units with the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCatalog {
    entries: BTreeMap<&'static str, &'static [&'static str]>,
}

impl InterfaceCatalog {
    /// A catalog holding only the root marker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
        .declare::<dyn Extension>()
    }

    /// The root marker plus [`PluginsLoadedListener`].
    #[must_use]
    pub fn standard() -> Self {
        Self::new().declare::<dyn PluginsLoadedListener>()
    }

    /// Add capability `C`.
    #[must_use]
    pub fn declare<C: ?Sized + CapabilityType>(mut self) -> Self {
        self.entries.insert(C::NAME, C::EXTENDS);
        self
    }

    /// Whether `name` is a host capability.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Direct supers of host capability `name`.
    #[must_use]
    pub fn supers(&self, name: &str) -> Option<&'static [&'static str]> {
        self.entries.get(name).copied()
    }

    /// All host capability names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

impl Default for InterfaceCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Typed capability views exported by one constructed unit.
#[derive(Default)]
pub struct Exports {
    views: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Exports {
    /// No views.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `view` as capability `C`.
    #[must_use]
    pub fn with<C: ?Sized + CapabilityType>(mut self, view: Arc<C>) -> Self {
        self.views.insert(C::NAME, Box::new(view));
        self
    }

    /// The view exported as capability `C`.
    #[must_use]
    pub fn get<C: ?Sized + CapabilityType>(&self) -> Option<Arc<C>> {
        self.views.get(C::NAME)?.downcast_ref::<Arc<C>>().cloned()
    }

    /// Whether a view is exported under capability name `name`.
    #[must_use]
    pub fn provides(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: BTreeSet<_> = self.views.keys().collect();
        f.debug_struct("Exports").field("views", &names).finish()
    }
}

/// A zero-argument unit constructor.
pub type Constructor = fn() -> Exports;

/// Constructor symbols to constructors.
#[derive(Debug, Clone, Default)]
pub struct ConstructorTable {
    entries: HashMap<String, Constructor>,
}

impl ConstructorTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `symbol`.
    #[must_use]
    pub fn with(mut self, symbol: impl Into<String>, constructor: Constructor) -> Self {
        self.register(symbol, constructor);
        self
    }

    /// Register `constructor` under `symbol`, returning any constructor it replaces.
    pub fn register(
        &mut self,
        symbol: impl Into<String>,
        constructor: Constructor,
    ) -> Option<Constructor> {
        self.entries.insert(symbol.into(), constructor)
    }

    /// Add every entry of `other`, replacing clashing symbols.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// The constructor registered under `symbol`.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Constructor> {
        self.entries.get(symbol).copied()
    }

    /// Number of registered constructors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no constructors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Interface name to the interfaces it directly extends.
///
/// Built from the host catalog plus every interface unit; shared read-only
/// by the loading context and the registry.
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    supers: HashMap<String, Vec<String>>,
}

impl TypeHierarchy {
    /// A hierarchy holding exactly the catalog's capabilities.
    #[must_use]
    pub fn from_catalog(catalog: &InterfaceCatalog) -> Self {
        let supers = catalog
            .entries
            .iter()
            .map(|(name, supers)| {
                (
                    (*name).to_owned(),
                    supers.iter().map(|s| (*s).to_owned()).collect(),
                )
            })
            .collect();
        Self { supers }
    }

    /// Record interface `name`. Existing entries are kept.
    pub fn insert(&mut self, name: impl Into<String>, supers: Vec<String>) -> bool {
        match self.supers.entry(name.into()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(supers);
                true
            },
        }
    }

    /// Whether `name` is a known interface.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.supers.contains_key(name)
    }

    /// Whether a type directly implementing `direct` implements `target`,
    /// walking super-interfaces recursively.
    #[must_use]
    pub fn implements<S: AsRef<str>>(&self, direct: &[S], target: &str) -> bool {
        let mut visited = HashSet::new();
        direct
            .iter()
            .any(|name| self.reaches(name.as_ref(), target, &mut visited))
    }

    fn reaches<'a>(&'a self, name: &'a str, target: &str, visited: &mut HashSet<&'a str>) -> bool {
        if name == target {
            return true;
        }
        if !visited.insert(name) {
            return false;
        }
        self.supers.get(name).is_some_and(|supers| {
            supers
                .iter()
                .any(|sup| self.reaches(sup.as_str(), target, visited))
        })
    }

    /// Every interface a type directly implementing `direct` implements.
    #[must_use]
    pub fn closure<S: AsRef<str>>(&self, direct: &[S]) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = direct.iter().map(AsRef::as_ref).collect();
        while let Some(name) = stack.pop() {
            if seen.insert(name.to_owned())
                && let Some(supers) = self.supers.get(name)
            {
                stack.extend(supers.iter().map(String::as_str));
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Extension {
        fn name(&self) -> &str;
    }

    impl CapabilityType for dyn Named {
        const NAME: &'static str = "test.Named";
        const EXTENDS: &'static [&'static str] = &[MARKER];
    }

    struct Fixed;

    impl Extension for Fixed {}

    impl Named for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn standard_catalog_contents() {
        let catalog = InterfaceCatalog::standard();
        assert!(catalog.contains(MARKER));
        assert_eq!(
            catalog.supers("hearth.PluginsLoadedListener"),
            Some(&[MARKER][..])
        );
        assert!(!catalog.contains("test.Named"));
        assert!(catalog.declare::<dyn Named>().contains("test.Named"));
    }

    #[test]
    fn exports_round_trip_typed_views() {
        let exports = Exports::new().with::<dyn Named>(Arc::new(Fixed));
        assert!(exports.provides("test.Named"));
        assert_eq!(exports.get::<dyn Named>().unwrap().name(), "fixed");
        assert!(exports.get::<dyn PluginsLoadedListener>().is_none());
    }

    #[test]
    fn constructor_table_lookup() {
        fn build() -> Exports {
            Exports::new()
        }
        let mut table = ConstructorTable::new().with("a", build);
        assert!(table.get("a").is_some());
        assert!(table.get("b").is_none());
        assert!(table.register("a", build).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn hierarchy_walks_transitively() {
        let mut hierarchy = TypeHierarchy::from_catalog(&InterfaceCatalog::standard());
        hierarchy.insert("p.Base", vec![MARKER.to_owned()]);
        hierarchy.insert("p.Derived", vec!["p.Base".to_owned()]);

        assert!(hierarchy.implements(&["p.Derived"], MARKER));
        assert!(hierarchy.implements(&["p.Derived"], "p.Base"));
        assert!(!hierarchy.implements(&["p.Base"], "p.Derived"));
        assert!(!hierarchy.implements(&["p.Unrelated"], MARKER));

        let closure = hierarchy.closure(&["p.Derived"]);
        assert_eq!(
            closure.into_iter().collect::<Vec<_>>(),
            vec![MARKER, "p.Base", "p.Derived"]
        );
    }

    #[test]
    fn hierarchy_tolerates_cycles() {
        let mut hierarchy = TypeHierarchy::default();
        hierarchy.insert("a", vec!["b".to_owned()]);
        hierarchy.insert("b", vec!["a".to_owned()]);
        assert!(!hierarchy.implements(&["a"], MARKER));
        assert_eq!(hierarchy.closure(&["a"]).len(), 2);
    }

    #[test]
    fn insert_keeps_first_entry() {
        let mut hierarchy = TypeHierarchy::from_catalog(&InterfaceCatalog::new());
        assert!(!hierarchy.insert(MARKER, vec!["x".to_owned()]));
        assert!(!hierarchy.implements(&[MARKER], "x"));
    }
}
