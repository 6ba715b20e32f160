//! Sample extensions and the bundles that ship them.

use std::sync::Arc;

use hearth_plugins::{
    CapabilityType, ConstructorTable, Exports, Extension, InterfaceCatalog, MARKER,
    PluginInstance, PluginsLoadedListener, ResourceResolver,
};

use crate::fixtures::{ArchiveBuilder, UnitSpec};

/// Name of [`PluginsLoadedListener`] as units refer to it.
pub const LISTENER: &str = <dyn PluginsLoadedListener as CapabilityType>::NAME;

/// Constructor symbol of [`SimpleListener`].
pub const SIMPLE_CTOR: &str = "sample::simple";
/// Constructor symbol of [`TwinListener`].
pub const TWIN_CTOR: &str = "sample::twin";
/// Constructor symbol of [`Quiet`].
pub const QUIET_CTOR: &str = "sample::quiet";
/// Constructor symbol of [`Loud`].
pub const LOUD_CTOR: &str = "sample::loud";

/// Unit name of [`SimpleListener`].
pub const SIMPLE_UNIT: &str = "sample.simple.SimpleListener";
/// Unit name of [`TwinListener`].
pub const TWIN_UNIT: &str = "sample.twin.TwinListener";
/// Interface unit shipped by twin A and implemented by twin B.
pub const TWIN_API_UNIT: &str = "sample.twin.TwinApi";

/// Resource shipped by twin A.
pub const TWIN_A_RESOURCE: &str = "sample/twin/stringA.txt";
/// Resource shipped by twin B.
pub const TWIN_B_RESOURCE: &str = "sample/twin/stringB.txt";

/// Counts how often plugins finished loading, in its plugin's state (`u32`).
pub struct SimpleListener;

impl Extension for SimpleListener {}

impl PluginsLoadedListener for SimpleListener {
    fn after_plugins_loaded(&self, plugin: &PluginInstance, _resources: &ResourceResolver) {
        plugin.update_state::<u32, _>(|count| *count = count.saturating_add(1));
    }
}

/// Stores both twins' resources, concatenated, in its plugin's state (`String`).
pub struct TwinListener;

impl Extension for TwinListener {}

impl PluginsLoadedListener for TwinListener {
    fn after_plugins_loaded(&self, plugin: &PluginInstance, resources: &ResourceResolver) {
        let joined = resources.read_to_string(TWIN_A_RESOURCE).and_then(|a| {
            resources
                .read_to_string(TWIN_B_RESOURCE)
                .map(|b| format!("{a}{b}"))
        });
        match joined {
            Ok(text) => {
                plugin.set_state(text);
            },
            Err(e) => tracing::warn!(error = %e, "Twin resources unavailable"),
        }
    }
}

/// A capability reporting a display name.
pub trait Named: Extension {
    /// Display name.
    fn display_name(&self) -> String;
}

impl CapabilityType for dyn Named {
    const NAME: &'static str = "sample.Named";
    const EXTENDS: &'static [&'static str] = &[MARKER];
}

/// A [`Named`] that can also shout.
pub trait LoudNamed: Named {
    /// Upper-cased display name.
    fn shout(&self) -> String;
}

impl CapabilityType for dyn LoudNamed {
    const NAME: &'static str = "sample.LoudNamed";
    const EXTENDS: &'static [&'static str] = &["sample.Named"];
}

/// Implements [`Named`] only.
pub struct Quiet;

impl Extension for Quiet {}

impl Named for Quiet {
    fn display_name(&self) -> String {
        "quiet".to_owned()
    }
}

/// Implements [`Named`] and [`LoudNamed`].
pub struct Loud;

impl Extension for Loud {}

impl Named for Loud {
    fn display_name(&self) -> String {
        "loud".to_owned()
    }
}

impl LoudNamed for Loud {
    fn shout(&self) -> String {
        self.display_name().to_uppercase()
    }
}

fn simple() -> Exports {
    Exports::new().with::<dyn PluginsLoadedListener>(Arc::new(SimpleListener))
}

fn twin() -> Exports {
    Exports::new().with::<dyn PluginsLoadedListener>(Arc::new(TwinListener))
}

fn quiet() -> Exports {
    Exports::new().with::<dyn Named>(Arc::new(Quiet))
}

fn loud() -> Exports {
    let loud = Arc::new(Loud);
    Exports::new()
        .with::<dyn Named>(loud.clone())
        .with::<dyn LoudNamed>(loud)
}

/// Constructors of every sample extension.
#[must_use]
pub fn sample_constructors() -> ConstructorTable {
    ConstructorTable::new()
        .with(SIMPLE_CTOR, simple)
        .with(TWIN_CTOR, twin)
        .with(QUIET_CTOR, quiet)
        .with(LOUD_CTOR, loud)
}

/// The standard catalog plus [`Named`] and [`LoudNamed`].
#[must_use]
pub fn sample_catalog() -> InterfaceCatalog {
    InterfaceCatalog::standard()
        .declare::<dyn Named>()
        .declare::<dyn LoudNamed>()
}

/// Bundle with one [`SimpleListener`] and a helper class it links against.
#[must_use]
pub fn simple_bundle() -> ArchiveBuilder {
    ArchiveBuilder::new()
        .with_manifest()
        .unit(
            SIMPLE_UNIT,
            &UnitSpec::extension(LISTENER, SIMPLE_CTOR).references("sample.simple.Helper"),
        )
        .unit("sample.simple.Helper", &UnitSpec::class())
}

/// Twin A: ships `"abc"` and the interface twin B implements.
#[must_use]
pub fn twin_a_bundle() -> ArchiveBuilder {
    ArchiveBuilder::new()
        .unit(TWIN_API_UNIT, &UnitSpec::interface().implements(LISTENER))
        .file(TWIN_A_RESOURCE, "abc")
}

/// Twin B: ships `"def"` and the [`TwinListener`].
#[must_use]
pub fn twin_b_bundle() -> ArchiveBuilder {
    ArchiveBuilder::new()
        .unit(TWIN_UNIT, &UnitSpec::extension(TWIN_API_UNIT, TWIN_CTOR))
        .file(TWIN_B_RESOURCE, "def")
}
