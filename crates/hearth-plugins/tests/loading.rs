//! Loading-context and registry behavior over in-memory bundles.

use std::sync::{Arc, Barrier};

use hearth_config::{DEFAULT_MAX_ENTRY_SIZE, DuplicatePolicy};
use hearth_plugins::{
    BundleOrigin, DiscoveredBundle, LoadingContext, PluginError, PluginInstance, PluginLoader,
    PluginsLoadedListener, read_archive,
};
use hearth_test::{
    ArchiveBuilder, LISTENER, LOUD_CTOR, LoudNamed, Named, QUIET_CTOR, SIMPLE_CTOR, SIMPLE_UNIT,
    UnitSpec, sample_catalog, sample_constructors, simple_bundle,
};
use tokio_util::sync::CancellationToken;

fn bundle(plugin: &str, archive: &ArchiveBuilder) -> DiscoveredBundle {
    let content = read_archive(
        archive.build().as_slice(),
        DEFAULT_MAX_ENTRY_SIZE,
        &CancellationToken::new(),
    )
    .unwrap();
    DiscoveredBundle {
        content,
        plugin: Arc::new(PluginInstance::new(plugin)),
        origin: BundleOrigin::Archive(format!("{plugin}.tgz").into()),
    }
}

fn load(bundles: Vec<DiscoveredBundle>) -> Result<LoadingContext, PluginError> {
    PluginLoader::new(sample_constructors())
        .with_catalog(sample_catalog())
        .load(bundles)
}

fn names_bundle() -> ArchiveBuilder {
    ArchiveBuilder::new()
        .unit("c.Quiet", &UnitSpec::extension("sample.Named", QUIET_CTOR))
        .unit("c.Loud", &UnitSpec::extension("sample.LoudNamed", LOUD_CTOR))
        .unit("c.Shouty", &UnitSpec::interface().implements("sample.LoudNamed"))
        .unit("c.Shouter", &UnitSpec::extension("c.Shouty", LOUD_CTOR))
}

// ---------------------------------------------------------------------------
// Duplicate names
// ---------------------------------------------------------------------------

fn duplicate_bundles() -> Vec<DiscoveredBundle> {
    let first = ArchiveBuilder::new()
        .unit("dup.Shared", &UnitSpec::class())
        .file("dup/data.txt", "first");
    let second = ArchiveBuilder::new()
        .unit("dup.Shared", &UnitSpec::extension(LISTENER, SIMPLE_CTOR))
        .file("dup/data.txt", "second");
    vec![bundle("first", &first), bundle("second", &second)]
}

#[test]
fn later_bundle_wins_duplicate_names() {
    let context = load(duplicate_bundles()).unwrap();

    let unit = context.resolve_unit("dup.Shared").unwrap();
    assert_eq!(unit.plugin().name(), "second");
    assert_eq!(context.capability_instances().len(), 1);
    assert_eq!(
        context.resources().read_to_string("dup/data.txt").unwrap(),
        "second"
    );
}

#[test]
fn reject_policy_fails_on_duplicate_names() {
    let err = PluginLoader::new(sample_constructors())
        .with_duplicate_policy(DuplicatePolicy::Reject)
        .load(duplicate_bundles())
        .unwrap_err();
    assert!(
        matches!(
            err,
            PluginError::DuplicateUnit { ref name, ref first, ref second }
                if name == "dup.Shared" && first == "first" && second == "second"
        ),
        "got: {err}"
    );
}

// ---------------------------------------------------------------------------
// Malformed extensions
// ---------------------------------------------------------------------------

fn assert_invalid_extension(broken: &UnitSpec, unit: &str) {
    let archive = ArchiveBuilder::new().unit(unit, broken);
    let err = load(vec![
        bundle("valid", &simple_bundle()),
        bundle("broken", &archive),
    ])
    .unwrap_err();
    assert!(
        matches!(err, PluginError::InvalidExtension { unit: ref u, .. } if u == unit),
        "got: {err}"
    );
}

#[test]
fn non_final_extension_aborts_load() {
    let open = UnitSpec::class().implements(LISTENER).constructor(SIMPLE_CTOR);
    assert_invalid_extension(&open, "broken.Open");
}

#[test]
fn extension_without_constructor_aborts_load() {
    let no_ctor = UnitSpec::class().sealed().implements(LISTENER);
    assert_invalid_extension(&no_ctor, "broken.NoCtor");
}

#[test]
fn extension_with_unknown_constructor_aborts_load() {
    let unknown = UnitSpec::extension(LISTENER, "nobody::home");
    assert_invalid_extension(&unknown, "broken.Unknown");
}

#[test]
fn extension_missing_a_view_aborts_load() {
    // The quiet constructor exports `Named` but not `LoudNamed`.
    let missing = UnitSpec::extension("sample.LoudNamed", QUIET_CTOR);
    assert_invalid_extension(&missing, "broken.Missing");
}

#[test]
fn transitive_marker_requires_final() {
    let archive = ArchiveBuilder::new()
        .unit("t.Sub", &UnitSpec::interface().implements(LISTENER))
        .unit(
            "t.Impl",
            &UnitSpec::class().implements("t.Sub").constructor(SIMPLE_CTOR),
        );
    let err = load(vec![bundle("t", &archive)]).unwrap_err();
    assert!(matches!(err, PluginError::InvalidExtension { ref unit, .. } if unit == "t.Impl"));
}

#[test]
fn abstract_extensions_are_skipped() {
    let archive = ArchiveBuilder::new()
        .unit("a.Base", &UnitSpec::abstract_class().implements(LISTENER))
        .unit("a.Interface", &UnitSpec::interface().implements(LISTENER));
    let context = load(vec![bundle("a", &archive)]).unwrap();
    assert!(context.capability_instances().is_empty());
    assert!(context.resolve_unit("a.Base").is_ok());
}

#[test]
fn malformed_blob_aborts_load() {
    let archive = ArchiveBuilder::new().file("bad/Blob.unit", vec![0xca, 0xfe, 0xba, 0xbe]);
    let err = load(vec![bundle("bad", &archive)]).unwrap_err();
    assert!(matches!(err, PluginError::InvalidUnit { ref name, .. } if name == "bad.Blob"));
}

// ---------------------------------------------------------------------------
// Capability closure and registry
// ---------------------------------------------------------------------------

#[test]
fn implementations_follow_transitive_interfaces() {
    let context = load(vec![bundle("names", &names_bundle())]).unwrap();
    let registry = context.registry();

    let named = registry.get_implementations::<dyn Named>().unwrap();
    let units: Vec<_> = named.iter().map(|i| i.unit.to_string()).collect();
    assert_eq!(units, vec!["c.Loud", "c.Quiet", "c.Shouter"]);
    let display: Vec<_> = named.iter().map(|i| i.capability.display_name()).collect();
    assert_eq!(display, vec!["loud", "quiet", "loud"]);

    let loud = registry.get_implementations::<dyn LoudNamed>().unwrap();
    let units: Vec<_> = loud.iter().map(|i| i.unit.to_string()).collect();
    assert_eq!(units, vec!["c.Loud", "c.Shouter"]);
    assert_eq!(loud[0].capability.shout(), "LOUD");

    assert!(
        registry
            .get_implementations::<dyn PluginsLoadedListener>()
            .unwrap()
            .is_empty()
    );
}

#[test]
fn marker_queries_are_rejected() {
    let context = load(vec![bundle("names", &names_bundle())]).unwrap();
    let err = context
        .registry()
        .get_implementations::<dyn hearth_plugins::Extension>()
        .unwrap_err();
    assert!(matches!(err, PluginError::NotACapability(_)));
}

#[test]
fn resolving_a_unit_twice_returns_the_same_unit() {
    let context = load(vec![bundle("simple", &simple_bundle())]).unwrap();
    let first = context.resolve_unit(SIMPLE_UNIT).unwrap();
    let second = context.resolve_unit(SIMPLE_UNIT).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(
        first.plugin(),
        context.capability_instances()[0].plugin()
    ));
}

#[test]
fn instances_of_one_bundle_share_their_plugin() {
    let context = load(vec![bundle("names", &names_bundle())]).unwrap();
    let instances = context.capability_instances();
    assert_eq!(instances.len(), 3);
    assert!(
        instances
            .iter()
            .all(|i| Arc::ptr_eq(i.plugin(), instances[0].plugin()))
    );
}

#[test]
fn concurrent_first_lookups_share_one_cache_entry() {
    const THREADS: usize = 16;

    let context = load(vec![bundle("names", &names_bundle())]).unwrap();
    let registry = context.registry();
    let barrier = Barrier::new(THREADS);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    registry.get_implementations::<dyn Named>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in &results {
        assert_eq!(result.len(), 3);
        assert!(Arc::ptr_eq(result, &results[0]));
    }
    let again = registry.get_implementations::<dyn Named>().unwrap();
    assert!(Arc::ptr_eq(&again, &results[0]));
}

#[test]
fn resource_urls_round_trip() {
    let archive = simple_bundle().file("sample/simple/greeting.txt", "hello");
    let context = load(vec![bundle("simple", &archive)]).unwrap();

    let url = context.find_resource("sample/simple/greeting.txt").unwrap();
    assert_eq!(url.scheme(), hearth_plugins::RESOURCE_SCHEME);

    let mut text = String::new();
    std::io::Read::read_to_string(&mut context.open_resource_url(&url).unwrap(), &mut text)
        .unwrap();
    assert_eq!(text, "hello");

    assert!(context.find_resource("META-INF/MANIFEST.MF").is_none());
    assert!(matches!(
        context.resources().open("missing.txt"),
        Err(PluginError::ResourceNotFound(_))
    ));
}
