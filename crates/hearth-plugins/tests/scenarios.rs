//! End-to-end loading scenarios: bundles on disk through to capability calls.

use std::path::Path;

use hearth_config::Config;
use hearth_plugins::{BundleScanner, PluginError, PluginHost, PluginLoader, PluginsLoadedListener};
use hearth_telemetry::{LogConfig, setup_logging};
use hearth_test::{
    DevProjectBuilder, TWIN_A_RESOURCE, TWIN_API_UNIT, TWIN_B_RESOURCE, TWIN_CTOR, TWIN_UNIT,
    UnitSpec, sample_catalog, sample_constructors, simple_bundle, twin_a_bundle, twin_b_bundle,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn simple_listener_counts_two_invocations() {
    let tmp = tempfile::tempdir().unwrap();
    simple_bundle().write_to(tmp.path(), "simple");

    let bundles = BundleScanner::new(tmp.path())
        .scan_default_locations()
        .await
        .unwrap();
    let context = PluginLoader::new(sample_constructors()).load(bundles).unwrap();
    let registry = context.registry();

    for _ in 0..2 {
        let listeners = registry
            .get_implementations::<dyn PluginsLoadedListener>()
            .unwrap();
        assert_eq!(listeners.len(), 1);
        let listener = &listeners[0];
        listener
            .capability
            .after_plugins_loaded(&listener.plugin, context.resources());
    }

    let plugin = &context.plugins()[0];
    assert_eq!(plugin.name(), "simple");
    assert_eq!(plugin.with_state::<u32, _>(|count| count.copied()), Some(2));
}

#[tokio::test]
async fn twin_bundles_resolve_each_others_resources() {
    let tmp = tempfile::tempdir().unwrap();
    twin_a_bundle().write_to(tmp.path(), "twin-a");
    twin_b_bundle().write_to(tmp.path(), "twin-b");

    let bundles = BundleScanner::new(tmp.path())
        .scan_default_locations()
        .await
        .unwrap();
    let context = PluginLoader::new(sample_constructors()).load(bundles).unwrap();
    let listeners = context
        .registry()
        .get_implementations::<dyn PluginsLoadedListener>()
        .unwrap();

    assert_eq!(listeners.len(), 1);
    let listener = &listeners[0];
    assert_eq!(&*listener.unit, TWIN_UNIT);
    assert_eq!(listener.plugin.name(), "twin-b");

    listener
        .capability
        .after_plugins_loaded(&listener.plugin, context.resources());
    assert_eq!(
        listener.plugin.with_state::<String, _>(|s| s.cloned()).as_deref(),
        Some("abcdef")
    );

    let twin_a = context
        .plugins()
        .iter()
        .find(|p| p.name() == "twin-a")
        .unwrap();
    assert!(!twin_a.has_state());
}

#[tokio::test]
async fn twin_b_alone_cannot_link() {
    let tmp = tempfile::tempdir().unwrap();
    twin_b_bundle().write_to(tmp.path(), "twin-b");

    let bundles = BundleScanner::new(tmp.path())
        .scan_default_locations()
        .await
        .unwrap();
    let err = PluginLoader::new(sample_constructors())
        .load(bundles)
        .unwrap_err();
    assert!(matches!(err, PluginError::UnitNotFound(ref name) if name == TWIN_API_UNIT));
}

#[tokio::test]
async fn twin_dev_projects_behave_like_archives() {
    let tmp = tempfile::tempdir().unwrap();
    DevProjectBuilder::new(tmp.path(), "twin-a-plugin")
        .unit(TWIN_API_UNIT, &UnitSpec::interface().implements(hearth_test::LISTENER))
        .resource(TWIN_A_RESOURCE, "abc");
    DevProjectBuilder::new(tmp.path(), "twin-b-plugin")
        .unit_in(1, TWIN_UNIT, &UnitSpec::extension(TWIN_API_UNIT, TWIN_CTOR))
        .resource(TWIN_B_RESOURCE, "def");

    let bundles = BundleScanner::new(tmp.path().join("plug-ins"))
        .with_dev_root(tmp.path())
        .with_dev_projects(["twin-a-plugin", "twin-b-plugin"])
        .scan_default_locations()
        .await
        .unwrap();
    let names: Vec<_> = bundles.iter().map(|b| b.plugin.name().to_owned()).collect();
    assert_eq!(names, vec!["twin-a", "twin-b"]);

    let context = PluginLoader::new(sample_constructors()).load(bundles).unwrap();
    let listeners = context
        .registry()
        .get_implementations::<dyn PluginsLoadedListener>()
        .unwrap();
    let listener = &listeners[0];
    listener
        .capability
        .after_plugins_loaded(&listener.plugin, context.resources());
    assert_eq!(
        listener.plugin.with_state::<String, _>(|s| s.cloned()).as_deref(),
        Some("abcdef")
    );
}

fn write_workspace(root: &Path) {
    let plugins_dir = root.join("plug-ins");
    simple_bundle().write_to(&plugins_dir, "simple");
    twin_b_bundle().write_to(&plugins_dir, "twin-b");
    DevProjectBuilder::new(root, "twin-a-plugin")
        .unit(TWIN_API_UNIT, &UnitSpec::interface().implements(hearth_test::LISTENER))
        .resource(TWIN_A_RESOURCE, "abc");
}

#[tokio::test]
async fn host_loads_configured_locations() {
    let tmp = tempfile::tempdir().unwrap();
    write_workspace(tmp.path());

    let config = Config::from_toml_str(
        r#"
        [plugins]
        dev_projects = ["twin-a-plugin"]

        [logging]
        level = "debug"
        format = "compact"
        "#,
    )
    .unwrap();
    // Another test may already have installed a subscriber.
    let _ = setup_logging(&LogConfig::from_section(&config.logging).unwrap());

    let host = PluginHost::load(
        &config.plugins,
        tmp.path(),
        sample_constructors(),
        sample_catalog(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let names: Vec<_> = host.plugins().iter().map(|p| p.name().to_owned()).collect();
    assert_eq!(names, vec!["simple", "twin-b", "twin-a"]);

    assert_eq!(host.notify_plugins_loaded().unwrap(), 2);
    let simple = &host.plugins()[0];
    assert_eq!(simple.with_state::<u32, _>(|c| c.copied()), Some(1));
    let twin_b = &host.plugins()[1];
    assert_eq!(
        twin_b.with_state::<String, _>(|s| s.cloned()).as_deref(),
        Some("abcdef")
    );
    assert!(host.context().find_resource(TWIN_A_RESOURCE).is_some());
}

#[tokio::test]
async fn host_build_runs_prepare_before_scanning() {
    let tmp = tempfile::tempdir().unwrap();
    let plugins_dir = tmp.path().join("plug-ins");

    let scanner = BundleScanner::new(&plugins_dir);
    let loader = PluginLoader::new(sample_constructors());
    let host = PluginHost::build(&scanner, &loader, |dir| {
        simple_bundle().write_to(dir, "standard");
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(host.plugins().len(), 1);
    assert_eq!(host.plugins()[0].name(), "standard");
    assert_eq!(host.registry().len(), 1);
}

#[tokio::test]
async fn host_rejects_file_as_plugins_dir() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("plug-ins"), b"not a directory").unwrap();

    let config = Config::default();
    let err = PluginHost::load(
        &config.plugins,
        tmp.path(),
        sample_constructors(),
        sample_catalog(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PluginError::InvalidPluginsDir { .. }));
}
