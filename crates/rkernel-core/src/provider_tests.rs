use super::*;
use std::collections::HashMap;

use rkernel_protocols::{LifecycleInfo, LifecycleState};

use crate::env::KERNEL_ID;
use crate::testing::{FakeFactory, FakeProbe};

const LEGACY_CLASS: &str = "enterprise_gateway.services.processproxies.yarn.YarnClusterProcessProxy";

fn kernel(name: &str, class_name: &str) -> KernelSpec {
    KernelSpec::new(
        name,
        format!("{} kernel", name),
        vec!["run.sh".to_string(), "{kernel_id}".to_string()],
        LifecycleInfo::new(class_name),
    )
}

fn registry_with(factory: Arc<FakeFactory>) -> Arc<LifecycleRegistry> {
    let registry = LifecycleRegistry::new();
    registry.register(factory).unwrap();
    Arc::new(registry)
}

fn provider(factory: Arc<FakeFactory>) -> KernelProvider {
    let provider_config = ProviderConfig {
        env_whitelist: vec!["SPARK_OPTS".to_string()],
        lifecycle_aliases: HashMap::from([(LEGACY_CLASS.to_string(), "fake".to_string())]),
    };
    KernelProvider::new(
        vec![
            kernel("spark_scala", "fake"),
            kernel("legacy_python", LEGACY_CLASS),
            kernel("dask_python", "dask"),
        ],
        registry_with(factory),
        KernelManagerConfig::default(),
        provider_config,
    )
    .unwrap()
}

#[test]
fn test_list_kernel_types_ordered() {
    let provider = provider(Arc::new(FakeFactory::new("fake")));
    let names: Vec<String> = provider
        .list_kernel_types()
        .iter()
        .map(|s| s.name.clone())
        .collect();
    assert_eq!(names, vec!["dask_python", "legacy_python", "spark_scala"]);
    assert!(provider.kernel_spec("spark_scala").is_some());
    assert!(provider.kernel_spec("r_kernel").is_none());
}

#[test]
fn test_duplicate_kernel_type() {
    let result = KernelProvider::new(
        vec![kernel("spark_scala", "fake"), kernel("spark_scala", "fake")],
        Arc::new(LifecycleRegistry::new()),
        KernelManagerConfig::default(),
        ProviderConfig::default(),
    );
    assert!(matches!(result, Err(KernelError::DuplicateKernelType(ref n)) if n == "spark_scala"));
}

#[test]
fn test_invalid_manager_config() {
    let config = KernelManagerConfig {
        launch_timeout_secs: 0,
        ..Default::default()
    };
    let result = KernelProvider::new(
        vec![],
        Arc::new(LifecycleRegistry::new()),
        config,
        ProviderConfig::default(),
    );
    assert!(matches!(result, Err(KernelError::Config(_))));
}

#[test]
fn test_create_kernel_manager() {
    let factory = Arc::new(FakeFactory::new("fake"));
    let provider = provider(factory.clone());

    let manager = provider
        .create_kernel_manager("spark_scala", KernelOverrides::new())
        .unwrap();
    assert_eq!(manager.state(), LifecycleState::NotStarted);
    assert_eq!(manager.spec().name, "spark_scala");
    assert_eq!(manager.lifecycle_name(), "fake");
    assert_eq!(factory.created(), 1);
}

#[test]
fn test_fresh_lifecycle_per_manager() {
    let factory = Arc::new(FakeFactory::new("fake"));
    let provider = provider(factory.clone());

    let first = provider
        .create_kernel_manager("spark_scala", KernelOverrides::new())
        .unwrap();
    let second = provider
        .create_kernel_manager("spark_scala", KernelOverrides::new())
        .unwrap();
    assert_ne!(first.kernel_id(), second.kernel_id());
    assert_eq!(factory.created(), 2);
}

#[test]
fn test_unknown_kernel_type_allocates_nothing() {
    let factory = Arc::new(FakeFactory::new("fake"));
    let provider = provider(factory.clone());

    let err = provider
        .create_kernel_manager("r_kernel", KernelOverrides::new())
        .unwrap_err();
    assert!(matches!(err, KernelError::UnknownKernelType(ref n) if n == "r_kernel"));
    assert_eq!(factory.created(), 0);
}

#[test]
fn test_unregistered_lifecycle_manager() {
    let provider = provider(Arc::new(FakeFactory::new("fake")));

    let err = provider
        .create_kernel_manager("dask_python", KernelOverrides::new())
        .unwrap_err();
    assert!(matches!(err, KernelError::UnknownLifecycleManager(ref n) if n == "dask"));
}

#[test]
fn test_legacy_class_alias() {
    let factory = Arc::new(FakeFactory::new("fake"));
    let provider = provider(factory.clone());
    assert_eq!(provider.resolve_class_name(LEGACY_CLASS), "fake");
    assert_eq!(provider.resolve_class_name("fake"), "fake");

    let manager = provider
        .create_kernel_manager("legacy_python", KernelOverrides::new())
        .unwrap();
    assert_eq!(manager.lifecycle_name(), "fake");
    assert_eq!(factory.created(), 1);
}

#[test]
fn test_factory_rejects_config() {
    let factory = Arc::new(FakeFactory::new("fake"));
    let mut spec = kernel("bad", "fake");
    spec.lifecycle = LifecycleInfo::new("fake").with_config(serde_json::json!({"invalid": true}));
    let provider = KernelProvider::new(
        vec![spec],
        registry_with(factory),
        KernelManagerConfig::default(),
        ProviderConfig::default(),
    )
    .unwrap();

    let err = provider
        .create_kernel_manager("bad", KernelOverrides::new())
        .unwrap_err();
    assert!(matches!(err, KernelError::Lifecycle(_)));
}

#[test]
fn test_overrides_applied() {
    let provider = provider(Arc::new(FakeFactory::new("fake")));
    let overrides = KernelOverrides::new()
        .with_env(KERNEL_ID, "4f0e9d6c-kernel")
        .with_env("SPARK_OPTS", "--conf spark.executor.cores=2")
        .with_env("HOME", "/root")
        .with_launch_timeout_secs(120);

    let manager = provider
        .create_kernel_manager("spark_scala", overrides)
        .unwrap();
    assert_eq!(manager.kernel_id(), "4f0e9d6c-kernel");
    assert_eq!(manager.config().launch_timeout_secs, 120);

    let launch = manager.prepared_launch();
    assert_eq!(launch.argv, vec!["run.sh", "4f0e9d6c-kernel"]);
    assert!(launch.env.contains_key("SPARK_OPTS"));
    assert!(!launch.env.contains_key("HOME"));
}

#[test]
fn test_zero_launch_timeout_override() {
    let provider = provider(Arc::new(FakeFactory::new("fake")));
    let err = provider
        .create_kernel_manager(
            "spark_scala",
            KernelOverrides::new().with_launch_timeout_secs(0),
        )
        .unwrap_err();
    assert!(matches!(err, KernelError::Config(_)));
}

#[test]
fn test_from_config_inline_kernels() {
    let config = Config {
        kernels: vec![kernel("spark_scala", "fake")],
        ..Default::default()
    };
    let provider = KernelProvider::from_config(
        &config,
        registry_with(Arc::new(FakeFactory::new("fake"))),
    )
    .unwrap();
    assert_eq!(provider.list_kernel_types().len(), 1);
    assert_eq!(provider.registry().list_names(), vec!["fake"]);
}

#[tokio::test(start_paused = true)]
async fn test_created_manager_runs() {
    let probe = FakeProbe::new();
    let factory = Arc::new(FakeFactory::with_probe("fake", probe.clone()));
    let provider = provider(factory);

    let manager = provider
        .create_kernel_manager("spark_scala", KernelOverrides::new())
        .unwrap();
    let info = manager.start().await.unwrap();
    assert_eq!(info.kernel_name, "spark_scala");

    manager.shutdown(false).await.unwrap();
    assert_eq!(probe.live_count(), 0);
}
