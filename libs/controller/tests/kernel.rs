//! Operation execution, compensating replay, and runtime wiring end to end.

use std::sync::Arc;
use std::time::Duration;

use mast_controller::{
    op_names, AddResourceHandler, HandlerTable, IntRange, JsonConfigStore, Operation,
    OperationError, OperationExecutor, ParamSpec, RemoveResourceHandler, RollbackCoordinator,
    RollbackError, StringLength,
};
use mast_model::{ModelValue, PathAddress};
use mast_services::{
    ContainerConfig, InjectionSource, ServiceContainer, ServiceDescriptor, ServiceName,
    ServiceState, StartMode,
};
use mast_testing::{init_tracing, CapturingService, EventLog, RecordingService};
use tokio::time::{sleep, timeout};

const TICK: Duration = Duration::from_millis(200);

fn addr(s: &str) -> PathAddress {
    s.parse().unwrap()
}

fn model_executor() -> OperationExecutor {
    init_tracing();
    OperationExecutor::new(
        HandlerTable::builtin(),
        ServiceContainer::new(ContainerConfig::default()),
    )
    .without_runtime()
}

// =============================================================================
// Compensating operations
// =============================================================================

#[test]
fn add_then_compensating_remove_restores_vacancy() {
    let executor = model_executor();
    let address = addr("/subsystem=ee");

    let result = executor
        .execute(Operation::new(address.clone(), op_names::ADD).with_param("spec-version", 8i64))
        .unwrap();
    assert!(executor.with_tree(|t| t.contains(&address)));
    assert_eq!(result.compensating.name, op_names::REMOVE);
    assert_eq!(result.compensating.address, address);

    executor.execute(result.compensating).unwrap();
    assert!(executor.with_tree(|t| !t.contains(&address)));
}

#[test]
fn remove_compensating_add_restores_attributes() {
    let executor = model_executor();
    let address = addr("/subsystem=http-management");

    executor
        .execute(
            Operation::new(address.clone(), op_names::ADD)
                .with_param("interface", "public")
                .with_param("port", 9990i64),
        )
        .unwrap();

    let removed = executor
        .execute(Operation::new(address.clone(), op_names::REMOVE))
        .unwrap();
    assert!(executor.with_tree(|t| !t.contains(&address)));

    // Replaying the inverse reconstructs the resource attribute for attribute.
    executor.execute(removed.compensating).unwrap();
    let read = executor
        .execute(Operation::new(address.clone(), op_names::READ_RESOURCE))
        .unwrap();
    let attrs = read.value.unwrap();
    let map = attrs.as_map().unwrap();
    assert_eq!(map.get("interface"), Some(&ModelValue::from("public")));
    assert_eq!(map.get("port"), Some(&ModelValue::Int(9990)));
}

#[test]
fn write_attribute_compensating_restores_previous_value() {
    let executor = model_executor();
    let address = addr("/subsystem=http-management");

    executor
        .execute(Operation::new(address.clone(), op_names::ADD).with_param("port", 9990i64))
        .unwrap();

    let written = executor
        .execute(
            Operation::new(address.clone(), op_names::WRITE_ATTRIBUTE)
                .with_param("name", "port")
                .with_param("value", 8443i64),
        )
        .unwrap();
    assert_eq!(written.compensating.name, op_names::WRITE_ATTRIBUTE);
    assert_eq!(
        written.compensating.param("value"),
        Some(&ModelValue::Int(9990))
    );

    executor.execute(written.compensating).unwrap();
    let port = executor.with_tree(|t| t.get(&address).unwrap().get("port").cloned());
    assert_eq!(port, Some(ModelValue::Int(9990)));
}

#[test]
fn writing_unset_attribute_compensates_with_undefine() {
    let executor = model_executor();
    let address = addr("/subsystem=ee");

    executor
        .execute(Operation::new(address.clone(), op_names::ADD))
        .unwrap();

    let written = executor
        .execute(
            Operation::new(address.clone(), op_names::WRITE_ATTRIBUTE)
                .with_param("name", "isolation")
                .with_param("value", "strict"),
        )
        .unwrap();
    assert_eq!(written.compensating.name, op_names::UNDEFINE_ATTRIBUTE);

    executor.execute(written.compensating).unwrap();
    let unset = executor.with_tree(|t| t.get(&address).unwrap().get("isolation").is_none());
    assert!(unset);
}

#[test]
fn undefine_attribute_compensating_rewrites_value() {
    let executor = model_executor();
    let address = addr("/subsystem=ee");

    executor
        .execute(Operation::new(address.clone(), op_names::ADD).with_param("isolation", "strict"))
        .unwrap();

    let undefined = executor
        .execute(
            Operation::new(address.clone(), op_names::UNDEFINE_ATTRIBUTE)
                .with_param("name", "isolation"),
        )
        .unwrap();
    assert_eq!(undefined.compensating.name, op_names::WRITE_ATTRIBUTE);
    assert_eq!(
        undefined.compensating.param("value"),
        Some(&ModelValue::from("strict"))
    );

    executor.execute(undefined.compensating).unwrap();
    let value = executor.with_tree(|t| t.get(&address).unwrap().get("isolation").cloned());
    assert_eq!(value, Some(ModelValue::from("strict")));
}

// =============================================================================
// Fail-fast validation and addressing
// =============================================================================

#[test]
fn validation_failure_leaves_model_untouched() {
    init_tracing();
    let mut table = HandlerTable::builtin();
    table.register(
        op_names::ADD,
        AddResourceHandler::new(vec![
            ParamSpec::required("interface", StringLength::non_empty()),
            ParamSpec::required("port", IntRange::port()),
        ]),
    );
    let executor = OperationExecutor::new(
        table,
        ServiceContainer::new(ContainerConfig::default()),
    )
    .without_runtime();
    let address = addr("/subsystem=http-management");

    // Missing required parameter.
    let err = executor
        .execute(Operation::new(address.clone(), op_names::ADD).with_param("interface", "public"))
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation { ref param, .. } if param == "port"));
    assert!(executor.with_tree(|t| !t.contains(&address)));

    // Out-of-range parameter.
    let err = executor
        .execute(
            Operation::new(address.clone(), op_names::ADD)
                .with_param("interface", "public")
                .with_param("port", 99999i64),
        )
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation { ref param, .. } if param == "port"));
    assert!(executor.with_tree(|t| !t.contains(&address)));

    // Wrongly-typed parameter.
    let err = executor
        .execute(
            Operation::new(address.clone(), op_names::ADD)
                .with_param("interface", 7i64)
                .with_param("port", 9990i64),
        )
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation { ref param, .. } if param == "interface"));
    assert!(executor.with_tree(|t| !t.contains(&address)));
}

#[test]
fn address_policies_are_enforced() {
    let executor = model_executor();
    let address = addr("/subsystem=ee");

    executor
        .execute(Operation::new(address.clone(), op_names::ADD))
        .unwrap();
    let err = executor
        .execute(Operation::new(address.clone(), op_names::ADD))
        .unwrap_err();
    assert_eq!(err, OperationError::ResourceExists(address.clone()));

    let absent = addr("/subsystem=absent");
    let err = executor
        .execute(Operation::new(absent.clone(), op_names::REMOVE))
        .unwrap_err();
    assert_eq!(err, OperationError::UnknownAddress(absent));

    let err = executor
        .execute(Operation::new(address, "compose"))
        .unwrap_err();
    assert_eq!(err, OperationError::UnknownOperation("compose".to_string()));
}

#[test]
fn describe_lists_add_operations_for_subtree() {
    let executor = model_executor();

    executor
        .execute(Operation::new(addr("/subsystem=ee"), op_names::ADD))
        .unwrap();
    executor
        .execute(
            Operation::new(addr("/subsystem=ee/service=default-bindings"), op_names::ADD)
                .with_param("context", "java:comp"),
        )
        .unwrap();
    executor
        .execute(Operation::new(addr("/subsystem=other"), op_names::ADD))
        .unwrap();

    let described = executor
        .execute(Operation::new(addr("/subsystem=ee"), op_names::DESCRIBE))
        .unwrap();
    let entries = described.value.unwrap();
    let list = entries.as_list().unwrap();
    // The subtree root plus its child; the sibling subsystem is not included.
    assert_eq!(list.len(), 2);
    let first = list[0].as_map().unwrap();
    assert_eq!(first.get("address"), Some(&ModelValue::from("/subsystem=ee")));
    assert_eq!(first.get("operation"), Some(&ModelValue::from("add")));
}

// =============================================================================
// Rollback
// =============================================================================

#[test]
fn rollback_unwinds_in_reverse_order() {
    let executor = model_executor();
    let addresses = ["/subsystem=a", "/subsystem=b", "/subsystem=c"].map(addr);

    let mut applied = Vec::new();
    for address in &addresses {
        let op = Operation::new(address.clone(), op_names::ADD);
        let result = executor.execute(op.clone()).unwrap();
        applied.push((op, result.compensating));
    }

    RollbackCoordinator::rollback(&executor, applied).unwrap();
    for address in &addresses {
        assert!(executor.with_tree(|t| !t.contains(address)));
    }
}

#[test]
fn rollback_reports_incomplete_but_keeps_unwinding() {
    let executor = model_executor();
    let addresses = ["/subsystem=a", "/subsystem=b", "/subsystem=c"].map(addr);

    let mut applied = Vec::new();
    for address in &addresses {
        let op = Operation::new(address.clone(), op_names::ADD);
        let result = executor.execute(op.clone()).unwrap();
        applied.push((op, result.compensating));
    }

    // Pull b out from under its compensating remove.
    executor
        .execute(Operation::new(addresses[1].clone(), op_names::REMOVE))
        .unwrap();

    let err = RollbackCoordinator::rollback(&executor, applied).unwrap_err();
    let RollbackError::Incomplete {
        attempted,
        failures,
    } = err;
    assert_eq!(attempted, 3);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.address, addresses[1]);
    assert_eq!(
        failures[0].1,
        OperationError::UnknownAddress(addresses[1].clone())
    );

    // a and c were still unwound.
    assert!(executor.with_tree(|t| t.is_empty()));
}

// =============================================================================
// Boot from stored configuration
// =============================================================================

fn temp_config(tag: &str, operations: &[Operation]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "mast-kernel-{tag}-{}-{:?}.json",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::write(&path, serde_json::to_string(operations).unwrap()).unwrap();
    path
}

#[test]
fn boot_applies_stored_operations_in_order() {
    let executor = model_executor();
    let ops = vec![
        Operation::new(addr("/subsystem=ee"), op_names::ADD),
        Operation::new(addr("/subsystem=http-management"), op_names::ADD)
            .with_param("interface", "public")
            .with_param("port", 9990i64),
    ];
    let path = temp_config("ok", &ops);

    let applied = executor.boot(&JsonConfigStore::new(&path)).unwrap();
    assert_eq!(applied.len(), 2);
    assert!(executor.with_tree(|t| t.contains(&addr("/subsystem=ee"))));
    assert!(executor.with_tree(|t| t.contains(&addr("/subsystem=http-management"))));

    std::fs::remove_file(&path).ok();
}

#[test]
fn failed_boot_rolls_back_applied_operations() {
    let executor = model_executor();
    let ops = vec![
        Operation::new(addr("/subsystem=ee"), op_names::ADD),
        Operation::new(addr("/subsystem=http-management"), op_names::ADD),
        // Duplicate address: fails, triggering rollback of the first two.
        Operation::new(addr("/subsystem=ee"), op_names::ADD),
    ];
    let path = temp_config("fail", &ops);

    let err = executor.boot(&JsonConfigStore::new(&path)).unwrap_err();
    assert_eq!(err, OperationError::ResourceExists(addr("/subsystem=ee")));
    assert!(executor.with_tree(|t| t.is_empty()));

    std::fs::remove_file(&path).ok();
}

// =============================================================================
// Runtime wiring
// =============================================================================

fn http_management_table(capture: Arc<CapturingService>) -> HandlerTable {
    let mut table = HandlerTable::builtin();
    table.register(
        op_names::ADD,
        AddResourceHandler::new(vec![
            ParamSpec::required("interface", StringLength::non_empty()),
            ParamSpec::required("port", IntRange::port()),
        ])
        .with_runtime_task(move |_op, resource| {
            let interface = resource
                .get("interface")
                .and_then(ModelValue::as_str)
                .unwrap_or_default()
                .to_string();
            let port = resource.get("port").and_then(ModelValue::as_int).unwrap_or(0);
            let service = capture.clone();
            Box::new(move |ctx| {
                let binding = ServiceName::new("network-interface").append(interface);
                let descriptor = ServiceDescriptor::new(
                    ServiceName::new("management").append("http"),
                    service,
                    StartMode::Active,
                )
                .with_dependency(binding.clone(), true)
                .with_injection("port", InjectionSource::Value(port.into()))
                .with_injection("bind-address", InjectionSource::Dependency(binding));
                ctx.add_service(descriptor)?;
                Ok(())
            })
        }),
    );
    table.register(
        op_names::REMOVE,
        RemoveResourceHandler::new().with_runtime_task(|_op, _resource| {
            Box::new(|ctx| ctx.remove_service(&ServiceName::new("management.http"), false))
        }),
    );
    table
}

#[tokio::test]
async fn add_operation_installs_service_pending_on_its_dependency() {
    init_tracing();
    let capture = Arc::new(CapturingService::new());
    let captured = capture.captured();
    let executor = OperationExecutor::new(
        http_management_table(capture),
        ServiceContainer::new(ContainerConfig::default()),
    );
    let address = addr("/subsystem=http-management");

    let mut result = executor
        .execute(
            Operation::new(address.clone(), op_names::ADD)
                .with_param("interface", "public")
                .with_param("port", 9990i64),
        )
        .unwrap();
    assert!(result.runtime_failure.is_none());
    assert_eq!(result.handles.len(), 1);
    assert!(executor.with_tree(|t| t.contains(&address)));

    // The service is registered but its required binding is absent.
    let mut http = result.handles.pop().unwrap();
    assert!(timeout(TICK, http.await_up()).await.is_err());
    assert_eq!(http.state(), ServiceState::Down);

    // Supplying the binding lets the management service come up with its
    // injected values.
    let log = EventLog::new();
    executor
        .container()
        .install(ServiceDescriptor::new(
            "network-interface.public",
            Arc::new(RecordingService::new("iface", log).providing("10.0.0.1")),
            StartMode::Active,
        ))
        .unwrap();
    timeout(TICK, http.await_up()).await.unwrap().unwrap();

    let snapshot = captured.lock().unwrap().clone().unwrap();
    assert_eq!(snapshot.get_int("port"), Some(9990));
    assert_eq!(snapshot.get_str("bind-address"), Some("10.0.0.1"));
}

#[tokio::test]
async fn remove_operation_tears_down_the_installed_service() {
    init_tracing();
    let capture = Arc::new(CapturingService::new());
    let executor = OperationExecutor::new(
        http_management_table(capture),
        ServiceContainer::new(ContainerConfig::default()),
    );
    let address = addr("/subsystem=http-management");

    let mut result = executor
        .execute(
            Operation::new(address.clone(), op_names::ADD)
                .with_param("interface", "public")
                .with_param("port", 9990i64),
        )
        .unwrap();
    let log = EventLog::new();
    executor
        .container()
        .install(ServiceDescriptor::new(
            "network-interface.public",
            Arc::new(RecordingService::new("iface", log).providing("10.0.0.1")),
            StartMode::Active,
        ))
        .unwrap();
    let mut http = result.handles.pop().unwrap();
    timeout(TICK, http.await_up()).await.unwrap().unwrap();

    let removed = executor
        .execute(Operation::new(address.clone(), op_names::REMOVE))
        .unwrap();
    assert!(removed.runtime_failure.is_none());
    assert!(executor.with_tree(|t| !t.contains(&address)));

    // Removal runs asynchronously; wait for the registration to disappear.
    let name = ServiceName::new("management.http");
    for _ in 0..100 {
        if executor.container().state(&name).is_err() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("management.http was not removed");
}

#[tokio::test]
async fn refused_service_removal_surfaces_as_runtime_failure() {
    init_tracing();
    let mut table = HandlerTable::builtin();
    table.register(
        op_names::REMOVE,
        RemoveResourceHandler::new().with_runtime_task(|_op, _resource| {
            Box::new(|ctx| ctx.remove_service(&ServiceName::new("base"), false))
        }),
    );
    let executor = OperationExecutor::new(
        table,
        ServiceContainer::new(ContainerConfig::default()),
    );
    let address = addr("/subsystem=base");

    executor
        .execute(Operation::new(address.clone(), op_names::ADD))
        .unwrap();
    let log = EventLog::new();
    executor
        .container()
        .install(ServiceDescriptor::new(
            "base",
            Arc::new(RecordingService::new("base", log.clone())),
            StartMode::Active,
        ))
        .unwrap();
    let mut dep = executor
        .container()
        .install(
            ServiceDescriptor::new(
                "dep",
                Arc::new(RecordingService::new("dep", log)),
                StartMode::Active,
            )
            .with_dependency("base", true),
        )
        .unwrap();
    timeout(TICK, dep.await_up()).await.unwrap().unwrap();

    // The live dependent blocks the non-cascade removal; the model mutation
    // stands, but the refusal must be visible on the result, not swallowed.
    let result = executor
        .execute(Operation::new(address.clone(), op_names::REMOVE))
        .unwrap();
    assert!(matches!(
        result.runtime_failure,
        Some(mast_services::ServiceError::InUse { .. })
    ));
    assert!(executor.with_tree(|t| !t.contains(&address)));
    assert_eq!(
        executor.container().state(&ServiceName::new("base")).unwrap(),
        ServiceState::Up
    );
    assert_eq!(
        executor.container().state(&ServiceName::new("dep")).unwrap(),
        ServiceState::Up
    );
}

#[tokio::test]
async fn duplicate_install_surfaces_as_runtime_failure() {
    init_tracing();
    let capture = Arc::new(CapturingService::new());
    let executor = OperationExecutor::new(
        http_management_table(capture),
        ServiceContainer::new(ContainerConfig::default()),
    );

    executor
        .execute(
            Operation::new(addr("/subsystem=http-management"), op_names::ADD)
                .with_param("interface", "public")
                .with_param("port", 9990i64),
        )
        .unwrap();
    executor
        .container()
        .install(ServiceDescriptor::new(
            "network-interface.public",
            Arc::new(RecordingService::new("iface", EventLog::new()).providing("10.0.0.1")),
            StartMode::Active,
        ))
        .unwrap();
    let mut http = executor
        .container()
        .handle(&ServiceName::new("management.http"))
        .unwrap();
    timeout(TICK, http.await_up()).await.unwrap().unwrap();

    // A second add at a sibling address tries to register the same service
    // name; the model mutation commits, the runtime task reports the clash.
    let result = executor
        .execute(
            Operation::new(addr("/subsystem=http-management-secure"), op_names::ADD)
                .with_param("interface", "public")
                .with_param("port", 9991i64),
        )
        .unwrap();
    assert!(matches!(
        result.runtime_failure,
        Some(mast_services::ServiceError::DuplicateServiceName { .. })
    ));
}
