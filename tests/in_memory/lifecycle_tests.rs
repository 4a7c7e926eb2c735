//! Agent lifecycle tests for [`AgentLifecycleService`].

use crate::in_memory::helpers::{CoverageHarness, deploy_options, harness};
use fleetwatch::coverage::{
    adapters::memory::OrchestrationOperation,
    domain::{
        AgentDeployOptions, ContainerState, CoverageStatus, DEFAULT_OPEN_PORTS, EndpointId,
        EndpointStatus, EndpointType,
    },
    ports::{CoverageRepository, OrchestrationError},
    services::{LifecycleError, LifecycleOutcome},
};
use rstest::rstest;

async fn record(
    harness: &CoverageHarness,
    endpoint_id: EndpointId,
) -> fleetwatch::coverage::domain::CoverageRecord {
    harness
        .repository
        .find_by_endpoint(endpoint_id)
        .await
        .expect("lookup should succeed")
        .expect("record should exist")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploy_creates_and_starts_managed_agent(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let endpoint_id = harness.add_docker_endpoint(1);
    harness.reconciler.sync().await.expect("sync should succeed");

    let outcome = harness
        .lifecycle
        .deploy(endpoint_id, &deploy_options)
        .await
        .expect("deploy should succeed");

    assert_eq!(outcome, LifecycleOutcome::Deployed);
    let created = harness
        .orchestrator
        .created_containers()
        .expect("created containers");
    let [container] = created.as_slice() else {
        panic!("expected exactly one created container, got {created:?}");
    };
    assert_eq!(container.name, "fleetwatch-ebpf-agent");
    assert_eq!(container.spec.image, "grafana/beyla:latest");
    assert!(container.spec.host_config.privileged);
    assert_eq!(container.spec.host_config.pid_mode, "host");
    assert_eq!(container.spec.host_config.restart_policy.name, "unless-stopped");
    assert_eq!(
        container.spec.env_value("OTEL_EXPORTER_OTLP_ENDPOINT"),
        Some("http://collector:4318")
    );
    assert_eq!(
        container.spec.env_value("OTEL_EXPORTER_OTLP_HEADERS"),
        Some("x-api-key=secret")
    );
    assert_eq!(
        container.spec.env_value("BEYLA_OPEN_PORT"),
        Some(DEFAULT_OPEN_PORTS)
    );
    assert_eq!(
        harness.orchestrator.pulled_images().expect("pulls"),
        vec![(endpoint_id, String::from("grafana/beyla:latest"))]
    );

    let stored = record(&harness, endpoint_id).await;
    assert_eq!(stored.status(), CoverageStatus::Deployed);
    assert!(stored.agent_enabled());
    assert!(stored.agent_managed());
    assert_eq!(stored.agent_container_id(), Some(&container.container_id));
    assert!(!stored.drifted());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_deploy_is_already_deployed(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let endpoint_id = harness.add_docker_endpoint(1);
    harness.reconciler.sync().await.expect("sync should succeed");
    harness
        .lifecycle
        .deploy(endpoint_id, &deploy_options)
        .await
        .expect("first deploy should succeed");

    let second = harness
        .lifecycle
        .deploy(endpoint_id, &deploy_options)
        .await
        .expect("second deploy should succeed");

    assert_eq!(second, LifecycleOutcome::AlreadyDeployed);
    assert_eq!(
        harness
            .orchestrator
            .created_containers()
            .expect("created containers")
            .len(),
        1
    );
    assert!(record(&harness, endpoint_id).await.agent_managed());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploy_starts_stopped_agent_without_creating(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let endpoint_id = harness.add_docker_endpoint(2);
    harness.add_agent(endpoint_id, "existing", ContainerState::Exited);
    harness.reconciler.sync().await.expect("sync should succeed");

    let outcome = harness
        .lifecycle
        .deploy(endpoint_id, &deploy_options)
        .await
        .expect("deploy should succeed");

    assert_eq!(outcome, LifecycleOutcome::Enabled);
    assert!(harness.orchestrator.created_containers().expect("created").is_empty());
    let stored = record(&harness, endpoint_id).await;
    assert_eq!(stored.status(), CoverageStatus::Deployed);
    assert!(!stored.agent_managed());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploy_to_unknown_endpoint_is_not_found(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let result = harness
        .lifecycle
        .deploy(EndpointId::new(404), &deploy_options)
        .await;

    assert!(matches!(
        result,
        Err(LifecycleError::EndpointNotFound(id)) if id == EndpointId::new(404)
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploy_to_incompatible_endpoint_is_rejected(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let endpoint_id = harness.add_endpoint(3, EndpointType::KubernetesLocal, EndpointStatus::Up);

    let result = harness.lifecycle.deploy(endpoint_id, &deploy_options).await;

    assert!(matches!(
        result,
        Err(LifecycleError::IncompatibleEndpoint { endpoint_type: 5, .. })
    ));
    assert!(harness.orchestrator.pulled_images().expect("pulls").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_write_overrides_operator_status_and_clears_reason(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let endpoint_id = harness.add_docker_endpoint(4);
    harness.reconciler.sync().await.expect("sync should succeed");
    harness
        .query
        .set_operator_status(
            endpoint_id,
            CoverageStatus::Excluded,
            Some(String::from("customer opt-out")),
        )
        .await
        .expect("operator update should succeed");

    harness
        .lifecycle
        .deploy(endpoint_id, &deploy_options)
        .await
        .expect("deploy should succeed");

    let stored = record(&harness, endpoint_id).await;
    assert_eq!(stored.status(), CoverageStatus::Deployed);
    assert_eq!(stored.exclusion_reason(), None);
}

#[rstest]
#[case(ContainerState::Running, LifecycleOutcome::Disabled, ContainerState::Exited)]
#[case(ContainerState::Exited, LifecycleOutcome::AlreadyDisabled, ContainerState::Exited)]
#[tokio::test(flavor = "multi_thread")]
async fn disable_marks_agent_failed(
    harness: CoverageHarness,
    #[case] initial: ContainerState,
    #[case] expected: LifecycleOutcome,
    #[case] final_state: ContainerState,
) {
    let endpoint_id = harness.add_docker_endpoint(5);
    harness.add_managed_agent(endpoint_id, "agent", initial);
    harness.reconciler.sync().await.expect("sync should succeed");

    let outcome = harness
        .lifecycle
        .disable(endpoint_id)
        .await
        .expect("disable should succeed");

    assert_eq!(outcome, expected);
    let containers = harness.orchestrator.containers(endpoint_id).expect("containers");
    assert_eq!(containers.first().map(|container| container.state), Some(final_state));
    let stored = record(&harness, endpoint_id).await;
    assert_eq!(stored.status(), CoverageStatus::Failed);
    assert!(!stored.agent_enabled());
    assert!(stored.agent_managed());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn enable_starts_stopped_agent(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(6);
    harness.add_agent(endpoint_id, "agent", ContainerState::Exited);
    harness.reconciler.sync().await.expect("sync should succeed");

    let outcome = harness
        .lifecycle
        .enable(endpoint_id)
        .await
        .expect("enable should succeed");

    assert_eq!(outcome, LifecycleOutcome::Enabled);
    let containers = harness.orchestrator.containers(endpoint_id).expect("containers");
    assert!(containers.iter().all(|container| container.is_running()));
    assert_eq!(
        record(&harness, endpoint_id).await.status(),
        CoverageStatus::Deployed
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn actions_without_agent_are_rejected(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(7);

    let enable = harness.lifecycle.enable(endpoint_id).await;
    let disable = harness.lifecycle.disable(endpoint_id).await;
    let remove = harness.lifecycle.remove(endpoint_id, false).await;

    for result in [enable, disable, remove] {
        assert!(matches!(result, Err(LifecycleError::AgentNotFound(_))));
    }
    assert_eq!(harness.status_of(endpoint_id).await, None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remove_stops_then_removes_agent(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(8);
    harness.add_managed_agent(endpoint_id, "agent", ContainerState::Running);
    harness.reconciler.sync().await.expect("sync should succeed");

    let outcome = harness
        .lifecycle
        .remove(endpoint_id, false)
        .await
        .expect("remove should succeed");

    assert_eq!(outcome, LifecycleOutcome::Removed);
    assert!(harness.orchestrator.containers(endpoint_id).expect("containers").is_empty());
    let stored = record(&harness, endpoint_id).await;
    assert_eq!(stored.status(), CoverageStatus::NotDeployed);
    assert_eq!(stored.agent_container_id(), None);
    assert!(!stored.agent_managed());
    assert!(!stored.agent_enabled());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_failure_aborts_unforced_remove(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(9);
    harness.add_agent(endpoint_id, "agent", ContainerState::Running);
    harness
        .orchestrator
        .fail_operation(endpoint_id, OrchestrationOperation::StopContainer, "stop hung")
        .expect("failure injection should succeed");

    let result = harness.lifecycle.remove(endpoint_id, false).await;

    assert!(matches!(
        result,
        Err(LifecycleError::Orchestration(OrchestrationError::Api { status: 500, .. }))
    ));
    assert_eq!(harness.orchestrator.containers(endpoint_id).expect("containers").len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn forced_remove_tolerates_stop_failure(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(10);
    harness.add_agent(endpoint_id, "agent", ContainerState::Running);
    harness.reconciler.sync().await.expect("sync should succeed");
    harness
        .orchestrator
        .fail_operation(endpoint_id, OrchestrationOperation::StopContainer, "stop hung")
        .expect("failure injection should succeed");

    let outcome = harness
        .lifecycle
        .remove(endpoint_id, true)
        .await
        .expect("forced remove should succeed");

    assert_eq!(outcome, LifecycleOutcome::Removed);
    assert!(harness.orchestrator.containers(endpoint_id).expect("containers").is_empty());
    assert_eq!(
        harness.status_of(endpoint_id).await,
        Some(CoverageStatus::NotDeployed)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploy_bulk_isolates_single_failure(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let ids: Vec<EndpointId> = (1..=4).map(|id| harness.add_docker_endpoint(id)).collect();
    let failing = EndpointId::new(3);
    harness
        .orchestrator
        .fail_operation(failing, OrchestrationOperation::PullImage, "registry timeout")
        .expect("failure injection should succeed");

    let results = harness.lifecycle.deploy_bulk(&ids, &deploy_options).await;

    assert_eq!(results.len(), 4);
    let failures: Vec<_> = results.iter().filter(|result| !result.success).collect();
    let [failure] = failures.as_slice() else {
        panic!("expected exactly one failure, got {failures:?}");
    };
    assert_eq!(failure.endpoint_id, failing);
    assert!(failure.message.contains("registry timeout"));
    assert!(
        results
            .iter()
            .filter(|result| result.success)
            .all(|result| result.message == "deployed")
    );
    assert_eq!(
        results.iter().map(|result| result.endpoint_id).collect::<Vec<_>>(),
        ids
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remove_bulk_isolates_missing_agent(harness: CoverageHarness) {
    let ids: Vec<EndpointId> = (1..=3).map(|id| harness.add_docker_endpoint(id)).collect();
    for endpoint_id in ids.iter().take(2) {
        harness.add_managed_agent(*endpoint_id, "agent", ContainerState::Running);
    }

    let results = harness.lifecycle.remove_bulk(&ids, false).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|result| result.success).count(), 2);
    let failure = results
        .iter()
        .find(|result| !result.success)
        .expect("one failure expected");
    assert_eq!(failure.endpoint_id, EndpointId::new(3));
    assert_eq!(failure.message, "no agent container found on endpoint 3");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn enable_and_disable_bulk_report_per_endpoint(harness: CoverageHarness) {
    let with_agent = harness.add_docker_endpoint(1);
    let unknown = EndpointId::new(99);
    harness.add_agent(with_agent, "agent", ContainerState::Running);

    let disabled = harness
        .lifecycle
        .disable_bulk(&[with_agent, unknown])
        .await;
    let enabled = harness.lifecycle.enable_bulk(&[with_agent, unknown]).await;

    assert_eq!(
        disabled.iter().map(|result| result.success).collect::<Vec<_>>(),
        vec![true, false]
    );
    assert_eq!(disabled.first().map(|result| result.message.as_str()), Some("disabled"));
    assert_eq!(enabled.first().map(|result| result.message.as_str()), Some("enabled"));
    assert_eq!(
        enabled.get(1).map(|result| result.message.as_str()),
        Some("endpoint 99 not found")
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploy_before_sync_leaves_record_creation_to_sync(
    harness: CoverageHarness,
    deploy_options: AgentDeployOptions,
) {
    let endpoint_id = harness.add_docker_endpoint(11);

    let outcome = harness
        .lifecycle
        .deploy(endpoint_id, &deploy_options)
        .await
        .expect("deploy should succeed");

    assert_eq!(outcome, LifecycleOutcome::Deployed);
    assert_eq!(harness.status_of(endpoint_id).await, None);

    let sync = harness.reconciler.sync().await.expect("sync should succeed");

    assert_eq!(sync.added, 1);
    assert_eq!(sync.updated, 0);
    let stored = record(&harness, endpoint_id).await;
    assert_eq!(stored.status(), CoverageStatus::Deployed);
    assert!(stored.agent_enabled());
}
