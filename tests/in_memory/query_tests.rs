//! Summary, listing and operator update tests for [`CoverageQueryService`].

use crate::in_memory::helpers::{CoverageHarness, harness};
use fleetwatch::coverage::{
    domain::{
        ContainerState, CoverageDomainError, CoverageStatus, EndpointId, EndpointStatus,
        EndpointType,
    },
    services::CoverageQueryError,
};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn summary_reports_counts_and_percent(harness: CoverageHarness) {
    for id in 1..=3 {
        let endpoint_id = harness.add_docker_endpoint(id);
        harness.add_agent(endpoint_id, "agent", ContainerState::Running);
    }
    let stopped = harness.add_docker_endpoint(4);
    harness.add_agent(stopped, "agent", ContainerState::Exited);
    harness.add_endpoint(5, EndpointType::Docker, EndpointStatus::Unknown);
    harness.reconciler.sync().await.expect("sync should succeed");

    let summary = harness.query.summarize().await.expect("summary should succeed");

    assert_eq!(summary.total(), 5);
    assert_eq!(summary.count(CoverageStatus::Deployed), 3);
    assert_eq!(summary.count(CoverageStatus::Failed), 1);
    assert_eq!(summary.count(CoverageStatus::Unknown), 1);
    assert_eq!(summary.coverage_percent(), 60);
    assert_eq!(summary.drifted(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn empty_store_summarizes_to_zero(harness: CoverageHarness) {
    let summary = harness.query.summarize().await.expect("summary should succeed");

    assert_eq!(summary.total(), 0);
    assert_eq!(summary.coverage_percent(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn enabled_agent_on_unreachable_endpoint_is_drifted(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(1);
    harness.add_agent(endpoint_id, "agent", ContainerState::Running);
    harness.reconciler.sync().await.expect("sync should succeed");
    harness
        .orchestrator
        .set_unreachable(endpoint_id)
        .expect("failure injection should succeed");
    harness.reconciler.sync().await.expect("sync should succeed");

    let drifted = harness
        .query
        .find(endpoint_id)
        .await
        .expect("lookup should succeed")
        .expect("record should exist");
    assert_eq!(drifted.status(), CoverageStatus::Unreachable);
    assert!(drifted.drifted());
    assert_eq!(harness.query.summarize().await.expect("summary").drifted(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listing_is_ordered_by_endpoint(harness: CoverageHarness) {
    for id in [30, 10, 20] {
        harness.add_docker_endpoint(id);
    }
    harness.reconciler.sync().await.expect("sync should succeed");

    let records = harness.query.list().await.expect("listing should succeed");

    assert_eq!(
        records
            .iter()
            .map(|record| record.endpoint_id().value())
            .collect::<Vec<_>>(),
        vec![10, 20, 30]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exclusion_reason_is_kept_for_excluded(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(1);
    harness.reconciler.sync().await.expect("sync should succeed");

    let record = harness
        .query
        .set_operator_status(
            endpoint_id,
            CoverageStatus::Excluded,
            Some(String::from("  regulated workload ")),
        )
        .await
        .expect("operator update should succeed");

    assert_eq!(record.status(), CoverageStatus::Excluded);
    assert_eq!(record.exclusion_reason(), Some("regulated workload"));

    let handed_back = harness
        .query
        .set_operator_status(endpoint_id, CoverageStatus::Unknown, Some(String::from("x")))
        .await
        .expect("operator update should succeed");
    assert_eq!(handed_back.exclusion_reason(), None);
}

#[rstest]
#[case(CoverageStatus::Deployed)]
#[case(CoverageStatus::Failed)]
#[case(CoverageStatus::NotDeployed)]
#[tokio::test(flavor = "multi_thread")]
async fn system_statuses_cannot_be_set_by_operator(
    harness: CoverageHarness,
    #[case] status: CoverageStatus,
) {
    let endpoint_id = harness.add_docker_endpoint(1);
    harness.reconciler.sync().await.expect("sync should succeed");

    let result = harness
        .query
        .set_operator_status(endpoint_id, status, None)
        .await;

    assert!(matches!(
        result,
        Err(CoverageQueryError::Domain(
            CoverageDomainError::StatusNotOperatorSettable(_)
        ))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn operator_update_of_missing_record_is_not_found(harness: CoverageHarness) {
    let result = harness
        .query
        .set_operator_status(EndpointId::new(77), CoverageStatus::Planned, None)
        .await;

    assert!(matches!(result, Err(CoverageQueryError::NotFound(id)) if id == EndpointId::new(77)));
}
