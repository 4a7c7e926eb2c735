//! `PostgreSQL` tests for [`PostgresTelemetryStore`] span lookups.

use crate::postgres::helpers::{
    BoxError, CREATE_SPANS_SQL, CoverageDb, TRACE_SOURCE, at, coverage_db,
};
use fleetwatch::coverage::{
    domain::EndpointId,
    ports::{SpanQuery, TelemetryStore},
};
use rstest::rstest;

fn query(endpoint_id: i64) -> SpanQuery {
    SpanQuery {
        endpoint_id: EndpointId::new(endpoint_id),
        source: TRACE_SOURCE.to_owned(),
        since: at(8, 30),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn postgres_missing_span_table_reads_as_no_traces(
    #[future] coverage_db: Result<Option<CoverageDb>, BoxError>,
) -> Result<(), BoxError> {
    let Some(db) = coverage_db.await? else {
        return Ok(());
    };

    let latest = db.telemetry.most_recent_span(&query(1)).await?;

    assert_eq!(latest, None);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn postgres_newest_matching_span_wins(
    #[future] coverage_db: Result<Option<CoverageDb>, BoxError>,
) -> Result<(), BoxError> {
    let Some(db) = coverage_db.await? else {
        return Ok(());
    };
    db.execute(CREATE_SPANS_SQL).await?;
    let endpoint = EndpointId::new(1);
    db.insert_span(endpoint, TRACE_SOURCE, at(8, 0)).await?;
    db.insert_span(endpoint, TRACE_SOURCE, at(9, 0)).await?;
    db.insert_span(endpoint, TRACE_SOURCE, at(9, 30)).await?;
    db.insert_span(endpoint, "otel-collector", at(9, 45)).await?;
    db.insert_span(EndpointId::new(2), TRACE_SOURCE, at(9, 50)).await?;

    let latest = db.telemetry.most_recent_span(&query(1)).await?;

    assert_eq!(latest, Some(at(9, 30)));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn postgres_spans_before_lookback_are_ignored(
    #[future] coverage_db: Result<Option<CoverageDb>, BoxError>,
) -> Result<(), BoxError> {
    let Some(db) = coverage_db.await? else {
        return Ok(());
    };
    db.execute(CREATE_SPANS_SQL).await?;
    db.insert_span(EndpointId::new(3), TRACE_SOURCE, at(8, 0)).await?;

    let latest = db.telemetry.most_recent_span(&query(3)).await?;

    assert_eq!(latest, None);
    Ok(())
}
