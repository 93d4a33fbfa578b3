//! Statistics engine tests over a seeded database

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use beacon::cache::Cache;
use beacon::database::models::{CheckResult, Endpoint, NewEndpoint};
use beacon::database::{Database, open_database};
use beacon::monitoring::EndpointStatus;
use beacon::stats::{StatisticsEngine, StatsWindow};
use beacon::MonitorError;
use chrono::{Duration, Utc};
use tempfile::{TempDir, tempdir};

struct Seeded {
    _dir: TempDir,
    database: Arc<dyn Database>,
    stats: StatisticsEngine,
}

async fn seeded() -> Result<Seeded> {
    logger::try_init_tracing();
    let dir = tempdir()?;
    let database: Arc<dyn Database> = Arc::new(open_database(dir.path().join("beacon.db"), 4).await?);
    let cache = Cache::in_memory(StdDuration::from_secs(60), 1_000, StdDuration::from_secs(60));
    let stats = StatisticsEngine::new(database.clone(), cache);
    Ok(Seeded { _dir: dir, database, stats })
}

async fn endpoint(database: &Arc<dyn Database>, name: &str, status: EndpointStatus) -> Result<Endpoint> {
    let endpoint = NewEndpoint::new(name, format!("https://{name}.example.com")).into_endpoint();
    database.insert_endpoint(&endpoint).await?;
    database.update_endpoint_health(endpoint.id, status, 0, 0, Utc::now()).await?;
    Ok(endpoint)
}

/// `total` checks spread over the last hour, the first `failures` of them failed
async fn record_checks(
    database: &Arc<dyn Database>,
    endpoint: &Endpoint,
    total: u32,
    failures: u32,
    latency_ms: u64,
) -> Result<()> {
    let now = Utc::now();
    for index in 0..total {
        let success = index >= failures;
        database
            .insert_check_result(&CheckResult {
                id: None,
                endpoint_id: endpoint.id,
                success,
                latency_ms,
                status_code: Some(if success { 200 } else { 503 }),
                error: None,
                checked_at: now - Duration::seconds(i64::from(index) * 30 + 1),
            })
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_uptime_and_latency_for_endpoint() -> Result<()> {
    let seeded = seeded().await?;
    let api = endpoint(&seeded.database, "api", EndpointStatus::Up).await?;
    record_checks(&seeded.database, &api, 100, 5, 120).await?;

    assert_eq!(seeded.stats.uptime(api.id, StatsWindow::Day).await?, 95.0);

    let latency = seeded.stats.response_time_stats(api.id, StatsWindow::Day).await?;
    assert_eq!(latency.samples, 95);
    assert_eq!(latency.avg_ms, 120.0);
    assert_eq!(latency.p99_ms, 120);
    assert!(!latency.series.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_empty_endpoint_reports_zeros() -> Result<()> {
    let seeded = seeded().await?;
    let idle = endpoint(&seeded.database, "idle", EndpointStatus::Unknown).await?;

    assert_eq!(seeded.stats.uptime(idle.id, StatsWindow::Week).await?, 0.0);
    let latency = seeded.stats.response_time_stats(idle.id, StatsWindow::Hour).await?;
    assert_eq!(latency.samples, 0);
    assert_eq!(latency.avg_ms, 0.0);
    assert_eq!(latency.p50_ms, 0);
    assert!(seeded.stats.uptime_history(idle.id, 7).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_overview_counts() -> Result<()> {
    let seeded = seeded().await?;
    let api = endpoint(&seeded.database, "api", EndpointStatus::Up).await?;
    let web = endpoint(&seeded.database, "web", EndpointStatus::Down).await?;
    record_checks(&seeded.database, &api, 10, 0, 100).await?;
    record_checks(&seeded.database, &web, 10, 10, 0).await?;
    seeded.database.open_incident(web.id, Utc::now() - Duration::minutes(5), 3, None).await?;

    let overview = seeded.stats.overview().await?;
    assert_eq!(overview.total_endpoints, 2);
    assert_eq!(overview.uptime_24h, 50.0);
    assert_eq!(overview.open_incidents, 1);
    assert_eq!(overview.incidents_24h, 1);
    assert_eq!(overview.avg_latency_ms, 100.0);

    let count_of = |status: EndpointStatus| {
        overview.status_breakdown.iter().find(|entry| entry.status == status).map(|entry| entry.count)
    };
    assert_eq!(count_of(EndpointStatus::Up), Some(1));
    assert_eq!(count_of(EndpointStatus::Down), Some(1));
    assert_eq!(count_of(EndpointStatus::Degraded), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_comparison_ranks_by_stability() -> Result<()> {
    let seeded = seeded().await?;
    let steady = endpoint(&seeded.database, "steady", EndpointStatus::Up).await?;
    let flaky = endpoint(&seeded.database, "flaky", EndpointStatus::Up).await?;
    record_checks(&seeded.database, &steady, 20, 0, 50).await?;
    record_checks(&seeded.database, &flaky, 20, 10, 2_500).await?;
    seeded.database.open_incident(flaky.id, Utc::now() - Duration::minutes(30), 3, None).await?;

    let ranking = seeded.stats.comparison().await?;
    assert_eq!(ranking.len(), 2);
    assert_eq!((ranking[0].name.as_str(), ranking[0].rank), ("steady", 1));
    assert_eq!((ranking[1].name.as_str(), ranking[1].rank), ("flaky", 2));
    // 0.6*0.5 + 0.3*0.5 + 0.1*0.8
    assert_eq!(ranking[1].stability_score, 53.0);
    assert_eq!(ranking[1].incidents_24h, 1);
    Ok(())
}

#[tokio::test]
async fn test_incident_detail_includes_checks() -> Result<()> {
    let seeded = seeded().await?;
    let api = endpoint(&seeded.database, "api", EndpointStatus::Down).await?;
    record_checks(&seeded.database, &api, 6, 6, 0).await?;
    let incident = seeded
        .database
        .open_incident(api.id, Utc::now() - Duration::seconds(100), 3, Some("Request timed out".into()))
        .await?;

    let detail = seeded.stats.incident_detail(incident.id).await?;
    assert_eq!(detail.incident.id, incident.id);
    assert_eq!(detail.endpoint.map(|endpoint| endpoint.id), Some(api.id));
    // Checks at 1s, 31s, 61s and 91s ago fall inside the incident
    assert_eq!(detail.checks.len(), 4);

    let missing = seeded.stats.incident_detail(incident.id + 100).await.unwrap_err();
    assert!(matches!(missing, MonitorError::IncidentNotFound(_)));
    Ok(())
}
