//! Tests for the session lifecycle and its query gates

use std::path::PathBuf;

use super::*;
use crate::test_support::{empty_parquet, parquet_bytes, parquet_without, record, sample_records};
use marketlens_types::EngineSettings;

fn session() -> Session {
    Session::new(
        QueryGateway::new(EngineSettings::default(), "market_data"),
        ColumnMapping::default(),
    )
}

async fn loaded_session() -> Session {
    let session = session();
    session
        .load_bytes(parquet_bytes(&sample_records()), "sample.parquet")
        .await
        .unwrap();
    session
}

fn region(value: &str) -> FilterSelection {
    FilterSelection::default().with(Dimension::Region, [value])
}

#[tokio::test]
async fn fresh_session_rejects_queries_without_side_effects() {
    let session = session();
    let before = session.snapshot().await;
    assert_eq!(before.phase, SessionPhase::Uninitialized);

    let err = session.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, SessionError::NotLoaded));
    assert_eq!(err.to_string(), "data not loaded");
    assert!(matches!(
        session.kpis(&FilterSelection::default()).await,
        Err(SessionError::NotLoaded)
    ));
    assert!(matches!(session.distinct("地市").await, Err(SessionError::NotLoaded)));

    assert_eq!(session.snapshot().await, before);
}

#[tokio::test]
async fn initialize_twice_is_a_single_transition() {
    let session = session();
    session.initialize().await.unwrap();
    session.initialize().await.unwrap();
    assert_eq!(session.phase().await, SessionPhase::EngineReady);
    assert!(session.gateway().is_initialized().await);

    // ready but empty
    assert!(matches!(session.query("SELECT 1").await, Err(SessionError::NotLoaded)));
}

#[tokio::test]
async fn load_moves_to_loaded_with_metadata() {
    let session = loaded_session().await;
    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Loaded);
    assert_eq!(snap.row_count, 4);
    assert_eq!(snap.generation, 1);
    assert!(snap.error.is_none());
    assert!(snap.missing_columns.is_empty());
    assert!(snap.dashboard_ready());
    assert!(snap.columns.iter().any(|c| c == "渠道"));
}

#[tokio::test]
async fn kpis_cover_whole_dataset_and_filters() {
    let session = loaded_session().await;

    let all = session.kpis(&FilterSelection::default()).await.unwrap();
    assert_eq!(all.total_premium, 3000.0);
    assert_eq!(all.total_policies, 32.0);
    assert_eq!(all.region_count, 2);
    assert_eq!(all.business_type_count, 2);

    let chengdu = session.kpis(&region("成都")).await.unwrap();
    assert_eq!(chengdu.total_premium, 2500.0);
    assert_eq!(chengdu.total_policies, 22.0);
    assert_eq!(chengdu.region_count, 1);
}

#[tokio::test]
async fn second_load_fully_replaces_the_first() {
    let session = loaded_session().await;
    let replacement = vec![
        record("2025-01", "德阳", "太保", 50.0, 1),
        record("2025-02", "德阳", "太保", 70.0, 2),
    ];
    session
        .load_bytes(parquet_bytes(&replacement), "replacement.parquet")
        .await
        .unwrap();

    assert_eq!(session.generation().await, 2);
    assert_eq!(session.distinct("地市").await.unwrap(), vec!["德阳"]);
    let kpis = session.kpis(&FilterSelection::default()).await.unwrap();
    assert_eq!(kpis.total_premium, 120.0);
    assert_eq!(session.snapshot().await.row_count, 2);
}

#[tokio::test]
async fn missing_required_column_is_named() {
    let session = session();
    let bytes = parquet_without(&sample_records(), &["标准件数"]);
    let err = session.load_bytes(bytes, "partial.parquet").await.unwrap_err();

    match &err {
        SessionError::SchemaMismatch { missing } => {
            assert_eq!(missing, &vec!["标准件数".to_string()])
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Loaded);
    assert_eq!(snap.missing_columns, vec!["标准件数"]);
    assert!(snap.error.as_deref().unwrap().contains("标准件数"));
    assert!(!snap.dashboard_ready());

    // dashboard queries are withheld, raw access still works
    assert!(matches!(
        session.kpis(&FilterSelection::default()).await,
        Err(SessionError::SchemaMismatch { .. })
    ));
    assert_eq!(session.preview(2).await.unwrap().len(), 2);
    assert_eq!(session.query("SELECT COUNT(*) AS n FROM market_data").await.unwrap().len(), 1);
}

#[tokio::test]
async fn extra_columns_are_accepted() {
    let session = session();
    let bytes = parquet_without(&sample_records(), &["保险"]);
    session.load_bytes(bytes, "no-company.parquet").await.unwrap();

    let snap = session.snapshot().await;
    assert!(snap.dashboard_ready());
    assert!(snap.columns.iter().any(|c| c == "渠道"));
}

#[tokio::test]
async fn company_queries_need_company_column() {
    let session = session();
    let bytes = parquet_without(&sample_records(), &["保险"]);
    session.load_bytes(bytes, "no-company.parquet").await.unwrap();

    assert!(!session.supports(Dimension::Company).await);
    let err = session
        .ranking(Dimension::Company, &FilterSelection::default(), 10)
        .await
        .unwrap_err();
    match err {
        SessionError::SchemaMismatch { missing } => assert_eq!(missing, vec!["保险"]),
        other => panic!("expected schema mismatch, got {other:?}"),
    }

    let regions = session
        .ranking(Dimension::Region, &FilterSelection::default(), 10)
        .await
        .unwrap();
    assert_eq!(regions.len(), 2);
}

#[tokio::test]
async fn engine_failure_is_recorded_and_retried() {
    let settings = EngineSettings {
        batch_size: 0,
        ..EngineSettings::default()
    };
    let session = Session::new(
        QueryGateway::new(settings, "market_data"),
        ColumnMapping::default(),
    );

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SessionError::EngineInit(_)));
    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Error);
    assert!(snap.error.is_some());

    // a load retries initialization and fails the same way
    let err = session
        .load_bytes(parquet_bytes(&sample_records()), "sample.parquet")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::EngineInit(_)));
    assert!(matches!(session.query("SELECT 1").await, Err(SessionError::NotLoaded)));
}

#[tokio::test]
async fn failed_load_drops_previous_dataset() {
    let session = loaded_session().await;
    let err = session
        .load_bytes(bytes::Bytes::from_static(b"not parquet"), "broken.parquet")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::DatasetLoad(_)));

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Error);
    assert!(snap.columns.is_empty());
    assert_eq!(snap.row_count, 0);
    assert!(snap.error.as_deref().unwrap().contains("broken.parquet"));
    assert!(matches!(session.query("SELECT 1").await, Err(SessionError::NotLoaded)));

    // recovers with a good file
    session
        .load_bytes(parquet_bytes(&sample_records()), "sample.parquet")
        .await
        .unwrap();
    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Loaded);
    assert!(snap.error.is_none());
    assert_eq!(snap.generation, 2);
}

#[tokio::test]
async fn empty_file_is_a_load_error() {
    let session = session();
    let err = session.load_bytes(empty_parquet(), "empty.parquet").await.unwrap_err();
    assert!(matches!(err, SessionError::DatasetLoad(_)));
    assert_eq!(session.phase().await, SessionPhase::Error);
}

#[tokio::test]
async fn loads_from_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("market.parquet");
    std::fs::write(&path, parquet_bytes(&sample_records())).unwrap();

    let session = session();
    let info = session.load(&LoadSource::file(&path).unwrap()).await.unwrap();
    assert_eq!(info.source, "market.parquet");
    assert_eq!(info.row_count, 4);
}

#[tokio::test]
async fn wrong_extension_is_rejected_by_load() {
    let session = session();
    let err = session
        .load(&LoadSource::File(PathBuf::from("/tmp/market.csv")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::DatasetLoad(LoadError::UnsupportedExtension { .. })
    ));
    assert_eq!(session.phase().await, SessionPhase::Error);
}

#[tokio::test]
async fn query_errors_become_the_session_error() {
    let session = loaded_session().await;
    let err = session
        .query("SELECT no_such_column FROM market_data")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Query(_)));

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Loaded);
    assert!(snap.error.is_some());
}

#[tokio::test]
async fn filter_options_are_sorted_distinct_values() {
    let session = loaded_session().await;
    let options = session.filter_options().await.unwrap();
    assert_eq!(options.periods, vec!["2024-06", "2024-07"]);
    assert_eq!(options.regions, vec!["成都", "绵阳"]);
    assert_eq!(options.insurance_types, vec!["交强险", "商业险"]);
    assert_eq!(options.business_types, vec!["新车", "续保"]);
}

#[tokio::test]
async fn revalidate_drops_values_absent_after_reload() {
    let session = loaded_session().await;
    let mut selection = region("绵阳").with(Dimension::Period, ["2024-06"]);
    assert_eq!(session.revalidate(&mut selection).await.unwrap(), 0);

    let replacement = vec![record("2024-06", "成都", "人保", 10.0, 1)];
    session
        .load_bytes(parquet_bytes(&replacement), "chengdu.parquet")
        .await
        .unwrap();
    assert_eq!(session.revalidate(&mut selection).await.unwrap(), 1);
    assert!(selection.values(Dimension::Region).is_none_or(|v| v.is_empty()));
    assert_eq!(
        selection.values(Dimension::Period).map(|v| v.len()),
        Some(1)
    );
}

#[tokio::test]
async fn overview_refresh_fills_every_panel() {
    let session = loaded_session().await;
    let dashboard = Dashboard::new(10);
    let overview = dashboard
        .refresh_overview(&session, &FilterSelection::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(overview.kpis.total_premium, 3000.0);
    assert_eq!(overview.trend.len(), 2);
    assert_eq!(overview.region_ranking[0].name, "成都");
    let companies = overview.company_ranking.unwrap();
    assert_eq!(companies[0].name, "平安");
    assert!((companies[0].share - 60.0).abs() < 1e-9);

    assert_eq!(dashboard.kpis.current().await, Some(overview.kpis));
}

#[tokio::test]
async fn overview_without_company_column_skips_company_panel() {
    let session = session();
    session
        .load_bytes(parquet_without(&sample_records(), &["保险"]), "no-company.parquet")
        .await
        .unwrap();
    let overview = Dashboard::new(10)
        .refresh_overview(&session, &FilterSelection::default())
        .await
        .unwrap()
        .unwrap();
    assert!(overview.company_ranking.is_none());
    assert_eq!(overview.region_ranking.len(), 2);
}

#[tokio::test]
async fn latest_filter_wins_and_reload_invalidates_cache() {
    let session = loaded_session().await;
    let dashboard = Dashboard::new(10);

    dashboard.refresh_overview(&session, &region("成都")).await.unwrap();
    dashboard.refresh_overview(&session, &region("绵阳")).await.unwrap();
    let kpis = dashboard.kpis.current().await.unwrap();
    assert_eq!(kpis.total_premium, 500.0);

    let replacement = vec![record("2024-06", "绵阳", "人保", 5.0, 1)];
    session
        .load_bytes(parquet_bytes(&replacement), "small.parquet")
        .await
        .unwrap();
    dashboard.refresh_overview(&session, &region("绵阳")).await.unwrap();
    assert_eq!(dashboard.kpis.current().await.unwrap().total_premium, 5.0);
}

#[tokio::test]
async fn analysis_panel_lists_every_group() {
    let session = loaded_session().await;
    let dashboard = Dashboard::new(1);
    let rows = dashboard
        .refresh_analysis(&session, Dimension::BusinessType, &FilterSelection::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "新车");
    let total: f64 = rows.iter().map(|r| r.share).sum();
    assert!((total - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn shutdown_returns_to_uninitialized() {
    let session = loaded_session().await;
    session.shutdown().await;
    session.shutdown().await;

    let snap = session.snapshot().await;
    assert_eq!(snap.phase, SessionPhase::Uninitialized);
    assert!(snap.columns.is_empty());
    assert!(matches!(session.query("SELECT 1").await, Err(SessionError::NotLoaded)));

    // can come back up and load again
    session
        .load_bytes(parquet_bytes(&sample_records()), "sample.parquet")
        .await
        .unwrap();
    assert!(session.snapshot().await.generation > snap.generation);
}

#[tokio::test]
async fn unknown_filter_values_are_rejected_and_selection_kept() {
    let session = loaded_session().await;
    let mut selection = region("成都");

    let err = session
        .select(
            &mut selection,
            Dimension::Region,
            vec!["绵阳".to_string(), "不存在".to_string(), "不存在".to_string()],
        )
        .await
        .unwrap_err();
    match &err {
        SessionError::UnknownFilterValues { dimension, values } => {
            assert_eq!(*dimension, "地市");
            assert_eq!(values, &vec!["不存在".to_string()]);
        }
        other => panic!("expected unknown filter values, got {other:?}"),
    }
    assert!(err.to_string().contains("不存在"));
    assert_eq!(selection, region("成都"));
    assert!(session.snapshot().await.error.is_none());
}

#[tokio::test]
async fn known_filter_values_replace_the_selection() {
    let session = loaded_session().await;
    let mut selection = region("成都");
    session
        .select(&mut selection, Dimension::Period, vec!["2024-07".to_string()])
        .await
        .unwrap();
    assert_eq!(selection, region("成都").with(Dimension::Period, ["2024-07"]));

    let kpis = session.kpis(&selection).await.unwrap();
    assert_eq!(kpis.total_premium, 1500.0);

    // an empty list clears the dimension
    session
        .select(&mut selection, Dimension::Region, Vec::new())
        .await
        .unwrap();
    assert_eq!(
        selection,
        FilterSelection::default().with(Dimension::Period, ["2024-07"])
    );
}

#[tokio::test]
async fn selecting_before_load_is_refused() {
    let session = session();
    let mut selection = FilterSelection::default();
    let err = session
        .select(&mut selection, Dimension::Region, vec!["成都".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotLoaded));
    assert!(selection.is_empty());
    assert_eq!(session.phase().await, SessionPhase::Uninitialized);
}

#[tokio::test]
async fn company_is_not_selectable() {
    let session = loaded_session().await;
    let err = session
        .validate_selection(Dimension::Company, &["人保".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotAFilter { .. }));
}
