use std::io::Write;
use std::path::Path;

use marketlens_core::context::AppConfigExt;
use marketlens_core::query::DatasetInfo;
use marketlens_core::{
    Dimension, KpiSummary, LoadSource, RankingRow, Row, SessionError, TrendPoint,
};

use crate::context::CliContext;
use crate::format::{format_count, format_premium, format_share};

type CommandResult = Result<(), String>;

fn parse_dimension(name: &str) -> Result<Dimension, String> {
    Dimension::parse(name).ok_or_else(|| {
        format!(
            "unknown dimension '{name}' (expected period, region, insurance, business or company)"
        )
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

pub async fn load_file(path: &str, ctx: &CliContext) -> CommandResult {
    let source = LoadSource::file(Path::new(path)).map_err(|e| e.to_string())?;
    load(source, ctx).await
}

pub async fn load_url(url: &str, ctx: &CliContext) -> CommandResult {
    load(LoadSource::url(url), ctx).await
}

pub async fn load_default(ctx: &CliContext) -> CommandResult {
    let url = ctx.config.read().await.default_dataset_url.clone();
    load_url(&url, ctx).await
}

async fn load(source: LoadSource, ctx: &CliContext) -> CommandResult {
    println!("Loading {} ...", source.name());
    match ctx.session.load(&source).await {
        Ok(info) => print_dataset(&info),
        Err(SessionError::SchemaMismatch { missing }) => {
            let snap = ctx.session.snapshot().await;
            println!(
                "Loaded {} rows, but the dataset is missing required columns: {}",
                snap.row_count,
                missing.join(", ")
            );
            println!("Dashboard commands are unavailable; preview and sql still work.");
            return Ok(());
        }
        Err(e) => return Err(e.to_string()),
    }

    let mut filter = ctx.filter.write().await;
    let dropped = ctx
        .session
        .revalidate(&mut filter)
        .await
        .map_err(|e| e.to_string())?;
    if dropped > 0 {
        println!("Removed {dropped} filter value(s) not present in this dataset");
    }
    Ok(())
}

fn print_dataset(info: &DatasetInfo) {
    println!(
        "Loaded {} rows, {} columns from {}",
        info.row_count,
        info.columns.len(),
        info.source
    );
    println!("Columns: {}", info.columns.join(", "));
}

pub async fn status(ctx: &CliContext) -> CommandResult {
    let snap = ctx.session.snapshot().await;
    println!("Phase:      {}", snap.phase.label());
    if snap.is_loaded() {
        println!("Rows:       {}", snap.row_count);
        println!("Columns:    {}", snap.columns.join(", "));
        println!("Generation: {}", snap.generation);
    }
    if !snap.missing_columns.is_empty() {
        println!("Missing:    {}", snap.missing_columns.join(", "));
    }
    if let Some(err) = &snap.error {
        println!("Error:      {err}");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

pub async fn set_filter(dimension: &str, values: &[String], ctx: &CliContext) -> CommandResult {
    let dim = parse_dimension(dimension)?;
    {
        let mut filter = ctx.filter.write().await;
        ctx.session
            .select(&mut filter, dim, values.to_vec())
            .await
            .map_err(|e| e.to_string())?;
    }
    show_filter(ctx).await
}

pub async fn clear_filters(ctx: &CliContext) -> CommandResult {
    ctx.filter.write().await.clear();
    println!("Filters cleared");
    Ok(())
}

async fn show_filter(ctx: &CliContext) -> CommandResult {
    let filter = ctx.filter().await;
    if filter.is_empty() {
        println!("No filters applied");
        return Ok(());
    }
    for dim in Dimension::FILTERS {
        if let Some(values) = filter.values(dim).filter(|v| !v.is_empty()) {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            println!("{}: {}", dim.label(), values.join(", "));
        }
    }
    Ok(())
}

pub async fn filter_options(ctx: &CliContext) -> CommandResult {
    let options = ctx
        .session
        .filter_options()
        .await
        .map_err(|e| e.to_string())?;
    for dim in Dimension::FILTERS {
        let values = options.values(dim);
        println!("{} ({}): {}", dim.label(), values.len(), values.join(", "));
    }
    println!();
    show_filter(ctx).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────────────────────────

pub async fn kpis(ctx: &CliContext) -> CommandResult {
    let filter = ctx.filter().await;
    let kpis = ctx.session.kpis(&filter).await.map_err(|e| e.to_string())?;
    print_kpis(&kpis);
    Ok(())
}

fn print_kpis(kpis: &KpiSummary) {
    println!("总保费:     {} 元", format_premium(kpis.total_premium));
    println!("总件数:     {} 件", format_count(kpis.total_policies));
    println!("业务类型数: {}", kpis.business_type_count);
    println!("地市数:     {}", kpis.region_count);
}

pub async fn trend(ctx: &CliContext) -> CommandResult {
    let filter = ctx.filter().await;
    let points = ctx.session.trend(&filter).await.map_err(|e| e.to_string())?;
    print_trend(&points);
    Ok(())
}

fn print_trend(points: &[TrendPoint]) {
    if points.is_empty() {
        println!("No data");
        return;
    }
    println!("{:<12} {:>16} {:>12}", "年月", "保费", "件数");
    for p in points {
        println!(
            "{:<12} {:>16} {:>12}",
            p.period,
            format_premium(p.premium),
            format_count(p.policies)
        );
    }
}

pub async fn ranking(dimension: &str, limit: Option<usize>, ctx: &CliContext) -> CommandResult {
    let dim = parse_dimension(dimension)?;
    let limit = match limit {
        Some(limit) => limit,
        None => ctx.config.read().await.ranking_limit,
    };
    let filter = ctx.filter().await;
    let rows = ctx
        .session
        .ranking(dim, &filter, limit)
        .await
        .map_err(|e| e.to_string())?;
    print_ranking(dim, &rows);
    Ok(())
}

pub async fn breakdown(dimension: &str, ctx: &CliContext) -> CommandResult {
    let dim = parse_dimension(dimension)?;
    let filter = ctx.filter().await;
    let rows = ctx
        .dashboard
        .refresh_analysis(&ctx.session, dim, &filter)
        .await
        .map_err(|e| e.to_string())?;
    match rows {
        Some(rows) => print_ranking(dim, &rows),
        None => println!("Superseded by a newer request"),
    }
    Ok(())
}

fn print_ranking(dim: Dimension, rows: &[RankingRow]) {
    if rows.is_empty() {
        println!("No data");
        return;
    }
    println!(
        "{:>4}  {:<16} {:>16} {:>12} {:>8} {:>12}",
        "#",
        dim.label(),
        "保费",
        "件数",
        "占比",
        "件均保费"
    );
    for (i, row) in rows.iter().enumerate() {
        println!(
            "{:>4}  {:<16} {:>16} {:>12} {:>8} {:>12.2}",
            i + 1,
            row.name,
            format_premium(row.premium),
            format_count(row.policies),
            format_share(row.share),
            row.avg_premium()
        );
    }
}

pub async fn dashboard(ctx: &CliContext) -> CommandResult {
    let filter = ctx.filter().await;
    let overview = ctx
        .dashboard
        .refresh_overview(&ctx.session, &filter)
        .await
        .map_err(|e| e.to_string())?;
    let Some(overview) = overview else {
        println!("Superseded by a newer request");
        return Ok(());
    };

    print_kpis(&overview.kpis);
    println!();
    print_trend(&overview.trend);
    println!();
    print_ranking(Dimension::Region, &overview.region_ranking);
    if let Some(companies) = &overview.company_ranking {
        println!();
        print_ranking(Dimension::Company, companies);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw access
// ─────────────────────────────────────────────────────────────────────────────

pub async fn preview(limit: Option<usize>, ctx: &CliContext) -> CommandResult {
    let limit = match limit {
        Some(limit) => limit,
        None => ctx.config.read().await.preview_limit,
    };
    let rows = ctx.session.preview(limit).await.map_err(|e| e.to_string())?;
    print_rows(&rows);
    Ok(())
}

pub async fn distinct(column: &str, ctx: &CliContext) -> CommandResult {
    let values = ctx
        .session
        .distinct(column)
        .await
        .map_err(|e| e.to_string())?;
    for value in &values {
        println!("{value}");
    }
    println!("({} values)", values.len());
    Ok(())
}

pub async fn sql(query: &str, ctx: &CliContext) -> CommandResult {
    let rows = ctx.session.query(query).await.map_err(|e| e.to_string())?;
    print_rows(&rows);
    Ok(())
}

fn print_rows(rows: &[Row]) {
    let Some(first) = rows.first() else {
        println!("(0 rows)");
        return;
    };
    let header: Vec<&str> = first.columns().collect();
    println!("{}", header.join("\t"));
    for row in rows {
        let cells: Vec<String> = row.values.iter().map(|(_, cell)| cell.to_string()).collect();
        println!("{}", cells.join("\t"));
    }
    println!("({} rows)", rows.len());
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

pub async fn show_settings(ctx: &CliContext) -> CommandResult {
    let config = ctx.config.read().await;
    println!("Default dataset: {}", config.default_dataset_url);
    println!("Relation:        {}", config.relation_name);
    println!("Ranking limit:   {}", config.ranking_limit);
    println!("Preview limit:   {}", config.preview_limit);
    println!(
        "Engine:          {} partitions, batch {}, memory limit {}",
        config.engine.target_partitions,
        config.engine.batch_size,
        config
            .engine
            .memory_limit_mb
            .map_or_else(|| "none".to_string(), |mb| format!("{mb} MB"))
    );
    let c = &config.columns;
    println!(
        "Columns:         period={} premium={} policies={} region={} insurance={} business={} company={}",
        c.period,
        c.premium,
        c.policies,
        c.region,
        c.insurance_type,
        c.business_type,
        c.company.as_deref().unwrap_or("-")
    );
    Ok(())
}

pub async fn set_default_url(url: &str, ctx: &CliContext) -> CommandResult {
    let mut config = ctx.config.write().await;
    config.default_dataset_url = url.to_string();
    config.save().map_err(|e| e.to_string())?;
    println!("Default dataset set to {url}");
    Ok(())
}

pub async fn exit(ctx: &CliContext) {
    ctx.session.shutdown().await;
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "quitting...");
    let _ = stdout.flush();
}
