use clap::{Parser, Subcommand};
use marketlens_cli::{CliContext, commands, logging, readline};
use std::io::Write;

/// Interactive market analytics over a parquet dataset.
#[derive(Parser)]
#[command(version, about = "marketlens")]
struct Args {
    /// Parquet file to load at startup
    #[arg(short, long)]
    file: Option<String>,
    /// Load the configured default dataset at startup
    #[arg(long, conflicts_with = "file")]
    load_default: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let _log_guard = logging::init();
    let args = Args::parse();
    let ctx = CliContext::new();

    if let Some(path) = &args.file {
        report(commands::load_file(path, &ctx).await)?;
    } else if args.load_default {
        report(commands::load_default(&ctx).await)?;
    }

    while let Some(line) = readline()? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, &ctx).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => report(Err(err))?,
        }
    }

    Ok(())
}

fn report(result: Result<(), String>) -> Result<(), String> {
    if let Err(err) = result {
        writeln!(std::io::stdout(), "error: {}", err.trim_end()).map_err(|e| e.to_string())?;
        std::io::stdout().flush().map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a local .parquet file
    Load { path: String },
    /// Load a .parquet file over HTTP
    LoadUrl { url: String },
    /// Load the configured default dataset
    LoadDefault,
    Status,
    /// Restrict a dimension to the given values (none clears it)
    Filter { dimension: String, values: Vec<String> },
    ClearFilters,
    /// Show filter options and the current selection
    Filters,
    Kpi,
    Trend,
    Ranking {
        #[arg(default_value = "region")]
        dimension: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    Breakdown { dimension: String },
    Dashboard,
    Preview {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    Distinct { column: String },
    Sql {
        #[arg(trailing_var_arg = true, num_args = 1..)]
        query: Vec<String>,
    },
    Config,
    SetDefaultUrl { url: String },
    Exit,
}

async fn respond(line: &str, ctx: &CliContext) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "marketlens".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Load { path }) => commands::load_file(path, ctx).await?,
        Some(Commands::LoadUrl { url }) => commands::load_url(url, ctx).await?,
        Some(Commands::LoadDefault) => commands::load_default(ctx).await?,
        Some(Commands::Status) => commands::status(ctx).await?,
        Some(Commands::Filter { dimension, values }) => {
            commands::set_filter(dimension, values, ctx).await?
        }
        Some(Commands::ClearFilters) => commands::clear_filters(ctx).await?,
        Some(Commands::Filters) => commands::filter_options(ctx).await?,
        Some(Commands::Kpi) => commands::kpis(ctx).await?,
        Some(Commands::Trend) => commands::trend(ctx).await?,
        Some(Commands::Ranking { dimension, limit }) => {
            commands::ranking(dimension, *limit, ctx).await?
        }
        Some(Commands::Breakdown { dimension }) => commands::breakdown(dimension, ctx).await?,
        Some(Commands::Dashboard) => commands::dashboard(ctx).await?,
        Some(Commands::Preview { limit }) => commands::preview(*limit, ctx).await?,
        Some(Commands::Distinct { column }) => commands::distinct(column, ctx).await?,
        Some(Commands::Sql { query }) => commands::sql(&query.join(" "), ctx).await?,
        Some(Commands::Config) => commands::show_settings(ctx).await?,
        Some(Commands::SetDefaultUrl { url }) => commands::set_default_url(url, ctx).await?,
        Some(Commands::Exit) => {
            commands::exit(ctx).await;
            return Ok(true);
        }
        None => {}
    }
    Ok(false)
}
