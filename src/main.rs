//! Scoreboards terminal client.
//!
//! One-shot commands over a freshly loaded session: list brands, print
//! the monthly grid, edit cells, manage metrics, generate AI insights.
//! Background write failures surface as alerts before the process exits.

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use scoreboards::error::SessionError;
use scoreboards::insight::{self, InsightMetric, InsightProvider, OpenAiInsightProvider};
use scoreboards::latency;
use scoreboards::queries;
use scoreboards::services::values::WriteOutcome;
use scoreboards::services::{metrics as metrics_service, scoreboard, values as values_service};
use scoreboards::state::{self, Session};
use scoreboards::types::{Importance, Metric, SessionAlert};
use scoreboards::util;

#[derive(Parser)]
#[command(
    name = "scoreboards",
    version,
    about = "Marketing scoreboards: monthly metric grids, optimistic edits, AI insights"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List brands; optionally remember one for later commands
    Brands {
        /// Brand id or name to select ("all" clears the selection)
        #[arg(long)]
        select: Option<String>,
    },
    /// Print the metric grid for one year
    Grid {
        /// Brand id or name ("all" for every brand); defaults to the
        /// remembered selection
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Full value history and stats for one metric
    Detail {
        /// Metric id or name
        metric: String,
    },
    /// Set one cell; an empty or omitted value clears it
    Set {
        /// Metric id or name
        metric: String,
        year: i32,
        /// Month 1-12
        month: u32,
        #[arg(default_value = "")]
        value: String,
    },
    /// Create a metric in a brand
    AddMetric {
        /// Brand id or name
        brand: String,
        name: String,
        /// Where the numbers come from (e.g. "GA4", "HubSpot")
        #[arg(long)]
        source: Option<String>,
    },
    /// Rename a metric or change its data source
    EditMetric {
        /// Metric id or name
        metric: String,
        name: String,
        #[arg(long)]
        source: Option<String>,
    },
    /// Delete a metric and all its values
    RmMetric {
        /// Metric id or name
        metric: String,
    },
    /// Set a metric's importance, or cycle it when no level is given
    Importance {
        /// Metric id or name
        metric: String,
        /// green, amber, or red; omit to cycle
        level: Option<String>,
    },
    /// Move a metric to a new position within its brand
    Move {
        /// Metric id or name
        metric: String,
        /// Target position, 1-based within the brand's display order
        position: usize,
    },
    /// Create a brand
    AddBrand { name: String },
    /// AI insight bullets for the visible metrics
    Insight {
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Gateway latency rollups recorded during this run
    Diag,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        eprintln!("  {}", e.recovery_suggestion());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SessionError> {
    let config = state::load_config().map_err(SessionError::Configuration)?;
    let (session, mut alerts) =
        Session::connect(config).map_err(SessionError::Configuration)?;

    queries::load_session(&session).await;
    // A failed load already queued its alert; commands then run against an
    // empty session and print empty views.
    drain_alerts(&mut alerts);

    match cli.command {
        Command::Brands { select } => cmd_brands(&session, select.as_deref()).await?,
        Command::Grid { brand, year } => cmd_grid(&session, brand.as_deref(), year)?,
        Command::Detail { metric } => cmd_detail(&session, &metric).await?,
        Command::Set {
            metric,
            year,
            month,
            value,
        } => cmd_set(&session, &metric, year, month, &value).await?,
        Command::AddMetric {
            brand,
            name,
            source,
        } => {
            let brand = resolve_brand(&session, &brand)?;
            let created =
                metrics_service::create_metric(&session, &brand.id, &name, source.as_deref())
                    .await?;
            println!("created metric {} ({}) in {}", created.name, created.id, brand.name);
        }
        Command::EditMetric {
            metric,
            name,
            source,
        } => {
            let metric = resolve_metric(&session, &metric)?;
            let updated =
                metrics_service::update_metric(&session, &metric.id, &name, source.as_deref())
                    .await?;
            println!("updated metric {} ({})", updated.name, updated.id);
        }
        Command::RmMetric { metric } => {
            let metric = resolve_metric(&session, &metric)?;
            metrics_service::delete_metric(&session, &metric.id).await?;
            println!("deleted metric {} ({}) and its values", metric.name, metric.id);
        }
        Command::Importance { metric, level } => {
            let metric = resolve_metric(&session, &metric)?;
            let level = match level.as_deref() {
                Some(raw) => Some(Importance::parse(raw).ok_or_else(|| {
                    SessionError::InvalidRequest(format!(
                        "importance must be green, amber, or red (got \"{raw}\")"
                    ))
                })?),
                None => None,
            };
            let updated = metrics_service::set_importance(&session, &metric.id, level).await?;
            println!("{} is now {}", updated.name, updated.importance.as_str());
        }
        Command::Move { metric, position } => {
            cmd_move(&session, &metric, position).await?;
        }
        Command::AddBrand { name } => {
            let created = queries::create_brand(&session, &name).await?;
            println!("created brand {} ({})", created.name, created.id);
        }
        Command::Insight { brand, year } => cmd_insight(&session, brand.as_deref(), year).await?,
        Command::Diag => {
            let report = latency::report();
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("error: could not serialize latency report: {e}"),
            }
        }
    }

    drain_alerts(&mut alerts);
    Ok(())
}

/// Print queued background-failure alerts. The store already rolled the
/// affected state back; this is the CLI's toast.
fn drain_alerts(alerts: &mut mpsc::UnboundedReceiver<SessionAlert>) {
    while let Ok(alert) = alerts.try_recv() {
        match &alert {
            SessionAlert::ValueSaveFailed {
                metric_id,
                year,
                month,
                message,
                ..
            } => eprintln!(
                "alert: save failed for {metric_id} {year}-{month:02}, value restored: {message}"
            ),
            SessionAlert::ReorderFailed {
                brand_id, message, ..
            } => eprintln!("alert: reorder failed for brand {brand_id}, order resynced: {message}"),
            SessionAlert::LoadFailed { message, .. } => {
                eprintln!("alert: load failed, showing empty data: {message}")
            }
        }
    }
}

// ============================================================================
// Resolution helpers
// ============================================================================

fn resolve_brand(session: &Arc<Session>, query: &str) -> Result<scoreboards::types::Brand, SessionError> {
    session
        .find_brand(query)
        .ok_or_else(|| SessionError::UnknownBrand(query.to_string()))
}

/// Metric names are not unique; a name that matches several metrics needs
/// the id instead.
fn resolve_metric(session: &Arc<Session>, query: &str) -> Result<Metric, SessionError> {
    let mut matches = session.find_metrics(query);
    match matches.len() {
        0 => Err(SessionError::UnknownMetric(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let ids: Vec<String> = matches
                .iter()
                .map(|m| format!("{} (brand {})", m.id, m.brand_id))
                .collect();
            Err(SessionError::InvalidRequest(format!(
                "\"{query}\" matches several metrics, use an id: {}",
                ids.join(", ")
            )))
        }
    }
}

/// The brand restriction for read commands: an explicit argument wins,
/// otherwise the remembered selection. `None` means all brands.
fn brand_scope(
    session: &Arc<Session>,
    arg: Option<&str>,
) -> Result<Option<String>, SessionError> {
    match arg {
        Some(raw) if raw.eq_ignore_ascii_case("all") => Ok(None),
        Some(raw) => Ok(Some(resolve_brand(session, raw)?.id)),
        None => Ok(session.selected_brand()),
    }
}

fn pick_year(session: &Arc<Session>, year: Option<i32>) -> i32 {
    match year {
        Some(y) => y,
        None => {
            let years =
                util::available_years(session.config.start_year, session.config.years_ahead);
            util::default_year(&years, util::current_year())
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_brands(session: &Arc<Session>, select: Option<&str>) -> Result<(), SessionError> {
    if let Some(query) = select {
        if query.eq_ignore_ascii_case("all") {
            session.select_brand(None);
            println!("selection cleared, showing all brands");
        } else {
            let brand = resolve_brand(session, query)?;
            println!("selected {}", brand.name);
            session.select_brand(Some(brand.id));
        }
    }

    let selected = session.selected_brand();
    let brands = session.brand_list();
    if brands.is_empty() {
        println!("no brands yet, create one with: scoreboards add-brand <name>");
        return Ok(());
    }
    for brand in brands {
        let marker = if selected.as_deref() == Some(brand.id.as_str()) {
            "*"
        } else {
            " "
        };
        let count = session.metrics_for(&brand.id).len();
        println!("{marker} {}  {} ({count} metrics)", brand.id, brand.name);
    }
    Ok(())
}

fn cmd_grid(
    session: &Arc<Session>,
    brand: Option<&str>,
    year: Option<i32>,
) -> Result<(), SessionError> {
    let scope = brand_scope(session, brand)?;
    let year = pick_year(session, year);

    let brands = scoreboard::brands_with_metrics(session);
    let visible = scoreboard::visible_metrics(&brands, scope.as_deref());
    if visible.is_empty() {
        println!("no metrics to show for {year}");
        return Ok(());
    }

    let store = session.store.lock();
    let rows = scoreboard::grid(&visible, &store, year);
    drop(store);

    print!("{:<28} {:<10}", "METRIC", "BRAND");
    for label in util::MONTH_LABELS {
        print!(" {label:>9}");
    }
    println!(" {:>11}", "YTD");

    for row in rows {
        let name = if row.first_in_group {
            row.metric.metric.name.clone()
        } else {
            // Grouped duplicates show the name once.
            String::new()
        };
        print!("{:<28} {:<10}", truncated(&name, 28), truncated(&row.metric.brand_name, 10));
        for cell in row.months {
            print!(" {:>9}", util::format_cell(cell));
        }
        println!(" {:>11}", util::format_cell(row.ytd));
    }
    Ok(())
}

async fn cmd_detail(session: &Arc<Session>, metric: &str) -> Result<(), SessionError> {
    let metric = resolve_metric(session, metric)?;
    let detail = queries::load_metric_detail(session, &metric.id).await?;

    println!("{} ({})", detail.metric.name, detail.metric.id);
    if let Some(source) = &detail.metric.data_source {
        println!("source: {source}");
    }
    println!("importance: {}", detail.metric.importance.as_str());

    if detail.years.is_empty() {
        println!("no values recorded");
        return Ok(());
    }

    for series in &detail.years {
        print!("{:>6}", series.year);
        for cell in series.months {
            print!(" {:>9}", util::format_cell(cell));
        }
        println!("  ytd {}", util::format_value(series.ytd));
    }
    if let Some(latest) = &detail.latest {
        println!(
            "latest: {} ({} {})",
            util::format_value(latest.value),
            util::month_label(latest.month),
            latest.year
        );
    }
    if let Some(max) = detail.max {
        println!("max: {}", util::format_value(max));
    }
    if let Some(average) = detail.average {
        println!("average: {}", util::format_value((average * 100.0).round() / 100.0));
    }
    Ok(())
}

async fn cmd_set(
    session: &Arc<Session>,
    metric: &str,
    year: i32,
    month: u32,
    value: &str,
) -> Result<(), SessionError> {
    if !(1..=12).contains(&month) {
        return Err(SessionError::InvalidRequest(format!(
            "month must be 1-12 (got {month})"
        )));
    }
    let metric = resolve_metric(session, metric)?;

    let edit = values_service::edit_value(session, &metric.id, year, month, value)?;
    let Some(pending) = edit.pending else {
        println!("no change");
        return Ok(());
    };

    // One-shot process: wait for the background write before exiting.
    match pending.settled().await {
        WriteOutcome::Persisted => match edit.applied {
            Some(v) => println!(
                "{} {} {} = {}",
                metric.name,
                util::month_label(month),
                year,
                util::format_value(v)
            ),
            None => println!("{} {} {} cleared", metric.name, util::month_label(month), year),
        },
        WriteOutcome::Reverted => println!("save failed, value restored"),
        WriteOutcome::Superseded => println!("superseded by a newer edit"),
    }
    Ok(())
}

async fn cmd_move(
    session: &Arc<Session>,
    metric: &str,
    position: usize,
) -> Result<(), SessionError> {
    if position == 0 {
        return Err(SessionError::InvalidRequest(
            "positions are 1-based".to_string(),
        ));
    }
    let metric = resolve_metric(session, metric)?;

    let ordered = scoreboard::display_sorted(&session.metrics_for(&metric.brand_id));
    let from = ordered
        .iter()
        .position(|m| m.id == metric.id)
        .ok_or_else(|| SessionError::UnknownMetric(metric.id.clone()))?;

    let stuck = metrics_service::reorder_by_move(session, &metric.brand_id, from, position - 1)
        .await?;
    if stuck {
        println!("{} moved to position {position}", metric.name);
    } else {
        println!("reorder rejected, order resynced from the server");
    }
    Ok(())
}

async fn cmd_insight(
    session: &Arc<Session>,
    brand: Option<&str>,
    year: Option<i32>,
) -> Result<(), SessionError> {
    let scope = brand_scope(session, brand)?;
    let year = pick_year(session, year);

    let brands = scoreboard::brands_with_metrics(session);
    let visible = scoreboard::visible_metrics(&brands, scope.as_deref());

    let store = session.store.lock();
    let metrics: Vec<InsightMetric> = visible
        .iter()
        .filter_map(|m| {
            let series = store.metric_years(&m.metric.id)?;
            let mut one_year = std::collections::BTreeMap::new();
            one_year.insert(year, series.get(&year)?.clone());
            Some(InsightMetric::from_series(
                m.metric.name.clone(),
                m.metric.data_source.clone(),
                &one_year,
            ))
        })
        .collect();
    drop(store);

    let provider = OpenAiInsightProvider::from_config(&session.config);
    let started = Instant::now();
    let bullets = provider.generate(&metrics).await;
    latency::observe(latency::Operation::InsightGenerate, started.elapsed());
    if insight::is_failure_fallback(&bullets) {
        latency::mark_degraded(latency::Operation::InsightGenerate);
    }

    for bullet in bullets {
        println!("{bullet}");
    }
    Ok(())
}

fn truncated(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
