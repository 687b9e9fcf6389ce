//! Re-densify metric sort orders across every brand.
//!
//! Rows created before reordering existed carry no sort_order; a failed
//! reorder can also leave gaps. This walks each brand, sorts its metrics
//! the way the grid displays them (sort_order ascending, None last,
//! creation order breaking ties), and persists a dense 1..N renumber.
//! Brands already dense are skipped, so repeated runs write nothing.
//!
//! Usage: `cargo run --bin resequence_sort_orders [-- --dry-run]`

use std::sync::Arc;

use clap::Parser;

use scoreboards::services::scoreboard::display_sorted;
use scoreboards::state::load_config;
use scoreboards::supabase::{BrandDirectory, MetricRegistry, SupabaseClient, SupabaseError};

#[derive(Parser)]
#[command(
    name = "resequence_sort_orders",
    about = "Renumber metric sort orders to a dense 1..N per brand"
)]
struct Cli {
    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli.dry_run).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(dry_run: bool) -> Result<(), String> {
    let config = load_config()?;
    let client = Arc::new(SupabaseClient::from_config(&config).map_err(|e| e.to_string())?);

    let brands = client.list_brands().await.map_err(|e| e.to_string())?;
    log::info!("checking {} brands", brands.len());

    let mut renumbered = 0usize;
    for brand in &brands {
        match resequence_brand(client.as_ref(), &brand.id, dry_run).await {
            Ok(true) => {
                println!("{} ({}): renumbered", brand.name, brand.id);
                renumbered += 1;
            }
            Ok(false) => log::debug!("{} already dense, skipped", brand.name),
            // One broken brand must not stop the sweep.
            Err(e) => eprintln!("{} ({}): failed, skipping: {e}", brand.name, brand.id),
        }
    }

    println!(
        "{renumbered} of {} brands {}",
        brands.len(),
        if dry_run { "would change" } else { "renumbered" }
    );
    Ok(())
}

/// Returns whether the brand needed (or would need) a renumber.
async fn resequence_brand(
    client: &SupabaseClient,
    brand_id: &str,
    dry_run: bool,
) -> Result<bool, SupabaseError> {
    let metrics = client.list_metrics(brand_id).await?;
    let ordered = display_sorted(&metrics);

    let dense = ordered
        .iter()
        .enumerate()
        .all(|(i, m)| m.sort_order == Some(i as i64 + 1));
    if dense {
        return Ok(false);
    }

    if !dry_run {
        let ids: Vec<String> = ordered.iter().map(|m| m.id.clone()).collect();
        client.reorder_metrics(brand_id, &ids).await?;
    }
    Ok(true)
}
