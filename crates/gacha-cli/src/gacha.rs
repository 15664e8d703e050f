//! Gacha inspection command handlers: the configured rate table, the live
//! product list, and offline Monte Carlo runs against a product's pool.

use clap::Subcommand;
use gacha_core::{DrawCount, Rarity, RarityTable};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Sub-commands available under `gacha`.
#[derive(Debug, Subcommand)]
pub enum GachaCommands {
    /// Print the configured rarity rates and the 10-draw guarantee table
    Rates,
    /// List products currently open for draws
    Products,
    /// Run repeated draws against a product's pool without touching balances
    Simulate {
        /// Product slug
        #[arg(long)]
        product: String,

        /// Cards per batch (1 or 10)
        #[arg(long, default_value = "10", value_parser = parse_draw_count)]
        count: DrawCount,

        /// Number of batches to run
        #[arg(long, default_value = "10000")]
        batches: u64,

        /// Fixed RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub(crate) fn parse_draw_count(raw: &str) -> Result<DrawCount, String> {
    let value: u32 = raw.parse().map_err(|e| format!("{e}"))?;
    DrawCount::try_from(value).map_err(|e| e.to_string())
}

pub(crate) fn run_gacha_rates(table: &RarityTable) {
    let guaranteed = RarityTable::guaranteed();
    println!("{:<8}{:>10}{:>14}", "RARITY", "RATE", "10-DRAW SLOT");
    for (rarity, rate) in table.entries() {
        println!(
            "{:<8}{:>9.2}%{:>13.2}%",
            rarity,
            rate,
            guaranteed.rate(rarity)
        );
    }
    println!(
        "SSR results are pickup cards {:.0}% of the time when the pool has one",
        gacha_core::PICKUP_RATE * 100.0
    );
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_gacha_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = gacha_db::list_active_products(pool).await?;
    if products.is_empty() {
        println!("no products open; run `db seed` or create one via the admin API");
        return Ok(());
    }

    println!(
        "{:<6}{:<28}{:>8}{:>6}{:>5}{:>5}{:>5}{:>5}",
        "ID", "SLUG", "COST", "POOL", "N", "R", "SR", "SSR"
    );
    for p in &products {
        println!(
            "{:<6}{:<28}{:>8}{:>6}{:>5}{:>5}{:>5}{:>5}",
            p.id,
            p.slug,
            p.cost_per_draw,
            p.pool_size,
            p.n_count,
            p.r_count,
            p.sr_count,
            p.ssr_count
        );
    }
    Ok(())
}

/// Simulate `batches` draws of `count` cards against a product's pool and
/// print observed rates next to the configured ones.
///
/// # Errors
///
/// Returns an error if the product does not exist, its pool is empty, or the
/// database query fails.
pub(crate) async fn run_gacha_simulate(
    pool: &sqlx::PgPool,
    table: &RarityTable,
    product_slug: &str,
    count: DrawCount,
    batches: u64,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let product = gacha_db::get_product_by_slug(pool, product_slug)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product '{product_slug}' not found"))?;
    let rows = gacha_db::list_pool_cards(pool, product.id).await?;
    let draw_pool = gacha_db::load_draw_pool(&rows)?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let report = gacha_core::simulate(&draw_pool, count, table, batches, &mut rng)?;

    tracing::info!(
        product = %product.slug,
        batches = report.batches,
        cards = report.cards,
        "simulation complete"
    );

    println!(
        "{} ({} batch(es) x {} card(s), {} total)",
        product.name,
        report.batches,
        count.get(),
        report.cards
    );
    println!("{:<8}{:>10}{:>12}{:>12}", "RARITY", "COUNT", "OBSERVED", "BASE");
    for rarity in Rarity::ALL.iter().rev() {
        println!(
            "{:<8}{:>10}{:>11.3}%{:>11.2}%",
            rarity,
            report.count(*rarity),
            report.observed_rate(*rarity),
            table.rate(*rarity)
        );
    }
    println!("pickup cards:          {}", report.pickup);
    println!("guaranteed slots:      {}", report.guaranteed);
    println!("batches without SR+:   {}", report.batches_without_sr_plus);

    Ok(())
}
