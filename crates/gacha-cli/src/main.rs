mod gacha;
mod users;

use clap::{Parser, Subcommand};

use crate::gacha::GachaCommands;
use crate::users::UsersCommands;

#[derive(Debug, Parser)]
#[command(name = "gacha-cli")]
#[command(about = "Gacha store operations command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect and simulate gacha products
    Gacha {
        #[command(subcommand)]
        command: GachaCommands,
    },
    /// Manage player accounts
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Load cards and products from the catalog file
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = gacha_core::load_app_config()?;
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("gacha-cli ready; run with --help to list commands");
        return Ok(());
    };

    match command {
        Commands::Db { command } => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Ping => {
                    gacha_db::health_check(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = gacha_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
                DbCommands::Seed => run_db_seed(&pool, &config.catalog_path).await?,
            }
        }
        Commands::Gacha { command } => match command {
            GachaCommands::Rates => gacha::run_gacha_rates(&config.rarity_table),
            GachaCommands::Products => gacha::run_gacha_products(&connect(&config).await?).await?,
            GachaCommands::Simulate {
                product,
                count,
                batches,
                seed,
            } => {
                let pool = connect(&config).await?;
                gacha::run_gacha_simulate(
                    &pool,
                    &config.rarity_table,
                    &product,
                    count,
                    batches,
                    seed,
                )
                .await?;
            }
        },
        Commands::Users { command } => {
            let pool = connect(&config).await?;
            match command {
                UsersCommands::Create { name, free, paid } => {
                    users::run_users_create(&pool, &config.token_hash_salt, &name, free, paid)
                        .await?;
                }
                UsersCommands::Grant {
                    user_id,
                    free,
                    paid,
                    note,
                } => users::run_users_grant(&pool, user_id, free, paid, note.as_deref()).await?,
                UsersCommands::Show { user_id } => users::run_users_show(&pool, user_id).await?,
            }
        }
    }

    Ok(())
}

async fn connect(config: &gacha_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool = gacha_db::connect_pool(
        &config.database_url,
        gacha_db::PoolConfig::from_app_config(config),
    )
    .await?;
    Ok(pool)
}

/// Load the catalog YAML and upsert it into the database.
///
/// # Errors
///
/// Returns an error if the catalog is missing or invalid, or if the seed
/// transaction fails.
async fn run_db_seed(pool: &sqlx::PgPool, catalog_path: &std::path::Path) -> anyhow::Result<()> {
    let catalog = gacha_core::load_catalog(catalog_path)?;
    let summary = gacha_db::seed_catalog(pool, &catalog).await?;
    println!(
        "seeded {} card(s), {} product(s), {} pool entr{}",
        summary.cards,
        summary.products,
        summary.pool_entries,
        if summary.pool_entries == 1 { "y" } else { "ies" }
    );
    Ok(())
}
