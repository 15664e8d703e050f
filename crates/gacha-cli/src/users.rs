//! Player account command handlers.

use clap::Subcommand;
use gacha_core::PointBalance;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Sub-commands available under `users`.
#[derive(Debug, Subcommand)]
pub enum UsersCommands {
    /// Create a player and print their bearer token
    Create {
        /// Display name
        #[arg(long)]
        name: String,

        /// Initial free points
        #[arg(long, default_value = "0")]
        free: i64,

        /// Initial paid points
        #[arg(long, default_value = "0")]
        paid: i64,
    },
    /// Credit points to a player
    Grant {
        /// User ID
        #[arg(long)]
        user_id: i64,

        #[arg(long, default_value = "0")]
        free: i64,

        #[arg(long, default_value = "0")]
        paid: i64,

        /// Ledger note
        #[arg(long)]
        note: Option<String>,
    },
    /// Show a player's balance and collection
    Show {
        #[arg(long)]
        user_id: i64,
    },
}

/// # Errors
///
/// Returns an error if the amounts are negative or the insert fails.
pub(crate) async fn run_users_create(
    pool: &sqlx::PgPool,
    salt: &str,
    name: &str,
    free: i64,
    paid: i64,
) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("--name must not be blank");
    }
    if free < 0 || paid < 0 {
        anyhow::bail!("initial points must not be negative");
    }

    let token = gacha_core::generate_token(&mut StdRng::from_os_rng());
    let token_hash = gacha_core::hash_token(salt, &token);
    let user = gacha_db::create_user(
        pool,
        name.trim(),
        &token_hash,
        PointBalance::new(free, paid),
    )
    .await?;

    println!("created user {} ({})", user.id, user.display_name);
    println!("token: {token}");
    println!("store the token now; it cannot be recovered");
    Ok(())
}

/// # Errors
///
/// Returns an error if the amounts are invalid, the user does not exist, or
/// the grant transaction fails.
pub(crate) async fn run_users_grant(
    pool: &sqlx::PgPool,
    user_id: i64,
    free: i64,
    paid: i64,
    note: Option<&str>,
) -> anyhow::Result<()> {
    if free < 0 || paid < 0 {
        anyhow::bail!("grant amounts must not be negative");
    }
    if free == 0 && paid == 0 {
        anyhow::bail!("pass --free and/or --paid");
    }

    let user = gacha_db::grant_points(pool, user_id, free, paid, note).await?;
    println!(
        "user {}: free {} / paid {} (total {})",
        user.id,
        user.free_points,
        user.paid_points,
        user.balance().total()
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if the user does not exist or a query fails.
pub(crate) async fn run_users_show(pool: &sqlx::PgPool, user_id: i64) -> anyhow::Result<()> {
    let user = gacha_db::get_user(pool, user_id).await?;
    println!(
        "{} (id {}) level {} | draws {} | free {} / paid {}",
        user.display_name,
        user.id,
        user.level,
        user.total_draws,
        user.free_points,
        user.paid_points
    );

    let cards = gacha_db::list_user_cards(pool, user_id).await?;
    if cards.is_empty() {
        println!("no cards owned");
        return Ok(());
    }
    println!("{:<8}{:<6}{:>5}  NAME", "CARD", "RARITY", "QTY");
    for card in &cards {
        println!(
            "{:<8}{:<6}{:>5}  {}",
            card.card_id, card.rarity, card.quantity, card.name
        );
    }
    Ok(())
}
