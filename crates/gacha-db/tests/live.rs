//! Live integration tests for gacha-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/gacha-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{Duration, Utc};
use gacha_core::{
    parse_catalog, DrawCount, NotificationStatus, PointBalance, RankingMetric, RankingPeriod,
    RankingSettings, Rarity, RarityTable, ShipmentLine, ShipmentStatus,
};
use gacha_db::{
    cancel_notification, create_announcement, create_card, create_notification, create_product,
    create_shipment, create_user, execute_draw, get_ranking_settings, get_user, grant_points,
    list_active_products, list_published_announcements, list_ranking, list_results_for_user,
    list_sent_notifications, list_shipment_items, list_transactions, list_user_cards,
    mark_due_notifications_sent, seed_catalog, update_announcement, update_notification,
    update_ranking_settings, update_shipment_status, upsert_pool_card, AnnouncementPatch, DbError,
    DrawRequest, NewCard, NewNotification, NewProduct, NewShipment, NotificationPatch,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_user(pool: &sqlx::PgPool, name: &str, free: i64, paid: i64) -> i64 {
    create_user(
        pool,
        name,
        &format!("hash-{name}"),
        PointBalance::new(free, paid),
    )
    .await
    .unwrap_or_else(|e| panic!("create_user failed for '{name}': {e}"))
    .id
}

/// Creates a 100-point product whose pool holds one card of each rarity.
async fn insert_product(pool: &sqlx::PgPool, slug: &str) -> (i64, Vec<i64>) {
    let product = create_product(
        pool,
        &NewProduct {
            slug,
            name: &format!("Product {slug}"),
            description: None,
            cost_per_draw: 100,
            starts_at: None,
            ends_at: None,
        },
    )
    .await
    .expect("create_product failed");

    let mut card_ids = Vec::new();
    for rarity in Rarity::ALL {
        let card = create_card(
            pool,
            &NewCard {
                name: &format!("{slug}-{rarity}"),
                rarity,
                image_url: None,
                description: None,
            },
        )
        .await
        .expect("create_card failed");
        upsert_pool_card(pool, product.id, card.id, rarity == Rarity::SSR)
            .await
            .expect("upsert_pool_card failed");
        card_ids.push(card.id);
    }

    (product.id, card_ids)
}

async fn count_rows(pool: &sqlx::PgPool, table: &str, user_id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE user_id = $1"))
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("count query failed")
}

fn request(user_id: i64, product_id: i64, count: DrawCount) -> DrawRequest<'static> {
    DrawRequest {
        user_id,
        product_id,
        count,
        idempotency_key: None,
    }
}

// ---------------------------------------------------------------------------
// Section 1: Draw execution
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn ten_draw_persists_results_cards_and_ledger(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "drawer", 500, 1_000).await;
    let (product_id, _) = insert_product(&pool, "ten-draw").await;
    let mut rng = StdRng::seed_from_u64(7);

    let outcome = execute_draw(
        &pool,
        request(user_id, product_id, DrawCount::Ten),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect("execute_draw failed");

    assert_eq!(outcome.cards.len(), 10);
    assert_eq!(outcome.cost, 1_000);
    assert_eq!(outcome.balance, PointBalance::new(0, 500));
    assert!(
        outcome.cards.iter().any(|c| c.rarity == "SR" || c.rarity == "SSR"),
        "a ten-draw always contains SR or better"
    );

    let user = get_user(&pool, user_id).await.expect("get_user failed");
    assert_eq!(user.free_points, 0);
    assert_eq!(user.paid_points, 500);
    assert_eq!(user.total_draws, 10);
    assert_eq!(user.level, 2);

    assert_eq!(count_rows(&pool, "gacha_results", user_id).await, 10);

    let owned: i32 = list_user_cards(&pool, user_id)
        .await
        .expect("list_user_cards failed")
        .iter()
        .map(|c| c.quantity)
        .sum();
    assert_eq!(owned, 10);

    let ledger = list_transactions(&pool, user_id, 10)
        .await
        .expect("list_transactions failed");
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind, "gacha");
    assert_eq!(ledger[0].free_delta, -500);
    assert_eq!(ledger[0].paid_delta, -500);
    assert_eq!(ledger[0].balance_after, 500);
    assert_eq!(ledger[0].draw_batch_id, Some(outcome.batch_id));

    let history = list_results_for_user(&pool, user_id, 50)
        .await
        .expect("list_results_for_user failed");
    assert_eq!(history.len(), 10);
    assert!(history.iter().all(|r| r.draw_batch_id == outcome.batch_id));
}

#[sqlx::test(migrations = "../../migrations")]
async fn insufficient_points_leaves_no_side_effects(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "broke", 50, 40).await;
    let (product_id, _) = insert_product(&pool, "too-expensive").await;
    let mut rng = StdRng::seed_from_u64(1);

    let err = execute_draw(
        &pool,
        request(user_id, product_id, DrawCount::Single),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect_err("draw should fail");

    assert!(matches!(
        err,
        DbError::InsufficientPoints {
            required: 100,
            available: 90
        }
    ));

    let user = get_user(&pool, user_id).await.expect("get_user failed");
    assert_eq!(user.balance(), PointBalance::new(50, 40));
    assert_eq!(user.total_draws, 0);
    assert_eq!(count_rows(&pool, "gacha_results", user_id).await, 0);
    assert_eq!(count_rows(&pool, "user_cards", user_id).await, 0);
    assert_eq!(count_rows(&pool, "transactions", user_id).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_draws_cannot_overspend(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "racer", 100, 0).await;
    let (product_id, _) = insert_product(&pool, "race").await;
    let table = RarityTable::default();
    let mut rng_a = StdRng::seed_from_u64(11);
    let mut rng_b = StdRng::seed_from_u64(12);

    let (a, b) = tokio::join!(
        execute_draw(
            &pool,
            request(user_id, product_id, DrawCount::Single),
            &table,
            &mut rng_a,
        ),
        execute_draw(
            &pool,
            request(user_id, product_id, DrawCount::Single),
            &table,
            &mut rng_b,
        ),
    );

    let results = [a, b];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(DbError::InsufficientPoints { .. })))
        .count();
    assert_eq!(succeeded, 1, "exactly one draw may spend the balance");
    assert_eq!(rejected, 1, "the other draw must see the spent balance");

    let user = get_user(&pool, user_id).await.expect("get_user failed");
    assert_eq!(user.balance().total(), 0);
    assert_eq!(user.total_draws, 1);
    assert_eq!(count_rows(&pool, "gacha_results", user_id).await, 1);

    let gacha_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND kind = 'gacha'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .expect("count query failed");
    assert_eq!(gacha_rows, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn drawing_an_owned_card_increments_quantity(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "collector", 10_000, 0).await;
    let product = create_product(
        &pool,
        &NewProduct {
            slug: "single-card",
            name: "Single Card",
            description: None,
            cost_per_draw: 10,
            starts_at: None,
            ends_at: None,
        },
    )
    .await
    .expect("create_product failed");
    let card = create_card(
        &pool,
        &NewCard {
            name: "Only Card",
            rarity: Rarity::N,
            image_url: None,
            description: None,
        },
    )
    .await
    .expect("create_card failed");
    upsert_pool_card(&pool, product.id, card.id, false)
        .await
        .expect("upsert_pool_card failed");

    let mut rng = StdRng::seed_from_u64(3);
    let first = execute_draw(
        &pool,
        request(user_id, product.id, DrawCount::Single),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect("first draw failed");
    assert!(first.cards[0].is_new);

    let second = execute_draw(
        &pool,
        request(user_id, product.id, DrawCount::Single),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect("second draw failed");
    assert!(!second.cards[0].is_new);

    let owned = list_user_cards(&pool, user_id)
        .await
        .expect("list_user_cards failed");
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].card_id, card.id);
    assert_eq!(owned[0].quantity, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn replayed_idempotency_key_is_rejected(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "retrier", 1_000, 0).await;
    let (product_id, _) = insert_product(&pool, "idempotent").await;
    let mut rng = StdRng::seed_from_u64(11);
    let req = DrawRequest {
        user_id,
        product_id,
        count: DrawCount::Single,
        idempotency_key: Some("req-123"),
    };

    execute_draw(&pool, req, &RarityTable::default(), &mut rng)
        .await
        .expect("first draw failed");
    let err = execute_draw(&pool, req, &RarityTable::default(), &mut rng)
        .await
        .expect_err("replay should fail");

    assert!(matches!(err, DbError::DuplicateRequest(ref key) if key == "req-123"));
    let user = get_user(&pool, user_id).await.expect("get_user failed");
    assert_eq!(user.free_points, 900);
}

#[sqlx::test(migrations = "../../migrations")]
async fn draw_from_closed_product_is_not_found(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "late", 1_000, 0).await;
    let product = create_product(
        &pool,
        &NewProduct {
            slug: "expired",
            name: "Expired",
            description: None,
            cost_per_draw: 100,
            starts_at: Some(Utc::now() - Duration::days(10)),
            ends_at: Some(Utc::now() - Duration::days(1)),
        },
    )
    .await
    .expect("create_product failed");
    let mut rng = StdRng::seed_from_u64(5);

    let err = execute_draw(
        &pool,
        request(user_id, product.id, DrawCount::Single),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect_err("closed product");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn grant_points_writes_ledger_row(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "granted", 0, 0).await;

    let user = grant_points(&pool, user_id, 300, 700, Some("launch bonus"))
        .await
        .expect("grant_points failed");
    assert_eq!(user.balance(), PointBalance::new(300, 700));

    let ledger = list_transactions(&pool, user_id, 10)
        .await
        .expect("list_transactions failed");
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind, "grant");
    assert_eq!(ledger[0].balance_after, 1_000);
    assert_eq!(ledger[0].note.as_deref(), Some("launch bonus"));
}

// ---------------------------------------------------------------------------
// Section 2: Catalog
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn seed_catalog_is_idempotent(pool: sqlx::PgPool) {
    let catalog = parse_catalog(
        r"
cards:
  - name: Star Knight
    rarity: SSR
  - name: Moon Archer
    rarity: SR
  - name: Field Scout
    rarity: N
products:
  - name: Launch Pack
    cost_per_draw: 300
    pool:
      - card: Star Knight
        pickup: true
      - card: Moon Archer
      - card: Field Scout
",
    )
    .expect("catalog parses");

    let first = seed_catalog(&pool, &catalog).await.expect("first seed failed");
    let second = seed_catalog(&pool, &catalog).await.expect("second seed failed");
    assert_eq!(first, second);
    assert_eq!(first.cards, 3);
    assert_eq!(first.pool_entries, 3);

    let products = list_active_products(&pool)
        .await
        .expect("list_active_products failed");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].slug, "launch-pack");
    assert_eq!(products[0].pool_size, 3);
    assert_eq!(products[0].ssr_count, 1);
    assert_eq!(products[0].pickup_count, 1);
}

// ---------------------------------------------------------------------------
// Section 3: Shipments
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn shipment_moves_cards_out_and_cancel_returns_them(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "shipper", 10_000, 0).await;
    let (product_id, _) = insert_product(&pool, "ship").await;
    let mut rng = StdRng::seed_from_u64(21);
    execute_draw(
        &pool,
        request(user_id, product_id, DrawCount::Ten),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect("execute_draw failed");

    let owned = list_user_cards(&pool, user_id)
        .await
        .expect("list_user_cards failed");
    let target = &owned[0];

    let shipment = create_shipment(
        &pool,
        &NewShipment {
            user_id,
            recipient_name: "Test Recipient",
            postal_code: "100-0001",
            address: "1-1 Chiyoda, Tokyo",
            phone: None,
            lines: vec![ShipmentLine {
                card_id: target.card_id,
                quantity: target.quantity,
            }],
        },
    )
    .await
    .expect("create_shipment failed");
    assert_eq!(shipment.status, "pending");

    let items = list_shipment_items(&pool, &[shipment.id])
        .await
        .expect("list_shipment_items failed");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, target.quantity);

    let after_request = list_user_cards(&pool, user_id)
        .await
        .expect("list_user_cards failed");
    assert!(after_request.iter().all(|c| c.card_id != target.card_id));

    let cancelled = update_shipment_status(&pool, shipment.id, ShipmentStatus::Cancelled, None)
        .await
        .expect("cancel failed");
    assert_eq!(cancelled.status, "cancelled");

    let restored = list_user_cards(&pool, user_id)
        .await
        .expect("list_user_cards failed");
    let card = restored
        .iter()
        .find(|c| c.card_id == target.card_id)
        .expect("card returned to collection");
    assert_eq!(card.quantity, target.quantity);
}

#[sqlx::test(migrations = "../../migrations")]
async fn shipment_rejects_more_copies_than_owned(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "greedy", 1_000, 0).await;
    let (_, card_ids) = insert_product(&pool, "greedy").await;

    let err = create_shipment(
        &pool,
        &NewShipment {
            user_id,
            recipient_name: "Recipient",
            postal_code: "100-0001",
            address: "Tokyo",
            phone: None,
            lines: vec![ShipmentLine {
                card_id: card_ids[0],
                quantity: 1,
            }],
        },
    )
    .await
    .expect_err("user owns nothing");

    assert!(matches!(err, DbError::InsufficientCards { card_id } if card_id == card_ids[0]));
    assert_eq!(count_rows(&pool, "shipments", user_id).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn shipped_requires_processing_and_tracking(pool: sqlx::PgPool) {
    let user_id = insert_user(&pool, "tracked", 1_000, 0).await;
    let (product_id, _) = insert_product(&pool, "tracked").await;
    let mut rng = StdRng::seed_from_u64(2);
    let outcome = execute_draw(
        &pool,
        request(user_id, product_id, DrawCount::Single),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect("execute_draw failed");

    let shipment = create_shipment(
        &pool,
        &NewShipment {
            user_id,
            recipient_name: "Recipient",
            postal_code: "100-0001",
            address: "Tokyo",
            phone: Some("03-0000-0000"),
            lines: vec![ShipmentLine {
                card_id: outcome.cards[0].card_id,
                quantity: 1,
            }],
        },
    )
    .await
    .expect("create_shipment failed");

    let skipped = update_shipment_status(&pool, shipment.id, ShipmentStatus::Shipped, Some("JP1"))
        .await
        .expect_err("pending cannot jump to shipped");
    assert!(matches!(skipped, DbError::Core(_)));

    update_shipment_status(&pool, shipment.id, ShipmentStatus::Processing, None)
        .await
        .expect("processing failed");
    let missing = update_shipment_status(&pool, shipment.id, ShipmentStatus::Shipped, None)
        .await
        .expect_err("tracking required");
    assert!(matches!(missing, DbError::Core(_)));

    let shipped = update_shipment_status(&pool, shipment.id, ShipmentStatus::Shipped, Some("JP1"))
        .await
        .expect("shipped failed");
    assert_eq!(shipped.tracking_number.as_deref(), Some("JP1"));
    assert!(shipped.shipped_at.is_some());
}

// ---------------------------------------------------------------------------
// Section 4: Announcements, notifications, rankings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn publishing_an_announcement_stamps_published_at(pool: sqlx::PgPool) {
    let draft = create_announcement(&pool, "Maintenance", "Tonight 2am", false)
        .await
        .expect("create_announcement failed");
    assert!(draft.published_at.is_none());
    assert!(list_published_announcements(&pool, 10)
        .await
        .expect("list failed")
        .is_empty());

    let published = update_announcement(
        &pool,
        draft.id,
        &AnnouncementPatch {
            is_published: Some(true),
            ..AnnouncementPatch::default()
        },
    )
    .await
    .expect("update_announcement failed");
    assert!(published.published_at.is_some());

    let public = list_published_announcements(&pool, 10)
        .await
        .expect("list failed");
    assert_eq!(public.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn due_notifications_are_marked_sent(pool: sqlx::PgPool) {
    let now = Utc::now();
    let due = create_notification(
        &pool,
        &NewNotification {
            title: "New pack",
            body: "Launch Pack is live",
            target_url: None,
            scheduled_at: Some(now - Duration::minutes(1)),
        },
    )
    .await
    .expect("create due failed");
    let later = create_notification(
        &pool,
        &NewNotification {
            title: "Tomorrow",
            body: "Coming soon",
            target_url: None,
            scheduled_at: Some(now + Duration::hours(1)),
        },
    )
    .await
    .expect("create later failed");

    let sent = mark_due_notifications_sent(&pool, now)
        .await
        .expect("mark_due_notifications_sent failed");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, due.id);
    assert_eq!(sent[0].status, NotificationStatus::Sent.as_str());

    let inbox = list_sent_notifications(&pool, 10).await.expect("inbox failed");
    assert_eq!(inbox.len(), 1);

    let err = update_notification(
        &pool,
        due.id,
        &NotificationPatch {
            title: Some("edited"),
            ..NotificationPatch::default()
        },
    )
    .await
    .expect_err("sent notifications are frozen");
    assert!(matches!(err, DbError::NotEditable { .. }));

    let cancelled = cancel_notification(&pool, later.id)
        .await
        .expect("cancel failed");
    assert_eq!(cancelled.status, "cancelled");
}

#[sqlx::test(migrations = "../../migrations")]
async fn ranking_orders_users_by_draw_count(pool: sqlx::PgPool) {
    let heavy = insert_user(&pool, "heavy", 10_000, 0).await;
    let light = insert_user(&pool, "light", 10_000, 0).await;
    let (product_id, _) = insert_product(&pool, "ranked").await;
    let mut rng = StdRng::seed_from_u64(99);

    execute_draw(
        &pool,
        request(heavy, product_id, DrawCount::Ten),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect("heavy draw failed");
    execute_draw(
        &pool,
        request(light, product_id, DrawCount::Single),
        &RarityTable::default(),
        &mut rng,
    )
    .await
    .expect("light draw failed");

    let settings = RankingSettings {
        is_enabled: true,
        period: RankingPeriod::AllTime,
        metric: RankingMetric::Draws,
        top_n: 5,
    };
    update_ranking_settings(&pool, &settings)
        .await
        .expect("update_ranking_settings failed");
    assert_eq!(
        get_ranking_settings(&pool).await.expect("get settings"),
        settings
    );

    let ranking = list_ranking(&pool, &settings, Utc::now() + Duration::seconds(1))
        .await
        .expect("list_ranking failed");
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].user_id, heavy);
    assert_eq!(ranking[0].score, 10);
    assert_eq!(ranking[0].rank, 1);
    assert_eq!(ranking[1].user_id, light);
    assert_eq!(ranking[1].score, 1);

    let spent = list_ranking(
        &pool,
        &RankingSettings {
            metric: RankingMetric::PointsSpent,
            ..settings
        },
        Utc::now() + Duration::seconds(1),
    )
    .await
    .expect("points ranking failed");
    assert_eq!(spent[0].score, 1_000);
}

#[sqlx::test(migrations = "../../migrations")]
async fn ranking_settings_reject_out_of_range_top_n(pool: sqlx::PgPool) {
    let err = update_ranking_settings(
        &pool,
        &RankingSettings {
            top_n: 0,
            ..RankingSettings::default()
        },
    )
    .await
    .expect_err("top_n 0 is invalid");
    assert!(matches!(err, DbError::Core(_)));
}
