//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring notification dispatch job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Every minute, on the minute.
const DISPATCH_SCHEDULE: &str = "0 * * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(pool: PgPool) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_notification_dispatch_job(&scheduler, pool).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the per-minute push-notification dispatch job.
async fn register_notification_dispatch_job(
    scheduler: &JobScheduler,
    pool: PgPool,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(DISPATCH_SCHEDULE, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            dispatch_due_notifications(&pool, Utc::now()).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Flip every due `scheduled` notification to `sent` and log each one.
///
/// Returns the number of notifications dispatched; failures are logged and
/// reported as zero so the next tick retries.
pub(crate) async fn dispatch_due_notifications(pool: &PgPool, now: DateTime<Utc>) -> usize {
    match gacha_db::mark_due_notifications_sent(pool, now).await {
        Ok(sent) => {
            for notification in &sent {
                tracing::info!(
                    notification_id = notification.id,
                    title = %notification.title,
                    scheduled_at = ?notification.scheduled_at,
                    "scheduler: notification dispatched"
                );
            }
            sent.len()
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: notification dispatch failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn dispatch_sends_only_due_notifications(pool: PgPool) {
        let now = Utc::now();
        for (title, offset) in [("due", -5), ("future", 30)] {
            gacha_db::create_notification(
                &pool,
                &gacha_db::NewNotification {
                    title,
                    body: "body",
                    target_url: None,
                    scheduled_at: Some(now + chrono::Duration::minutes(offset)),
                },
            )
            .await
            .expect("create notification");
        }

        assert_eq!(dispatch_due_notifications(&pool, now).await, 1);
        assert_eq!(dispatch_due_notifications(&pool, now).await, 0);
    }
}
