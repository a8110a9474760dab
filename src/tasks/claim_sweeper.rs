use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::redemptions::{Clock, RedemptionStore};
use crate::observability::metrics::record_claims_expired;

/// Starts the cron job that moves stale issued claims to expired.
///
/// Redeem already refuses expired claims on its own; the sweep keeps stored
/// statuses accurate and frees their manual codes.
pub async fn start_claim_sweeper(
    store: Arc<dyn RedemptionStore>,
    clock: Arc<dyn Clock>,
    schedule: &str,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let store = Arc::clone(&store);
        let clock = Arc::clone(&clock);

        Box::pin(async move {
            sweep_once(store.as_ref(), clock.as_ref()).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!("✅ Claim sweeper scheduled ({})", schedule);
    Ok(scheduler)
}

/// One sweep pass. Returns how many claims were expired.
pub async fn sweep_once(store: &dyn RedemptionStore, clock: &dyn Clock) -> u64 {
    match store.expire_stale_claims(clock.now()).await {
        Ok(0) => 0,
        Ok(expired) => {
            record_claims_expired(expired);
            tracing::info!(expired, "🧹 Expired stale claims");
            expired
        }
        Err(e) => {
            tracing::error!("Claim sweep failed: {}", e);
            0
        }
    }
}
