use chrono::Duration;
use edupay_engine::{db_types::DepositTransaction, events::EventProducers, DepositFlowApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the deposit sweeper. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `sweep_interval_secs` the sweeper closes pending deposits whose claim window has lapsed.
/// Each closed deposit fires the `deposit_closed` hook, which is how subscribers watching the
/// payment room learn that their transfer never arrived.
pub fn start_sweeper(
    db: SqliteDatabase,
    producers: EventProducers,
    claim_window: Duration,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(sweep_interval_secs));
        let api = DepositFlowApi::new(db, producers);
        info!("🕰️ Deposit expiry sweeper started with a claim window of {} hours", claim_window.num_hours());
        loop {
            timer.tick().await;
            debug!("🕰️ Running deposit expiry sweep");
            match api.expire_old_deposits(claim_window).await {
                Ok(expired) => {
                    if !expired.is_empty() {
                        info!("🕰️ {} deposits expired", expired.len());
                        debug!("🕰️ Expired deposits: {}", deposit_list(&expired));
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running deposit expiry sweep: {e}");
                },
            }
        }
    })
}

fn deposit_list(deposits: &[DepositTransaction]) -> String {
    deposits
        .iter()
        .map(|d| format!("[{}] code: {} user: {}", d.id, d.settlement_code, d.user_id))
        .collect::<Vec<String>>()
        .join(", ")
}
