use std::{sync::Arc, time::Duration};

use common::LedgerStore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{metrics, state::Clock};

/// Opens a new jackpot window whenever the active one has expired.
pub async fn rollover_once(store: &dyn LedgerStore, clock: &dyn Clock) -> bool {
    match store.rollover_jackpot(clock.now()).await {
        Ok(Some(pool)) => {
            metrics::record_rollover();
            info!(
                "Opened jackpot pool {} (pot {}, ends {})",
                pool.id, pool.pot, pool.end_time
            );
            true
        }
        Ok(None) => false,
        Err(e) => {
            error!("Jackpot rollover failed: {}", e);
            false
        }
    }
}

pub fn spawn(
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            rollover_once(store.as_ref(), clock.as_ref()).await;
        }
    })
}
