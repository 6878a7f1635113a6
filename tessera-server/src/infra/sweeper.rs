use std::{sync::Arc, time::Duration};

use tessera_core::auth::RefreshTokenStore;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Spawn the periodic expiry sweep over `store`.
///
/// Returns `None` when `every` is zero. Aborting the handle stops the sweep.
pub fn spawn_token_sweeper(
    store: Arc<dyn RefreshTokenStore>,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!("refresh token sweep disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first sweep
        // happens one period after startup.
        interval.tick().await;

        loop {
            interval.tick().await;
            sweep_once(store.as_ref()).await;
        }
    }))
}

pub async fn sweep_once(store: &dyn RefreshTokenStore) -> u64 {
    match store.delete_expired().await {
        Ok(0) => {
            debug!("no expired refresh tokens to sweep");
            0
        }
        Ok(removed) => {
            info!(removed, "swept expired refresh tokens");
            removed
        }
        Err(err) => {
            warn!(error = %err.detailed(), "refresh token sweep failed");
            0
        }
    }
}
