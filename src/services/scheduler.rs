// SPDX-License-Identifier: MIT

//! Background jobs on fixed intervals. Every job logs its outcome and
//! swallows its errors; a failed cycle just waits for the next tick.

use std::time::Duration as StdDuration;

use crate::db::Store;
use crate::services::{SyncEngine, WhoopService};
use crate::time_utils;

/// Sync and proactive-refresh cadence.
const SYNC_INTERVAL_SECS: u64 = 30 * 60;

/// Conversation retention sweep cadence.
const CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Refresh tokens expiring within this many minutes.
const REFRESH_HORIZON_MINUTES: i64 = 10;

/// Conversation rows older than this many days are purged.
const CONVERSATION_RETENTION_DAYS: i64 = 7;

pub struct Scheduler {
    sync: SyncEngine,
    whoop: WhoopService,
    store: Store,
}

impl Scheduler {
    pub fn new(sync: SyncEngine, whoop: WhoopService, store: Store) -> Self {
        Self { sync, whoop, store }
    }

    /// Spawn all background jobs. The first tick of each interval fires
    /// immediately, so a restart catches up without waiting a full period.
    pub fn spawn(self) {
        let sync_engine = self.sync.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(SYNC_INTERVAL_SECS));
            loop {
                interval.tick().await;
                if let Err(e) = sync_engine.run_whoop_cycle().await {
                    tracing::error!(error = %e, "Wearable sync cycle failed");
                }
            }
        });

        let sync_engine = self.sync.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(SYNC_INTERVAL_SECS));
            loop {
                interval.tick().await;
                if let Err(e) = sync_engine.run_diary_cycle().await {
                    tracing::error!(error = %e, "Diary sync cycle failed");
                }
            }
        });

        let whoop = self.whoop.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(SYNC_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match whoop.refresh_expiring(REFRESH_HORIZON_MINUTES).await {
                    Ok(refreshed) if refreshed > 0 => {
                        tracing::info!(refreshed, "Proactively refreshed expiring tokens");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Proactive refresh sweep failed"),
                }
            }
        });

        let store = self.store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let cutoff = time_utils::days_ago(chrono::Utc::now(), CONVERSATION_RETENTION_DAYS);
                match store.purge_conversations(&cutoff).await {
                    Ok(purged) if purged > 0 => {
                        tracing::info!(purged, "Purged old conversation messages");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Conversation purge failed"),
                }
            }
        });

        tracing::info!("Background jobs scheduled");
    }
}
