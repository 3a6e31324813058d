//! Background reconciliation worker
//!
//! Uploads that stored an object but failed to record it, and image deletes
//! that dropped the reference but not the object, leave unreferenced objects
//! in blob storage. This worker periodically removes those that are older
//! than a grace period, so uploads still in flight are never touched.

use crate::config::ReconcileConfig;
use crate::service::gallery_service::GalleryService;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, info};
use tokio::time;

/// Background reconciliation worker
pub struct ReconcileWorker {
    service: Arc<GalleryService>,
    interval: Duration,
    grace_period: chrono::Duration,
}

impl ReconcileWorker {
    pub fn new(service: Arc<GalleryService>, config: &ReconcileConfig) -> Self {
        Self {
            service,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            grace_period: chrono::Duration::seconds(config.grace_period_secs as i64),
        }
    }

    /// Start the worker as a background task (non-blocking)
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting reconcile worker with {}s interval and {}s grace period",
            self.interval.as_secs(),
            self.grace_period.num_seconds()
        );

        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            // The first tick completes immediately; skip it so startup is not a full scan
            interval.tick().await;

            loop {
                interval.tick().await;
                self.run_once();
            }
        })
    }

    /// Run a single reconciliation pass, logging the outcome
    pub fn run_once(&self) {
        match self.service.reconcile(self.grace_period) {
            Ok(report) if report.orphans_removed > 0 => info!(
                "Reconcile pass removed {} unreferenced objects ({} scanned, {} pending)",
                report.orphans_removed, report.objects_scanned, report.orphans_pending
            ),
            Ok(report) => debug!(
                "Reconcile pass found nothing to remove ({} scanned, {} pending)",
                report.objects_scanned, report.orphans_pending
            ),
            Err(e) => error!("Reconcile pass failed: {}", e),
        }
    }
}
