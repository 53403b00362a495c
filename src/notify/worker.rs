use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::notify::{NotificationEvent, NotificationPort};
use crate::observability::metrics::Metrics;

pub async fn run_notification_worker(
    port: Arc<dyn NotificationPort>,
    mut rx: mpsc::Receiver<NotificationEvent>,
    events_tx: broadcast::Sender<NotificationEvent>,
    metrics: Metrics,
) {
    info!("notification worker started");

    while let Some(event) = rx.recv().await {
        metrics.notifications_in_queue.dec();

        match port.notify(&event).await {
            Ok(()) => {
                metrics
                    .notifications_total
                    .with_label_values(&["delivered"])
                    .inc();
            }
            Err(err) => {
                metrics
                    .notifications_total
                    .with_label_values(&["failed"])
                    .inc();
                error!(
                    error = %err,
                    kind = ?event.kind,
                    recipient = %event.recipient_email,
                    entity_id = %event.payload.entity_id,
                    "notification delivery failed"
                );
            }
        }

        let _ = events_tx.send(event);
    }

    warn!("notification worker stopped: queue channel closed");
}
