use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::clock::SharedClock;
use crate::config::Config;
use crate::engine::expiry::ExpiryPolicy;
use crate::engine::negotiation::MatchNegotiationEngine;
use crate::engine::rating::RatingAggregator;
use crate::engine::signing::TlaSigningEngine;
use crate::engine::trip::TripTracker;
use crate::engine::EngineContext;
use crate::notify::{NotificationEvent, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::LeaseStore;

pub struct AppState {
    pub negotiation: MatchNegotiationEngine,
    pub signing: TlaSigningEngine,
    pub trips: TripTracker,
    pub ratings: RatingAggregator,
    pub clock: SharedClock,
    pub events_tx: broadcast::Sender<NotificationEvent>,
    pub metrics: Metrics,
}

impl AppState {
    /// Builds the engines around `store` and `clock`. The returned receiver
    /// feeds the notification worker.
    pub fn new(
        store: Arc<dyn LeaseStore>,
        clock: SharedClock,
        config: &Config,
    ) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let metrics = Metrics::new();
        let (notifier, notification_rx) =
            Notifier::new(config.notification_queue_size, metrics.clone());
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        let ctx = EngineContext {
            store,
            clock: clock.clone(),
            notifier,
            metrics: metrics.clone(),
            expiry: ExpiryPolicy::from_hours(config.match_expiry_hours),
            op_timeout: config.operation_timeout(),
        };

        (
            Self {
                negotiation: MatchNegotiationEngine::new(ctx.clone()),
                signing: TlaSigningEngine::new(ctx.clone()),
                trips: TripTracker::new(ctx.clone()),
                ratings: RatingAggregator::new(ctx),
                clock,
                events_tx,
                metrics,
            },
            notification_rx,
        )
    }
}
