//! Fire-and-forget notification side channel.
//!
//! Engines hand events to a [`Notifier`], which only ever enqueues. Delivery
//! happens on the worker in [`worker`], so a slow or failing channel can
//! never block or fail a state transition.

pub mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::fleet::PartyContact;
use crate::observability::metrics::Metrics;

pub use worker::run_notification_worker;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MatchProposed,
    MatchCountered,
    MatchAccepted,
    MatchDeclined,
    MatchCancelled,
    MatchExpired,
    TlaGenerated,
    TlaSignatureRequested,
    TlaSigned,
    TlaVoided,
    TripStarted,
    TripCompleted,
    DriverRated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Match,
    Tla,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub entity: EntityKind,
    pub entity_id: Uuid,
    pub from: Option<String>,
    pub to: String,
    pub actor_id: Option<Uuid>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub recipient_email: String,
    pub recipient_name: String,
    pub payload: TransitionPayload,
}

impl NotificationEvent {
    pub fn to(recipient: &PartyContact, kind: EventKind, payload: TransitionPayload) -> Self {
        Self {
            kind,
            recipient_email: recipient.email.clone(),
            recipient_name: recipient.name.clone(),
            payload,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Outbound delivery channel (email, push, ...). Implemented outside the
/// engine; only "queued" is ever awaited.
#[async_trait]
pub trait NotificationPort: Send + Sync + 'static {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Default port: logs what would have been delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationPort;

#[async_trait]
impl NotificationPort for LogNotificationPort {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(
            kind = ?event.kind,
            recipient = %event.recipient_email,
            entity_id = %event.payload.entity_id,
            to = %event.payload.to,
            "notification delivered"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotificationEvent>,
    metrics: Metrics,
}

impl Notifier {
    pub fn new(capacity: usize, metrics: Metrics) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, metrics }, rx)
    }

    /// Enqueue without waiting. A full or closed queue is logged and counted.
    pub fn emit(&self, event: NotificationEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics.notifications_in_queue.inc();
                self.metrics
                    .notifications_total
                    .with_label_values(&["queued"])
                    .inc();
            }
            Err(TrySendError::Full(event)) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc();
                warn!(
                    kind = ?event.kind,
                    entity_id = %event.payload.entity_id,
                    "notification queue full; event dropped"
                );
            }
            Err(TrySendError::Closed(event)) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc();
                warn!(
                    kind = ?event.kind,
                    entity_id = %event.payload.entity_id,
                    "notification worker stopped; event dropped"
                );
            }
        }
    }

    pub fn emit_all(&self, recipients: &[&PartyContact], kind: EventKind, payload: TransitionPayload) {
        for recipient in recipients {
            self.emit(NotificationEvent::to(recipient, kind, payload.clone()));
        }
    }
}
