//! Append-only audit trail for pickup decisions.
//!
//! Callers hand records to [`AuditTrail::record`], which never blocks and
//! never drops; a background worker drains the channel into the `audit_log`
//! table. Await the worker handle after the last trail clone is dropped to
//! flush what is still queued.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::storage::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    PickupVerification,
    SupervisorOverride,
}

impl AuditEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEvent::PickupVerification => "PickupVerification",
            AuditEvent::SupervisorOverride => "SupervisorOverride",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub event: AuditEvent,
    /// Username of the caller.
    pub actor: String,
    /// What the decision was about, e.g. `person:12`.
    pub subject: String,
    pub verdict: &'static str,
    pub at: DateTime<Utc>,
    pub details: serde_json::Value,
}

#[derive(Clone)]
pub struct AuditTrail {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

impl AuditTrail {
    /// Starts the writer task. It exits once every handle is dropped.
    pub fn spawn(store: Store) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(store, rx));
        (AuditTrail { tx }, handle)
    }

    pub fn record(&self, rec: AuditRecord) {
        // Only fails once the worker is gone
        if let Err(mpsc::error::SendError(rec)) = self.tx.send(rec) {
            tracing::error!(
                event = rec.event.as_str(),
                actor = %rec.actor,
                subject = %rec.subject,
                verdict = rec.verdict,
                "audit: worker stopped, entry lost"
            );
        }
    }
}

async fn run_worker(store: Store, mut rx: mpsc::UnboundedReceiver<AuditRecord>) {
    tracing::debug!("audit: worker started");
    while let Some(rec) = rx.recv().await {
        let event = rec.event.as_str();
        let res = store
            .append_audit(
                event.to_string(),
                rec.actor,
                rec.subject,
                rec.verdict.to_string(),
                rec.details.to_string(),
                rec.at.naive_utc(),
            )
            .await;
        match res {
            Ok(()) => tracing::debug!(event, verdict = rec.verdict, "audit: entry recorded"),
            Err(e) => tracing::error!(event, error = %e, "audit: failed to write entry"),
        }
    }
    tracing::debug!("audit: channel closed, worker stopping");
}
