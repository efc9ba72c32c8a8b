//! Maintenance ticket lifecycle.
//!
//! One Open ticket per sensor, always: re-detecting a fault updates the
//! existing ticket's issue and raises (never lowers) its severity instead
//! of filing a duplicate. The check-then-create in [`TicketManager::on_anomalous`]
//! runs under the ingestor's per-sensor lock, which is what holds the
//! invariant under concurrent ingests for the same sensor.

use std::sync::Arc;

use chrono::Utc;

use crate::broadcast::Broadcaster;
use crate::error::{CoreError, Result};
use crate::models::{RootCause, Sensor, Ticket, TicketStatus, TrustResult};
use crate::store::{Store, TicketStats};

// ---

/// Opens, updates and closes maintenance tickets.
pub struct TicketManager {
    store: Store,
    broadcaster: Arc<Broadcaster>,
}

impl TicketManager {
    pub fn new(store: Store, broadcaster: Arc<Broadcaster>) -> Self {
        Self { store, broadcaster }
    }

    /// React to an anomalous verdict. Updates the sensor's Open ticket if
    /// one exists (issue overwritten, severity raised monotonically),
    /// otherwise opens a new one. Must be called under the caller's
    /// per-sensor lock.
    pub async fn on_anomalous(&self, sensor: &Sensor, trust: &TrustResult) -> Result<Ticket> {
        // ---
        let issue = describe_fault(trust);

        let ticket = match self.store.open_ticket_for_sensor(sensor.id).await? {
            Some(mut existing) => {
                existing.issue = issue;
                existing.severity = existing.severity.max(trust.severity);
                self.store.update_ticket(&existing).await?;
                tracing::info!(
                    "Updated ticket {} for sensor {} (severity {})",
                    existing.id,
                    sensor.external_id,
                    existing.severity.as_str()
                );
                existing
            }
            None => {
                let created = self
                    .store
                    .insert_ticket(sensor.id, &issue, trust.severity, Utc::now())
                    .await?;
                tracing::info!(
                    "Opened ticket {} for sensor {} (severity {})",
                    created.id,
                    sensor.external_id,
                    created.severity.as_str()
                );
                created
            }
        };

        self.broadcaster.ticket_changed(&ticket);
        Ok(ticket)
    }

    /// Move a ticket to InProgress.
    pub async fn progress(&self, ticket_id: i64) -> Result<Ticket> {
        self.transition(ticket_id, TicketStatus::InProgress).await
    }

    /// Resolve a ticket, stamping `resolved_at`.
    pub async fn resolve(&self, ticket_id: i64) -> Result<Ticket> {
        self.transition(ticket_id, TicketStatus::Resolved).await
    }

    /// Apply a requested status change, enforcing the Open → InProgress →
    /// Resolved machine.
    pub async fn update_status(&self, ticket_id: i64, status: TicketStatus) -> Result<Ticket> {
        self.transition(ticket_id, status).await
    }

    async fn transition(&self, ticket_id: i64, to: TicketStatus) -> Result<Ticket> {
        // ---
        let mut ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or(CoreError::UnknownTicket(ticket_id))?;

        if !ticket.status.can_transition(to) {
            return Err(CoreError::InvalidTransition {
                from: ticket.status,
                to,
            });
        }

        ticket.status = to;
        ticket.resolved_at = match to {
            TicketStatus::Resolved => Some(Utc::now()),
            _ => None,
        };
        self.store.update_ticket(&ticket).await?;
        self.broadcaster.ticket_changed(&ticket);
        Ok(ticket)
    }

    pub async fn list(&self, status: Option<TicketStatus>) -> Result<Vec<Ticket>> {
        self.store.list_tickets(status).await
    }

    pub async fn stats(&self) -> Result<TicketStats> {
        self.store.ticket_stats().await
    }
}

// ---

/// Short human-readable diagnosis for a ticket issue, e.g.
/// `"spike, zone mismatch (trust 0.28, Anomaly)"`.
pub fn describe_fault(trust: &TrustResult) -> String {
    // ---
    let causes: Vec<&str> = trust
        .root_causes
        .iter()
        .filter(|c| **c != RootCause::Normal)
        .map(|c| c.label())
        .collect();
    let causes = if causes.is_empty() {
        "unclassified fault".to_string()
    } else {
        causes.join(", ")
    };
    format!("{causes} (trust {:.2}, {})", trust.score, trust.label)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    #[test]
    fn fault_description_names_causes_and_band() {
        // ---
        let mut trust = TrustResult::baseline(Utc::now());
        trust.score = 0.28;
        trust.label = "Anomaly".to_string();
        trust.root_causes =
            BTreeSet::from([RootCause::Spike, RootCause::ZoneMismatch]);

        let issue = describe_fault(&trust);
        assert_eq!(issue, "spike, zone mismatch (trust 0.28, Anomaly)");
    }
}
