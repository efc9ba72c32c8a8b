//! Event fan-out to live subscribers.
//!
//! One global `tokio::sync::broadcast` channel carries every event; a lazy
//! registry of per-sensor channels serves subscribers that only want one
//! sensor. Buffers are bounded per receiver: a subscriber that cannot keep
//! up loses its oldest events (`RecvError::Lagged`), never the publisher;
//! backpressure always falls on the subscriber, not on the ingest path.
//! Dropping a receiver is the whole unsubscribe protocol.
//!
//! Every event carries a topic tag and a per-topic monotone sequence
//! number. `dashboard.update` is a coalesced tick: at most one emission per
//! configured interval, with a dirty flag flushed by a background task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Reading, Sensor, Ticket, TrustResult};

// ---

/// The closed set of event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Topic {
    #[serde(rename = "reading.new")]
    ReadingNew,
    #[serde(rename = "trust.updated")]
    TrustUpdated,
    #[serde(rename = "ticket.changed")]
    TicketChanged,
    #[serde(rename = "dashboard.update")]
    DashboardUpdate,
}

impl Topic {
    fn index(self) -> usize {
        match self {
            Topic::ReadingNew => 0,
            Topic::TrustUpdated => 1,
            Topic::TicketChanged => 2,
            Topic::DashboardUpdate => 3,
        }
    }
}

/// Entity payload carried by an event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Reading {
        #[serde(rename = "sensorId")]
        sensor_id: i64,
        #[serde(rename = "externalId")]
        external_id: String,
        reading: Reading,
    },
    Trust {
        #[serde(rename = "sensorId")]
        sensor_id: i64,
        #[serde(rename = "externalId")]
        external_id: String,
        trust: TrustResult,
    },
    Ticket {
        ticket: Ticket,
    },
    /// Aggregate views may have shifted; consumers re-query.
    Dashboard {},
}

/// Envelope delivered to subscribers: topic tag, per-topic monotone
/// sequence number, entity payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub topic: Topic,
    pub seq: u64,
    pub payload: EventPayload,
}

// ---

struct DashboardGate {
    last_emit: Option<Instant>,
    dirty: bool,
}

/// Publish/subscribe surface shared by the whole process.
pub struct Broadcaster {
    global: broadcast::Sender<Event>,
    per_sensor: RwLock<HashMap<i64, broadcast::Sender<Event>>>,
    seq: [AtomicU64; 4],
    capacity: usize,
    dashboard_interval: Duration,
    dashboard: Mutex<DashboardGate>,
}

impl Broadcaster {
    /// `capacity` bounds each subscriber's buffer; `dashboard_interval` is
    /// the coalescing window for `dashboard.update` (zero = emit inline).
    pub fn new(capacity: usize, dashboard_interval: Duration) -> Self {
        // ---
        let (global, _) = broadcast::channel(capacity);
        Self {
            global,
            per_sensor: RwLock::new(HashMap::new()),
            seq: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            capacity,
            dashboard_interval,
            dashboard: Mutex::new(DashboardGate {
                last_emit: None,
                dirty: false,
            }),
        }
    }

    /// Subscribe to every topic. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.global.subscribe()
    }

    /// Subscribe to `reading.new` and `trust.updated` for one sensor.
    pub fn subscribe_sensor(&self, sensor_id: i64) -> broadcast::Receiver<Event> {
        // ---
        let mut channels = self.per_sensor.write().expect("per-sensor registry poisoned");
        // Channels whose last receiver disconnected are gone for good;
        // reap them while we hold the write lock anyway.
        channels.retain(|_, tx| tx.receiver_count() > 0);
        channels
            .entry(sensor_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    // ---

    pub fn reading_new(&self, sensor: &Sensor, reading: &Reading) {
        // ---
        let event = Event {
            topic: Topic::ReadingNew,
            seq: self.next_seq(Topic::ReadingNew),
            payload: EventPayload::Reading {
                sensor_id: sensor.id,
                external_id: sensor.external_id.clone(),
                reading: reading.clone(),
            },
        };
        self.publish(event, Some(sensor.id));
    }

    pub fn trust_updated(&self, sensor: &Sensor, trust: &TrustResult) {
        // ---
        let event = Event {
            topic: Topic::TrustUpdated,
            seq: self.next_seq(Topic::TrustUpdated),
            payload: EventPayload::Trust {
                sensor_id: sensor.id,
                external_id: sensor.external_id.clone(),
                trust: trust.clone(),
            },
        };
        self.publish(event, Some(sensor.id));
    }

    pub fn ticket_changed(&self, ticket: &Ticket) {
        // ---
        let event = Event {
            topic: Topic::TicketChanged,
            seq: self.next_seq(Topic::TicketChanged),
            payload: EventPayload::Ticket {
                ticket: ticket.clone(),
            },
        };
        self.publish(event, None);
    }

    /// Signal that aggregate views may have shifted. Emits immediately when
    /// outside the coalescing window, otherwise marks the gate dirty for
    /// [`flush_dashboard`](Self::flush_dashboard).
    pub fn dashboard_update(&self) {
        // ---
        let emit_now = {
            let mut gate = self.dashboard.lock().expect("dashboard gate poisoned");
            let due = gate
                .last_emit
                .is_none_or(|last| last.elapsed() >= self.dashboard_interval);
            if due {
                gate.last_emit = Some(Instant::now());
                gate.dirty = false;
            } else {
                gate.dirty = true;
            }
            due
        };
        if emit_now {
            self.emit_dashboard();
        }
    }

    /// Emit a pending coalesced tick, if one is due. Called periodically by
    /// the background task the binary spawns.
    pub fn flush_dashboard(&self) {
        // ---
        let emit_now = {
            let mut gate = self.dashboard.lock().expect("dashboard gate poisoned");
            let due = gate.dirty
                && gate
                    .last_emit
                    .is_none_or(|last| last.elapsed() >= self.dashboard_interval);
            if due {
                gate.last_emit = Some(Instant::now());
                gate.dirty = false;
            }
            due
        };
        if emit_now {
            self.emit_dashboard();
        }
    }

    fn emit_dashboard(&self) {
        // ---
        let event = Event {
            topic: Topic::DashboardUpdate,
            seq: self.next_seq(Topic::DashboardUpdate),
            payload: EventPayload::Dashboard {},
        };
        self.publish(event, None);
    }

    // ---

    fn next_seq(&self, topic: Topic) -> u64 {
        self.seq[topic.index()].fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Send on the global channel and, when the event concerns one sensor,
    /// on that sensor's channel. A send with no listeners is not an error.
    fn publish(&self, event: Event, sensor_id: Option<i64>) {
        // ---
        let _ = self.global.send(event.clone());
        if let Some(id) = sensor_id {
            let channels = self.per_sensor.read().expect("per-sensor registry poisoned");
            if let Some(tx) = channels.get(&id) {
                let _ = tx.send(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Utc;
    use tokio::sync::broadcast::error::RecvError;

    fn sensor(id: i64) -> Sensor {
        // ---
        Sensor {
            id,
            external_id: format!("s_{id:02}"),
            zone: "zone_1".to_string(),
            sensor_type: "soil-probe".to_string(),
            latitude: None,
            longitude: None,
            installed_at: Utc::now(),
        }
    }

    fn reading(sensor_id: i64) -> Reading {
        // ---
        Reading {
            id: 1,
            sensor_id,
            timestamp: Utc::now(),
            moisture: Some(30.0),
            temperature: None,
            ec: None,
            ph: None,
            air_temp: None,
            is_raining: None,
            irrigation_active: None,
        }
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotone_per_topic() {
        // ---
        let b = Broadcaster::new(16, Duration::ZERO);
        let mut rx = b.subscribe();

        let s = sensor(1);
        b.reading_new(&s, &reading(1));
        b.reading_new(&s, &reading(1));
        b.dashboard_update();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.topic, Topic::ReadingNew);
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        // A fresh topic starts its own sequence.
        assert_eq!(third.topic, Topic::DashboardUpdate);
        assert_eq!(third.seq, 1);
    }

    #[tokio::test]
    async fn per_sensor_channel_filters_other_sensors() {
        // ---
        let b = Broadcaster::new(16, Duration::ZERO);
        let mut rx = b.subscribe_sensor(1);

        b.reading_new(&sensor(2), &reading(2));
        b.reading_new(&sensor(1), &reading(1));

        let event = rx.recv().await.unwrap();
        match event.payload {
            EventPayload::Reading { sensor_id, .. } => assert_eq!(sensor_id, 1),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_events_not_the_publisher() {
        // ---
        let b = Broadcaster::new(2, Duration::ZERO);
        let mut rx = b.subscribe();

        let s = sensor(1);
        for _ in 0..5 {
            b.reading_new(&s, &reading(1));
        }

        // Three events were dropped in favour of the newest two.
        match rx.recv().await {
            Err(RecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        let event = rx.recv().await.unwrap();
        assert_eq!(event.seq, 4);
        assert_eq!(rx.recv().await.unwrap().seq, 5);
    }

    #[tokio::test]
    async fn dashboard_ticks_coalesce_within_the_interval() {
        // ---
        let b = Broadcaster::new(16, Duration::from_secs(3600));
        let mut rx = b.subscribe();

        b.dashboard_update();
        b.dashboard_update();
        b.dashboard_update();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.topic, Topic::DashboardUpdate);
        assert!(rx.try_recv().is_err(), "later ticks must coalesce");

        // Flushing inside the window does nothing either.
        b.flush_dashboard();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        // ---
        let b = Broadcaster::new(4, Duration::ZERO);
        b.reading_new(&sensor(1), &reading(1));
        b.ticket_changed(&Ticket {
            id: 1,
            sensor_id: 1,
            issue: "static value".to_string(),
            severity: crate::models::Severity::High,
            status: crate::models::TicketStatus::Open,
            created_at: Utc::now(),
            resolved_at: None,
        });
    }

    #[test]
    fn event_envelope_serialises_with_wire_topic_names() {
        // ---
        let event = Event {
            topic: Topic::TrustUpdated,
            seq: 7,
            payload: EventPayload::Dashboard {},
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "trust.updated");
        assert_eq!(json["seq"], 7);
    }
}
