//! Control-plane event log.
//!
//! A bounded ring buffer of structured events describing every mutation
//! (placement, failover, policy, catalog). Appends and eviction of the oldest
//! entry happen under a single guard, so readers never observe a truncated or
//! duplicated view. Each append is also broadcast to live subscribers, which
//! routers use as a cache-invalidation signal.

use crate::core::{Result, ShardError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{Level, event};
use uuid::Uuid;

const SUBSCRIBER_BUFFER: usize = 256;

/// Kind of control-plane mutation recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "shard.assigned")]
    ShardAssigned,
    #[serde(rename = "policy.updated")]
    PolicyUpdated,
    #[serde(rename = "failover.planned")]
    FailoverPlanned,
    #[serde(rename = "failover.declared")]
    FailoverDeclared,
    #[serde(rename = "failover.promoting")]
    FailoverPromoting,
    #[serde(rename = "failover.map_updated")]
    FailoverMapUpdated,
    #[serde(rename = "failover.completed")]
    FailoverCompleted,
    #[serde(rename = "failover.rolled_back")]
    FailoverRolledBack,
    #[serde(rename = "node.status_changed")]
    NodeStatusChanged,
    #[serde(rename = "tenant.created")]
    TenantCreated,
    #[serde(rename = "tenant.updated")]
    TenantUpdated,
    #[serde(rename = "fleet.registered")]
    FleetRegistered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ShardAssigned => "shard.assigned",
            EventKind::PolicyUpdated => "policy.updated",
            EventKind::FailoverPlanned => "failover.planned",
            EventKind::FailoverDeclared => "failover.declared",
            EventKind::FailoverPromoting => "failover.promoting",
            EventKind::FailoverMapUpdated => "failover.map_updated",
            EventKind::FailoverCompleted => "failover.completed",
            EventKind::FailoverRolledBack => "failover.rolled_back",
            EventKind::NodeStatusChanged => "node.status_changed",
            EventKind::TenantCreated => "tenant.created",
            EventKind::TenantUpdated => "tenant.updated",
            EventKind::FleetRegistered => "fleet.registered",
        }
    }

    /// Whether routers holding a cached shard map should refetch.
    pub fn changes_topology(&self) -> bool {
        matches!(
            self,
            EventKind::ShardAssigned
                | EventKind::FailoverDeclared
                | EventKind::FailoverMapUpdated
                | EventKind::FailoverCompleted
                | EventKind::FailoverRolledBack
                | EventKind::NodeStatusChanged
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded control-plane event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub detail: serde_json::Value,
    pub ts: DateTime<Utc>,
}

/// Bounded, append-only event log. Oldest events are dropped on overflow.
pub struct EventLog {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    notifier: broadcast::Sender<Event>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ShardError::Validation(
                "event log capacity must be >= 1".to_string(),
            ));
        }
        let (notifier, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Ok(Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notifier,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an event, evicting the oldest one when the log is full.
    pub fn append(&self, kind: EventKind, detail: serde_json::Value) -> Result<Event> {
        let record = {
            let mut events = self.events.lock()?;
            // Stamped under the guard so log order and timestamps agree.
            let record = Event {
                id: format!("evt-{}", Uuid::new_v4()),
                kind,
                detail,
                ts: Utc::now(),
            };
            if events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(record.clone());
            record
        };
        event!(Level::DEBUG, event_type = %kind, event_id = %record.id, "control-plane event appended");

        // No subscribers is not an error.
        let _ = self.notifier.send(record.clone());
        Ok(record)
    }

    /// Returns the retained events, oldest first.
    pub fn snapshot(&self) -> Result<Vec<Event>> {
        let events = self.events.lock()?;
        Ok(events.iter().cloned().collect())
    }

    /// Returns the retained events, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Event>> {
        let events = self.events.lock()?;
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.events.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.events.lock()?.is_empty())
    }

    /// Receives every event appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.notifier.subscribe()
    }
}

/// Durable audit/analytics consumer of control-plane events.
///
/// Delivery is at-least-once; events are idempotent facts keyed by id.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &Event) -> Result<()>;
}

/// Sink that emits each event as a structured tracing record.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn deliver(&self, record: &Event) -> Result<()> {
        event!(
            Level::INFO,
            event_id = %record.id,
            event_type = %record.kind,
            detail = %record.detail,
            "control-plane event"
        );
        Ok(())
    }
}

/// Forwards every event from the log to `sink` until the log is dropped.
pub fn spawn_sink_forwarder(
    log: &EventLog,
    sink: std::sync::Arc<dyn EventSink>,
) -> tokio::task::JoinHandle<()> {
    let mut receiver = log.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(record) => {
                    if let Err(err) = sink.deliver(&record).await {
                        event!(Level::WARN, error = %err, event_id = %record.id, "event sink delivery failed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    event!(Level::WARN, skipped, "event sink lagged behind the log");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
