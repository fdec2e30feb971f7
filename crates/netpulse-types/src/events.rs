use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::{MetricSnapshot, MetricSource};

/// Message kinds moving through the realtime event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Metrics,
    Fallback,
    Ops,
}

/// Immutable event envelope for streaming to dashboard clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Metrics(MetricsEvent),
    Fallback(FallbackEvent),
    Ops(OpsEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Boot,
    Ready,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub snapshot: MetricSnapshot,
    /// Set when the snapshot was submitted rather than read.
    pub recorded: bool,
}

/// Emitted whenever a request had to drop below the live tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub interface: String,
    pub served_by: MetricSource,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsEvent {
    pub message: String,
    pub tags: Vec<String>,
}

impl SystemEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn metrics(snapshot: MetricSnapshot, recorded: bool) -> Self {
        Self::new(
            EventKind::Metrics,
            EventPayload::Metrics(MetricsEvent { snapshot, recorded }),
        )
    }

    pub fn fallback(interface: impl Into<String>, served_by: MetricSource, reasons: Vec<String>) -> Self {
        Self::new(
            EventKind::Fallback,
            EventPayload::Fallback(FallbackEvent {
                interface: interface.into(),
                served_by,
                reasons,
            }),
        )
    }

    pub fn lifecycle(phase: LifecyclePhase, details: impl Into<String>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                phase,
                details: Some(details.into()),
            }),
        )
    }

    pub fn ops(message: impl Into<String>, tags: Vec<String>) -> Self {
        Self::new(
            EventKind::Ops,
            EventPayload::Ops(OpsEvent {
                message: message.into(),
                tags,
            }),
        )
    }
}
