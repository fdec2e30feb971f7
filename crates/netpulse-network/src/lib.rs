//! Realtime event bus feeding live dashboard clients.

use async_stream::stream;
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use netpulse_types::{
    events::{EventPayload, SystemEvent},
    metrics::MetricSnapshot,
    Result,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

#[async_trait]
pub trait RealtimeServer: Send + Sync {
    async fn run(&self) -> Result<()>;
    /// Fans `event` out to current subscribers; returns how many received it.
    async fn publish(&self, event: SystemEvent) -> Result<usize>;
    fn subscribe(&self) -> BoxStream<'static, SystemEvent>;
}

/// In-process bus backed by a broadcast channel. Publishing with no
/// subscribers is not an error; slow subscribers skip what they missed.
#[derive(Clone)]
pub struct LocalServer {
    tx: broadcast::Sender<SystemEvent>,
}

impl LocalServer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Snapshots for one interface, or all of them when `interface` is `None`.
    pub fn snapshot_stream(&self, interface: Option<String>) -> BoxStream<'static, MetricSnapshot> {
        let mut events = self.subscribe();
        stream! {
            while let Some(event) = events.next().await {
                if let EventPayload::Metrics(metrics) = event.payload {
                    if interface.as_deref().map_or(true, |name| metrics.snapshot.interface == name) {
                        yield metrics.snapshot;
                    }
                }
            }
        }
        .boxed()
    }
}

#[async_trait]
impl RealtimeServer for LocalServer {
    async fn run(&self) -> Result<()> {
        info!("Starting local realtime event bus");
        Ok(())
    }

    async fn publish(&self, event: SystemEvent) -> Result<usize> {
        match self.tx.send(event) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                debug!("event dropped: no subscribers");
                Ok(0)
            }
        }
    }

    fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move {
                match event {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "realtime subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netpulse_types::{events::LifecyclePhase, metrics::MetricSource};

    fn snapshot(interface: &str) -> MetricSnapshot {
        MetricSnapshot::empty(interface, MetricSource::Live, chrono::Utc::now())
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let server = LocalServer::new(4);
        let delivered = server
            .publish(SystemEvent::lifecycle(LifecyclePhase::Boot, "boot"))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let server = LocalServer::new(4);
        let mut events = server.subscribe();
        assert_eq!(server.subscriber_count(), 1);
        server
            .publish(SystemEvent::metrics(snapshot("eth0"), false))
            .await
            .unwrap();
        let event = events.next().await.expect("event");
        assert!(matches!(event.payload, EventPayload::Metrics(_)));
    }

    #[tokio::test]
    async fn snapshot_stream_filters_by_interface() {
        let server = LocalServer::new(8);
        let mut stream = server.snapshot_stream(Some("wlan0".into()));
        server
            .publish(SystemEvent::lifecycle(LifecyclePhase::Ready, "ready"))
            .await
            .unwrap();
        server
            .publish(SystemEvent::metrics(snapshot("eth0"), false))
            .await
            .unwrap();
        server
            .publish(SystemEvent::metrics(snapshot("wlan0"), true))
            .await
            .unwrap();
        let first = stream.next().await.expect("snapshot");
        assert_eq!(first.interface, "wlan0");
    }
}
