use std::sync::Arc;

use tokio::sync::broadcast;

use crate::sense::SenseEvent;
use crate::status::ModuleStatusEvent;
use crate::supervisor::SystemStatusEvent;

/// Ring capacity per topic. A subscriber that falls further behind than this
/// starts losing the oldest events; publishers never block on it.
const TOPIC_CAPACITY: usize = 64;

/// In-process topic-keyed pub/sub.
///
/// Each topic is a bounded broadcast channel: delivery is FIFO per topic and
/// best-effort. Publishing never fails and never waits; a topic with no
/// subscribers simply drops the event.
#[derive(Clone)]
pub struct EventBus {
    sense_data: broadcast::Sender<SenseEvent>,
    module_status: broadcast::Sender<ModuleStatusEvent>,
    module_status_update: broadcast::Sender<ModuleStatusEvent>,
    system_status_update: broadcast::Sender<SystemStatusEvent>,
    macros_status: broadcast::Sender<Arc<serde_json::Value>>,
    received_udp: broadcast::Sender<Arc<serde_json::Value>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            sense_data: broadcast::channel(TOPIC_CAPACITY).0,
            module_status: broadcast::channel(TOPIC_CAPACITY).0,
            module_status_update: broadcast::channel(TOPIC_CAPACITY).0,
            system_status_update: broadcast::channel(TOPIC_CAPACITY).0,
            macros_status: broadcast::channel(TOPIC_CAPACITY).0,
            received_udp: broadcast::channel(TOPIC_CAPACITY).0,
        }
    }

    pub fn publish_sense(&self, event: SenseEvent) {
        let _ = self.sense_data.send(event);
    }

    pub fn subscribe_sense(&self) -> broadcast::Receiver<SenseEvent> {
        self.sense_data.subscribe()
    }

    pub fn publish_module_status(&self, event: ModuleStatusEvent) {
        let _ = self.module_status.send(event);
    }

    pub fn subscribe_module_status(&self) -> broadcast::Receiver<ModuleStatusEvent> {
        self.module_status.subscribe()
    }

    pub fn publish_module_status_update(&self, event: ModuleStatusEvent) {
        let _ = self.module_status_update.send(event);
    }

    pub fn subscribe_module_status_update(&self) -> broadcast::Receiver<ModuleStatusEvent> {
        self.module_status_update.subscribe()
    }

    pub fn publish_system_status(&self, event: SystemStatusEvent) {
        let _ = self.system_status_update.send(event);
    }

    pub fn subscribe_system_status(&self) -> broadcast::Receiver<SystemStatusEvent> {
        self.system_status_update.subscribe()
    }

    pub fn publish_macros_status(&self, payload: Arc<serde_json::Value>) {
        let _ = self.macros_status.send(payload);
    }

    pub fn subscribe_macros_status(&self) -> broadcast::Receiver<Arc<serde_json::Value>> {
        self.macros_status.subscribe()
    }

    /// Raw decoded datagrams, fanned out before any packet-type handling.
    pub fn publish_received_udp(&self, payload: Arc<serde_json::Value>) {
        let _ = self.received_udp.send(payload);
    }

    pub fn subscribe_received_udp(&self) -> broadcast::Receiver<Arc<serde_json::Value>> {
        self.received_udp.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{ModuleName, StatusLevel};

    #[tokio::test]
    async fn test_fans_out_to_every_subscriber() {
        let bus = EventBus::new();
        let mut first = bus.subscribe_module_status();
        let mut second = bus.subscribe_module_status();

        bus.publish_module_status(ModuleStatusEvent::new(
            ModuleName::SacnOutput,
            StatusLevel::Operational,
            "",
        ));

        assert_eq!(first.recv().await.unwrap().module, ModuleName::SacnOutput);
        assert_eq!(second.recv().await.unwrap().module, ModuleName::SacnOutput);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_break_publish() {
        let bus = EventBus::new();
        let gone = bus.subscribe_module_status();
        drop(gone);

        let mut alive = bus.subscribe_module_status();
        bus.publish_module_status(ModuleStatusEvent::new(
            ModuleName::Scheduler,
            StatusLevel::Operational,
            "",
        ));
        assert!(alive.recv().await.is_ok());
    }

    #[test]
    fn test_publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish_module_status(ModuleStatusEvent::new(
            ModuleName::Scheduler,
            StatusLevel::Operational,
            "",
        ));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_loses_oldest_but_keeps_up() {
        let bus = EventBus::new();
        let mut slow = bus.subscribe_module_status();

        for i in 0..(TOPIC_CAPACITY + 8) {
            bus.publish_module_status(ModuleStatusEvent::new(
                ModuleName::Scheduler,
                StatusLevel::Operational,
                format!("{i}"),
            ));
        }

        // The first recv reports the lag; subsequent recvs deliver events.
        match slow.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert!(skipped > 0),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(slow.recv().await.is_ok());
    }
}
