use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::bus::EventBus;
use crate::modules::DeviceModule;
use crate::status::{ModuleName, StatusReporter};

/// UDP port peripheral Attitude Sense units broadcast on.
pub const SENSE_UDP_PORT: u16 = 6455;

/// Ports per sense unit.
pub const SENSE_PORT_COUNT: usize = 16;

/// Packet TYPE for sensor state reports.
pub const SENSE_PACKET_TYPE: i64 = 1;

/// A validated sensor state report, fanned out on the `senseData` topic.
#[derive(Clone, Debug)]
pub struct SenseEvent {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub packet_type: i64,
    pub id: u32,
    pub version: serde_json::Value,
    pub packet_no: serde_json::Value,
    pub data: [u8; SENSE_PORT_COUNT],
}

#[derive(Debug, Error, PartialEq)]
pub enum SenseValidationError {
    #[error("ID missing or not an integer")]
    BadId,
    #[error("NAME missing or not a string")]
    BadName,
    #[error("VERSION missing")]
    MissingVersion,
    #[error("PACKET_NO missing")]
    MissingPacketNo,
    #[error("DATA is not 16 comma-separated binary digits")]
    BadData,
}

/// Most-recent port state per sense unit, keyed by unit id.
///
/// Single-writer (the UDP receiver); the scheduler only reads.
#[derive(Clone, Default)]
pub struct SensorCache {
    inner: Arc<RwLock<HashMap<u32, [u8; SENSE_PORT_COUNT]>>>,
}

impl SensorCache {
    pub fn new() -> Self {
        SensorCache::default()
    }

    /// Replace the whole cached vector for one unit.
    pub fn update(&self, id: u32, data: [u8; SENSE_PORT_COUNT]) {
        self.inner.write().insert(id, data);
    }

    /// Cached port vector, or all zeros for an unknown unit.
    pub fn port_data(&self, id: u32) -> [u8; SENSE_PORT_COUNT] {
        self.inner
            .read()
            .get(&id)
            .copied()
            .unwrap_or([0; SENSE_PORT_COUNT])
    }

    pub fn known_units(&self) -> usize {
        self.inner.read().len()
    }
}

/// Validate a TYPE=1 datagram and build the sense event for it.
pub fn parse_sense_packet(value: &serde_json::Value) -> Result<SenseEvent, SenseValidationError> {
    let id = value
        .get("ID")
        .and_then(|v| v.as_i64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(SenseValidationError::BadId)?;
    let name = value
        .get("NAME")
        .and_then(|v| v.as_str())
        .ok_or(SenseValidationError::BadName)?
        .to_string();
    let version = value
        .get("VERSION")
        .cloned()
        .ok_or(SenseValidationError::MissingVersion)?;
    let packet_no = value
        .get("PACKET_NO")
        .cloned()
        .ok_or(SenseValidationError::MissingPacketNo)?;
    let data = value
        .get("DATA")
        .and_then(|v| v.as_str())
        .and_then(parse_port_states)
        .ok_or(SenseValidationError::BadData)?;

    Ok(SenseEvent {
        timestamp: Utc::now(),
        name,
        packet_type: SENSE_PACKET_TYPE,
        id,
        version,
        packet_no,
        data,
    })
}

/// `DATA` must match `^([01],){15}[01]$`: exactly sixteen binary digits.
fn parse_port_states(raw: &str) -> Option<[u8; SENSE_PORT_COUNT]> {
    let mut states = [0u8; SENSE_PORT_COUNT];
    let mut count = 0;
    for token in raw.split(',') {
        if count >= SENSE_PORT_COUNT {
            return None;
        }
        states[count] = match token {
            "0" => 0,
            "1" => 1,
            _ => return None,
        };
        count += 1;
    }
    (count == SENSE_PORT_COUNT).then_some(states)
}

/// UDP ingest task: decodes datagrams from sense units, keeps the sensor
/// cache current, and fans validated reports out on the bus.
pub struct SenseReceiver {
    cache: SensorCache,
    bus: EventBus,
    reporter: StatusReporter,
    port: u16,
}

impl SenseReceiver {
    pub fn new(cache: SensorCache, bus: EventBus) -> Self {
        let reporter = StatusReporter::new(bus.clone(), ModuleName::SenseReceiver);
        SenseReceiver {
            cache,
            bus,
            reporter,
            port: SENSE_UDP_PORT,
        }
    }

    fn handle_datagram(&self, payload: &[u8]) {
        let value: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(error) => {
                log::warn!("dropping non-JSON datagram: {error}");
                return;
            }
        };

        let value = Arc::new(value);
        self.bus.publish_received_udp(Arc::clone(&value));

        match value.get("TYPE").and_then(|v| v.as_i64()) {
            Some(SENSE_PACKET_TYPE) => match parse_sense_packet(&value) {
                Ok(event) => {
                    self.cache.update(event.id, event.data);
                    log::debug!("sense {} ({}) -> {:?}", event.id, event.name, event.data);
                    self.bus.publish_sense(event);
                }
                Err(error) => log::warn!("dropping invalid sense packet: {error}"),
            },
            Some(2) => {
                // Emit packets belong to the macros manager; already fanned
                // out raw above.
                self.bus.publish_macros_status(value);
            }
            other => log::debug!("ignoring datagram with TYPE {:?}", other),
        }
    }
}

#[async_trait]
impl DeviceModule for SenseReceiver {
    fn name(&self) -> ModuleName {
        ModuleName::SenseReceiver
    }

    async fn run(self: Box<Self>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.reporter.initializing();
        let socket = UdpSocket::bind(("0.0.0.0", self.port)).await?;
        log::info!("sense receiver listening on UDP {}", self.port);
        self.reporter.operational();

        let mut buffer = [0u8; 2048];
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((length, _peer)) => self.handle_datagram(&buffer[..length]),
                        Err(error) => {
                            self.reporter.degraded(format!("udp receive failed: {error}"));
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(data: &str) -> serde_json::Value {
        serde_json::json!({
            "TYPE": 1,
            "ID": 12,
            "NAME": "Dock Sense",
            "VERSION": "2.1",
            "PACKET_NO": 448,
            "DATA": data,
        })
    }

    #[test]
    fn test_accepts_valid_packet() {
        let event = parse_sense_packet(&packet("1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,1")).unwrap();
        assert_eq!(event.id, 12);
        assert_eq!(event.name, "Dock Sense");
        assert_eq!(event.data[0], 1);
        assert_eq!(event.data[15], 1);
        assert_eq!(event.data[1..15], [0; 14]);
    }

    #[test]
    fn test_rejects_short_and_long_data() {
        assert_eq!(
            parse_sense_packet(&packet("1,0,1")).unwrap_err(),
            SenseValidationError::BadData
        );
        assert_eq!(
            parse_sense_packet(&packet("0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0")).unwrap_err(),
            SenseValidationError::BadData
        );
    }

    #[test]
    fn test_rejects_non_binary_digits() {
        assert_eq!(
            parse_sense_packet(&packet("2,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0")).unwrap_err(),
            SenseValidationError::BadData
        );
        assert_eq!(
            parse_sense_packet(&packet("01,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0")).unwrap_err(),
            SenseValidationError::BadData
        );
    }

    #[test]
    fn test_rejects_missing_fields() {
        let mut value = packet("0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0");
        value.as_object_mut().unwrap().remove("VERSION");
        assert_eq!(
            parse_sense_packet(&value).unwrap_err(),
            SenseValidationError::MissingVersion
        );

        let mut value = packet("0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0");
        value["ID"] = serde_json::json!("twelve");
        assert_eq!(
            parse_sense_packet(&value).unwrap_err(),
            SenseValidationError::BadId
        );
    }

    #[test]
    fn test_cache_replaces_wholly_and_defaults_to_zero() {
        let cache = SensorCache::new();
        assert_eq!(cache.port_data(5), [0; SENSE_PORT_COUNT]);

        let mut first = [0; SENSE_PORT_COUNT];
        first[2] = 1;
        cache.update(5, first);
        assert_eq!(cache.port_data(5)[2], 1);

        cache.update(5, [0; SENSE_PORT_COUNT]);
        assert_eq!(cache.port_data(5), [0; SENSE_PORT_COUNT]);
        assert_eq!(cache.known_units(), 1);
    }

    #[tokio::test]
    async fn test_datagram_updates_cache_and_fans_out() {
        let bus = EventBus::new();
        let cache = SensorCache::new();
        let mut sense_rx = bus.subscribe_sense();
        let mut raw_rx = bus.subscribe_received_udp();

        let receiver = SenseReceiver::new(cache.clone(), bus.clone());
        let payload =
            serde_json::to_vec(&packet("0,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0")).unwrap();
        receiver.handle_datagram(&payload);

        assert_eq!(cache.port_data(12)[1], 1);
        assert_eq!(sense_rx.recv().await.unwrap().id, 12);
        assert_eq!(raw_rx.recv().await.unwrap()["ID"], 12);
    }

    #[tokio::test]
    async fn test_invalid_datagram_is_skipped_but_repeated_raw() {
        let bus = EventBus::new();
        let cache = SensorCache::new();
        let mut raw_rx = bus.subscribe_received_udp();

        let receiver = SenseReceiver::new(cache.clone(), bus.clone());
        receiver.handle_datagram(br#"{"TYPE":1,"ID":3}"#);

        assert_eq!(cache.known_units(), 0);
        assert!(raw_rx.recv().await.is_ok());
    }
}
