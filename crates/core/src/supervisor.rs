use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::bus::EventBus;
use crate::modules::DeviceModule;
use crate::sacn_out::SacnTransmitter;
use crate::status::{ModuleName, ModuleStatusEvent, StatusLevel, StatusReporter};

pub const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(2);

/// A periodic module that has not reported for this long is unresponsive.
pub const UNRESPONSIVE_AFTER: Duration = Duration::from_secs(10);

/// An `operational` report arriving within this window of a downgrade for
/// the same module is ignored, so a flapping module stays visibly unhealthy
/// for at least one supervisor tick.
const STICKY_DOWNGRADE: Duration = Duration::from_secs(1);

/// Front-panel LED colors. The serial panel driver consumes the
/// single-character tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    Rainbow,
    Purple,
    Cyan,
    Reserved,
    Red,
    Blue,
}

impl LedColor {
    pub fn token(&self) -> char {
        match self {
            LedColor::Rainbow => 'A',
            LedColor::Purple => 'B',
            LedColor::Cyan => 'C',
            LedColor::Reserved => 'D',
            LedColor::Red => 'E',
            LedColor::Blue => 'F',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Errored,
    /// Critical core fault: white backup armed, cyan LED.
    White,
    Degraded,
    Online,
    Offline,
    Operational,
}

/// Summary posted on `systemStatusUpdate` every supervisor tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemStatusEvent {
    pub status: SystemStatus,
    pub led: Option<LedColor>,
    pub timestamp: DateTime<Utc>,
}

/// Seam to the front-panel LED. The serial driver lives outside the core;
/// the default implementation just logs the chosen color.
pub trait LedIndicator: Send {
    fn set_color(&mut self, color: LedColor);
}

pub struct LogLedIndicator;

impl LedIndicator for LogLedIndicator {
    fn set_color(&mut self, color: LedColor) {
        log::debug!("led -> {:?} ({})", color, color.token());
    }
}

#[derive(Clone, Debug)]
struct StatusRecord {
    level: StatusLevel,
    data: String,
    received: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WhiteBackup {
    Arm,
    Disarm,
    Keep,
}

#[derive(Debug, PartialEq)]
struct Decision {
    status: SystemStatus,
    led: Option<LedColor>,
    white_backup: WhiteBackup,
}

/// First matching rule wins:
/// 1. sACN errored: solid red, overall errored.
/// 2. Scheduler or fixture patch errored: cyan, arm white backup.
/// 3. Core degraded, or config/supervisor/network errored: blue.
/// 4. Network online: rainbow.
/// 5. Network offline: purple.
fn decide(records: &HashMap<ModuleName, StatusRecord>) -> Decision {
    let level = |module: ModuleName| records.get(&module).map(|r| r.level);
    let errored = |module: ModuleName| level(module) == Some(StatusLevel::Errored);
    let degraded = |module: ModuleName| level(module) == Some(StatusLevel::Degraded);

    if errored(ModuleName::SacnOutput) {
        return Decision {
            status: SystemStatus::Errored,
            led: Some(LedColor::Red),
            white_backup: WhiteBackup::Keep,
        };
    }
    if errored(ModuleName::Scheduler) || errored(ModuleName::FixturePatch) {
        return Decision {
            status: SystemStatus::White,
            led: Some(LedColor::Cyan),
            white_backup: WhiteBackup::Arm,
        };
    }
    if degraded(ModuleName::Scheduler)
        || degraded(ModuleName::FixturePatch)
        || errored(ModuleName::ConfigManager)
        || errored(ModuleName::Supervisor)
        || errored(ModuleName::Network)
    {
        return Decision {
            status: SystemStatus::Degraded,
            led: Some(LedColor::Blue),
            white_backup: WhiteBackup::Disarm,
        };
    }
    if level(ModuleName::Network) == Some(StatusLevel::Online) {
        return Decision {
            status: SystemStatus::Online,
            led: Some(LedColor::Rainbow),
            white_backup: WhiteBackup::Disarm,
        };
    }
    if level(ModuleName::Network) == Some(StatusLevel::Offline) {
        return Decision {
            status: SystemStatus::Offline,
            led: Some(LedColor::Purple),
            white_backup: WhiteBackup::Disarm,
        };
    }
    Decision {
        status: SystemStatus::Operational,
        led: None,
        white_backup: WhiteBackup::Disarm,
    }
}

/// Health aggregator: drains `moduleStatus`, times out silent modules,
/// drives the LED, and arms the white-backup failsafe on critical faults.
pub struct Supervisor {
    bus: EventBus,
    reporter: StatusReporter,
    transmitter: Arc<SacnTransmitter>,
    led: Box<dyn LedIndicator>,
    records: HashMap<ModuleName, StatusRecord>,
}

impl Supervisor {
    pub fn new(
        bus: EventBus,
        transmitter: Arc<SacnTransmitter>,
        led: Box<dyn LedIndicator>,
    ) -> Self {
        let reporter = StatusReporter::new(bus.clone(), ModuleName::Supervisor);
        Supervisor {
            bus,
            reporter,
            transmitter,
            led,
            records: HashMap::new(),
        }
    }

    fn ingest(&mut self, event: ModuleStatusEvent) {
        if event.level == StatusLevel::Operational {
            if let Some(record) = self.records.get(&event.module) {
                if record.level.is_downgrade() && record.received.elapsed() < STICKY_DOWNGRADE {
                    log::debug!(
                        "holding {} at {:?} (operational flip-back too soon)",
                        event.module,
                        record.level
                    );
                    return;
                }
            }
        }

        self.records.insert(
            event.module,
            StatusRecord {
                level: event.level,
                data: event.data.clone(),
                received: Instant::now(),
            },
        );
        self.bus.publish_module_status_update(event);
    }

    fn evaluate(&mut self) {
        // Time out periodic modules that stopped reporting.
        for (module, record) in self.records.iter_mut() {
            if module.is_periodic()
                && record.level != StatusLevel::Unresponsive
                && record.received.elapsed() > UNRESPONSIVE_AFTER
            {
                log::warn!("module {} is unresponsive", module);
                record.level = StatusLevel::Unresponsive;
                self.bus.publish_module_status_update(ModuleStatusEvent::new(
                    *module,
                    StatusLevel::Unresponsive,
                    record.data.clone(),
                ));
            }
        }

        let decision = decide(&self.records);
        match decision.white_backup {
            WhiteBackup::Arm => self.transmitter.set_white_backup(true),
            WhiteBackup::Disarm => self.transmitter.set_white_backup(false),
            WhiteBackup::Keep => {}
        }
        if let Some(color) = decision.led {
            self.led.set_color(color);
        }

        self.bus.publish_system_status(SystemStatusEvent {
            status: decision.status,
            led: decision.led,
            timestamp: Utc::now(),
        });
        self.reporter.operational();
    }
}

#[async_trait]
impl DeviceModule for Supervisor {
    fn name(&self) -> ModuleName {
        ModuleName::Supervisor
    }

    async fn run(mut self: Box<Self>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.reporter.initializing();
        let mut status_rx = self.bus.subscribe_module_status();
        let mut ticker = tokio::time::interval(SUPERVISOR_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.evaluate(),
                event = status_rx.recv() => {
                    if let Ok(event) = event {
                        self.ingest(event);
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
    use parking_lot::Mutex;

    fn record(level: StatusLevel) -> StatusRecord {
        StatusRecord {
            level,
            data: String::new(),
            received: Instant::now(),
        }
    }

    fn records(entries: &[(ModuleName, StatusLevel)]) -> HashMap<ModuleName, StatusRecord> {
        entries
            .iter()
            .map(|(module, level)| (*module, record(*level)))
            .collect()
    }

    #[test]
    fn test_sacn_error_beats_everything() {
        let decision = decide(&records(&[
            (ModuleName::SacnOutput, StatusLevel::Errored),
            (ModuleName::Scheduler, StatusLevel::Errored),
            (ModuleName::Network, StatusLevel::Online),
        ]));
        assert_eq!(decision.status, SystemStatus::Errored);
        assert_eq!(decision.led, Some(LedColor::Red));
        assert_eq!(decision.white_backup, WhiteBackup::Keep);
    }

    #[test]
    fn test_core_error_arms_white_backup() {
        for module in [ModuleName::Scheduler, ModuleName::FixturePatch] {
            let decision = decide(&records(&[
                (module, StatusLevel::Errored),
                (ModuleName::Network, StatusLevel::Online),
            ]));
            assert_eq!(decision.status, SystemStatus::White);
            assert_eq!(decision.led, Some(LedColor::Cyan));
            assert_eq!(decision.white_backup, WhiteBackup::Arm);
        }
    }

    #[test]
    fn test_degraded_core_shows_blue() {
        let decision = decide(&records(&[
            (ModuleName::FixturePatch, StatusLevel::Degraded),
            (ModuleName::Network, StatusLevel::Online),
        ]));
        assert_eq!(decision.status, SystemStatus::Degraded);
        assert_eq!(decision.led, Some(LedColor::Blue));
        assert_eq!(decision.white_backup, WhiteBackup::Disarm);

        let decision = decide(&records(&[(ModuleName::Network, StatusLevel::Errored)]));
        assert_eq!(decision.status, SystemStatus::Degraded);
    }

    #[test]
    fn test_network_state_drives_the_happy_path() {
        let decision = decide(&records(&[(ModuleName::Network, StatusLevel::Online)]));
        assert_eq!(decision.status, SystemStatus::Online);
        assert_eq!(decision.led, Some(LedColor::Rainbow));

        let decision = decide(&records(&[(ModuleName::Network, StatusLevel::Offline)]));
        assert_eq!(decision.status, SystemStatus::Offline);
        assert_eq!(decision.led, Some(LedColor::Purple));
    }

    #[test]
    fn test_no_matching_rule_leaves_the_led_alone() {
        let decision = decide(&records(&[(
            ModuleName::Scheduler,
            StatusLevel::Operational,
        )]));
        assert_eq!(decision.status, SystemStatus::Operational);
        assert_eq!(decision.led, None);
        assert_eq!(decision.white_backup, WhiteBackup::Disarm);
    }

    #[test]
    fn test_led_tokens_match_the_panel_protocol() {
        assert_eq!(LedColor::Rainbow.token(), 'A');
        assert_eq!(LedColor::Purple.token(), 'B');
        assert_eq!(LedColor::Cyan.token(), 'C');
        assert_eq!(LedColor::Reserved.token(), 'D');
        assert_eq!(LedColor::Red.token(), 'E');
        assert_eq!(LedColor::Blue.token(), 'F');
    }

    #[derive(Clone, Default)]
    struct RecordingLed(Arc<Mutex<Vec<LedColor>>>);

    impl LedIndicator for RecordingLed {
        fn set_color(&mut self, color: LedColor) {
            self.0.lock().push(color);
        }
    }

    fn supervisor() -> (Supervisor, Arc<SacnTransmitter>, RecordingLed, EventBus) {
        let bus = EventBus::new();
        let transmitter = Arc::new(SacnTransmitter::new(1));
        let led = RecordingLed::default();
        let supervisor = Supervisor::new(bus.clone(), Arc::clone(&transmitter), Box::new(led.clone()));
        (supervisor, transmitter, led, bus)
    }

    #[test]
    fn test_critical_fault_arms_and_recovery_disarms() {
        let (mut supervisor, transmitter, led, _bus) = supervisor();

        supervisor.ingest(ModuleStatusEvent::new(
            ModuleName::Scheduler,
            StatusLevel::Errored,
            "tick panicked",
        ));
        supervisor.evaluate();
        assert!(transmitter.white_backup());
        assert_eq!(led.0.lock().last(), Some(&LedColor::Cyan));

        // Sticky window: an immediate operational report is ignored.
        supervisor.ingest(ModuleStatusEvent::new(
            ModuleName::Scheduler,
            StatusLevel::Operational,
            "",
        ));
        supervisor.evaluate();
        assert!(transmitter.white_backup());

        // After the sticky window the recovery is accepted.
        supervisor
            .records
            .get_mut(&ModuleName::Scheduler)
            .unwrap()
            .received = Instant::now() - Duration::from_secs(2);
        supervisor.ingest(ModuleStatusEvent::new(
            ModuleName::Scheduler,
            StatusLevel::Operational,
            "",
        ));
        supervisor.evaluate();
        assert!(!transmitter.white_backup());
    }

    #[test]
    fn test_silent_periodic_module_goes_unresponsive() {
        let (mut supervisor, _transmitter, _led, bus) = supervisor();
        let mut updates = bus.subscribe_module_status_update();

        supervisor.ingest(ModuleStatusEvent::new(
            ModuleName::SenseReceiver,
            StatusLevel::Operational,
            "",
        ));
        supervisor
            .records
            .get_mut(&ModuleName::SenseReceiver)
            .unwrap()
            .received = Instant::now() - Duration::from_secs(11);
        supervisor.evaluate();

        assert_eq!(
            supervisor.records[&ModuleName::SenseReceiver].level,
            StatusLevel::Unresponsive
        );
        // First update is the ingest echo, second the unresponsive flip.
        assert_eq!(updates.try_recv().unwrap().level, StatusLevel::Operational);
        assert_eq!(
            updates.try_recv().unwrap().level,
            StatusLevel::Unresponsive
        );
    }

    #[test]
    fn test_one_shot_modules_never_time_out() {
        let (mut supervisor, _transmitter, _led, _bus) = supervisor();
        supervisor.ingest(ModuleStatusEvent::new(
            ModuleName::Macros,
            StatusLevel::Operational,
            "",
        ));
        supervisor
            .records
            .get_mut(&ModuleName::Macros)
            .unwrap()
            .received = Instant::now() - Duration::from_secs(60);
        supervisor.evaluate();
        assert_eq!(
            supervisor.records[&ModuleName::Macros].level,
            StatusLevel::Operational
        );
    }
}
