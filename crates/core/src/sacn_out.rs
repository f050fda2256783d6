use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sacn::DmxSource;
use tokio::sync::watch;

use crate::config::{ConfigStore, LogLevel};
use crate::modules::DeviceModule;
use crate::status::{ModuleName, StatusReporter};

pub const UNIVERSE_SLOTS: usize = 512;

/// Source name advertised in every E1.31 packet.
pub const SACN_SOURCE_NAME: &str = "Attitude sACN Client";

/// Universes are sent unconditionally on this cadence (~41.67 frames/s).
pub const SACN_SEND_INTERVAL: Duration = Duration::from_millis(24);

pub const DEFAULT_UNIVERSE_COUNT: u16 = 8;

const WHITE_FRAME: [u8; UNIVERSE_SLOTS] = [255; UNIVERSE_SLOTS];

/// Per-universe slot buffers shared between the fixture patch (writer) and
/// the send timer (reader). Universe and channel numbers are 1-based.
pub struct SacnTransmitter {
    buffers: Mutex<Vec<[u8; UNIVERSE_SLOTS]>>,
    white_backup: AtomicBool,
    universe_count: u16,
}

impl SacnTransmitter {
    pub fn new(universe_count: u16) -> Self {
        let universe_count = universe_count.max(1);
        SacnTransmitter {
            buffers: Mutex::new(vec![[0; UNIVERSE_SLOTS]; universe_count as usize]),
            white_backup: AtomicBool::new(false),
            universe_count,
        }
    }

    pub fn universe_count(&self) -> u16 {
        self.universe_count
    }

    /// Write one slot. Out-of-range universes, channels, or values are
    /// silently dropped.
    pub fn set(&self, universe: u16, channel: u16, value: u8) {
        if universe < 1 || universe > self.universe_count {
            return;
        }
        if channel < 1 || channel as usize > UNIVERSE_SLOTS {
            return;
        }
        self.buffers.lock()[universe as usize - 1][channel as usize - 1] = value;
    }

    /// Set every slot of every universe at once (unassigned-device white-out,
    /// shutdown blackout).
    pub fn fill(&self, value: u8) {
        for buffer in self.buffers.lock().iter_mut() {
            buffer.fill(value);
        }
    }

    /// Arm or disarm the white-backup failsafe. While armed, every send
    /// carries all-255 frames regardless of the patch output.
    pub fn set_white_backup(&self, armed: bool) {
        let was = self.white_backup.swap(armed, Ordering::Relaxed);
        if was != armed {
            log::warn!(
                "white backup {}",
                if armed { "armed" } else { "disarmed" }
            );
        }
    }

    pub fn white_backup(&self) -> bool {
        self.white_backup.load(Ordering::Relaxed)
    }

    /// Frame that would go out for `universe` right now.
    pub fn frame(&self, universe: u16) -> [u8; UNIVERSE_SLOTS] {
        if self.white_backup() {
            return WHITE_FRAME;
        }
        if universe < 1 || universe > self.universe_count {
            return [0; UNIVERSE_SLOTS];
        }
        self.buffers.lock()[universe as usize - 1]
    }
}

/// Periodic sender: drains the transmitter buffers onto the wire through an
/// E1.31 source socket every 24 ms.
pub struct SacnOutput {
    transmitter: Arc<SacnTransmitter>,
    config: Arc<ConfigStore>,
    reporter: StatusReporter,
}

impl SacnOutput {
    pub fn new(
        transmitter: Arc<SacnTransmitter>,
        config: Arc<ConfigStore>,
        bus: crate::bus::EventBus,
    ) -> Self {
        let reporter = StatusReporter::new(bus, ModuleName::SacnOutput);
        SacnOutput {
            transmitter,
            config,
            reporter,
        }
    }
}

#[async_trait]
impl DeviceModule for SacnOutput {
    fn name(&self) -> ModuleName {
        ModuleName::SacnOutput
    }

    async fn run(self: Box<Self>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.reporter.initializing();

        let mut source = match DmxSource::new(SACN_SOURCE_NAME) {
            Ok(source) => source,
            Err(error) => {
                self.reporter
                    .errored(format!("creating sACN source failed: {error}"));
                return Err(anyhow::anyhow!("creating sACN source failed: {error}"));
            }
        };
        source.set_preview_mode(false);

        log::info!(
            "sACN output started: {} universes at {:?} cadence",
            self.transmitter.universe_count(),
            SACN_SEND_INTERVAL
        );
        self.reporter.operational();

        let mut ticker = tokio::time::interval(SACN_SEND_INTERVAL);
        let mut frames_sent: u64 = 0;
        let mut failing = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut tick_failed = false;
                    for universe in 1..=self.transmitter.universe_count() {
                        let frame = self.transmitter.frame(universe);
                        if let Err(error) = source.send(universe, &frame) {
                            tick_failed = true;
                            if !failing {
                                self.reporter.errored(format!(
                                    "universe {universe} send failed: {error}"
                                ));
                            }
                        }
                    }
                    if tick_failed {
                        failing = true;
                    } else if failing {
                        failing = false;
                        self.reporter.operational();
                    }

                    frames_sent += 1;
                    // ~5 s of frames between summaries.
                    if frames_sent % 208 == 0
                        && self.config.snapshot().check_log_level(LogLevel::Interval)
                    {
                        log::info!(
                            "sACN: {} frames sent across {} universes{}",
                            frames_sent,
                            self.transmitter.universe_count(),
                            if self.transmitter.white_backup() {
                                " (white backup armed)"
                            } else {
                                ""
                            }
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Leave the rig dark rather than latched on the last frame.
        for universe in 1..=self.transmitter.universe_count() {
            let _ = source.send(universe, &[0; UNIVERSE_SLOTS]);
            let _ = source.terminate_stream(universe);
        }
        log::info!("sACN output stopped after {frames_sent} frames");
        Ok(())
    }
}
