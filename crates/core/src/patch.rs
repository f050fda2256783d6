use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use attitude_fixtures::{expand_fixture, ColorMode, DmxSegment, Fixture, Rgb};
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{ConfigSnapshot, ConfigStore, LogLevel};
use crate::engine::EnginePool;
use crate::modules::DeviceModule;
use crate::sacn_out::SacnTransmitter;
use crate::schedule::{ScheduleSlot, ZoneShows, ZONE_COUNT};
use crate::status::{ModuleName, StatusReporter};

/// One engine frame per patch tick.
pub const PATCH_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("fixture references unknown type {0:?}")]
    UnknownFixtureKind(String),
    #[error("unknown color mode {0:?}")]
    UnknownColorMode(String),
}

/// 25 ms pipeline stage: schedule vector in, DMX slot writes out.
///
/// Each tick reconciles the engine pool against the latest schedule, runs
/// every engine one frame, then samples engine output at each fixture
/// segment and writes the transmitter buffers.
pub struct FixturePatch {
    config: Arc<ConfigStore>,
    schedule: ScheduleSlot,
    transmitter: Arc<SacnTransmitter>,
    pool: EnginePool,
    reporter: StatusReporter,
    ticks: u64,
}

impl FixturePatch {
    pub fn new(
        config: Arc<ConfigStore>,
        schedule: ScheduleSlot,
        transmitter: Arc<SacnTransmitter>,
        bus: crate::bus::EventBus,
    ) -> Self {
        let reporter = StatusReporter::new(bus, ModuleName::FixturePatch);
        FixturePatch {
            config,
            schedule,
            transmitter,
            pool: EnginePool::new(),
            reporter,
            ticks: 0,
        }
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
        let snapshot = self.config.snapshot();

        // A device that is not assigned to a location lights everything
        // full white so installers can verify wiring.
        if !snapshot.assigned_to_location {
            self.transmitter.fill(255);
            return;
        }

        let schedule = self.schedule.read().clone();
        self.pool.reconcile(&schedule, &snapshot.shows);
        self.pool.run_all();

        let mut faults = Vec::new();
        for zone_number in 1..=ZONE_COUNT as u32 {
            let slot = &schedule[zone_number as usize - 1];
            if let Err(error) = self.render_zone(&snapshot, zone_number, slot) {
                log::warn!("zone {zone_number} degraded: {error}");
                faults.push(format!("zone {zone_number}: {error}"));
            }
        }

        if faults.is_empty() {
            self.reporter.operational();
        } else {
            self.reporter.degraded(faults.join("; "));
        }

        // ~5 s of ticks between summaries.
        if self.ticks % 200 == 0 && snapshot.check_log_level(LogLevel::Interval) {
            log::info!(
                "patch: tick {} with {} engines live",
                self.ticks,
                self.pool.len()
            );
        }
    }

    fn render_zone(
        &mut self,
        snapshot: &ConfigSnapshot,
        zone_number: u32,
        slot: &ZoneShows,
    ) -> Result<(), PatchError> {
        let groups = snapshot
            .zone(zone_number)
            .map(|zone| zone.groups.clone())
            .unwrap_or_default();

        match slot {
            ZoneShows::Groups(_) if !groups.is_empty() => {
                for (index, group_number) in groups.iter().enumerate() {
                    let show_id = slot.group(index);
                    let fixtures: Vec<&Fixture> = snapshot
                        .fixtures
                        .iter()
                        .filter(|f| {
                            f.zone_number == zone_number && f.group_number == *group_number
                        })
                        .collect();
                    self.render_fixture_set(snapshot, show_id, &fixtures)?;
                }
                Ok(())
            }
            _ => {
                let fixtures: Vec<&Fixture> = snapshot
                    .fixtures
                    .iter()
                    .filter(|f| f.zone_number == zone_number)
                    .collect();
                self.render_fixture_set(snapshot, slot.scalar(), &fixtures)
            }
        }
    }

    fn render_fixture_set(
        &mut self,
        snapshot: &ConfigSnapshot,
        show_id: u32,
        fixtures: &[&Fixture],
    ) -> Result<(), PatchError> {
        let mut segments: Vec<DmxSegment> = Vec::new();
        for &fixture in fixtures {
            let kind = snapshot
                .fixture_kind(&fixture.kind)
                .ok_or_else(|| PatchError::UnknownFixtureKind(fixture.kind.clone()))?;
            segments.extend(expand_fixture(fixture, kind));
        }
        if segments.is_empty() {
            return Ok(());
        }

        let engine = if show_id > 0 {
            self.pool.engine_mut(show_id)
        } else {
            None
        };

        match engine {
            Some(engine) => {
                engine.set_fixture_count(segments.len());
                for (index, segment) in segments.iter().enumerate() {
                    write_segment(&self.transmitter, segment, engine.fixture_color(index))?;
                }
            }
            None => {
                for segment in &segments {
                    write_segment(&self.transmitter, segment, Rgb::BLACK)?;
                }
            }
        }
        Ok(())
    }
}

fn write_segment(
    transmitter: &SacnTransmitter,
    segment: &DmxSegment,
    color: Rgb,
) -> Result<(), PatchError> {
    match segment.color_mode {
        ColorMode::Rgb => {}
        ColorMode::Rgbw => {
            transmitter.set(segment.universe, segment.start_address + 3, color.white());
        }
        ColorMode::Other(ref name) => {
            return Err(PatchError::UnknownColorMode(name.clone()));
        }
    }
    transmitter.set(segment.universe, segment.start_address, color.r);
    transmitter.set(segment.universe, segment.start_address + 1, color.g);
    transmitter.set(segment.universe, segment.start_address + 2, color.b);
    Ok(())
}

#[async_trait]
impl DeviceModule for FixturePatch {
    fn name(&self) -> ModuleName {
        ModuleName::FixturePatch
    }

    async fn run(mut self: Box<Self>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.reporter.initializing();
        let mut ticker = tokio::time::interval(PATCH_INTERVAL);
        self.reporter.operational();

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
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
