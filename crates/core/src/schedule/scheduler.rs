use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::watch;

use super::assignment::{layer, normalize, parse_showsdata, transparent, ScheduleVector};
use crate::bus::EventBus;
use crate::clock::{DeviceClock, LocalMoment};
use crate::config::{ConfigSnapshot, ConfigStore, CustomBlock, SensePort};
use crate::modules::DeviceModule;
use crate::sense::SensorCache;
use crate::status::{ModuleName, StatusReporter};

/// The scheduler recomputes at least this often; `senseData` events trigger
/// extra ticks so brief pulse edges are never missed.
pub const SCHEDULER_INTERVAL: Duration = Duration::from_secs(1);

/// Latest completed scheduler output, shared with the fixture patch.
/// Single-writer: only the scheduler replaces the vector.
pub type ScheduleSlot = Arc<RwLock<ScheduleVector>>;

pub fn new_schedule_slot() -> ScheduleSlot {
    Arc::new(RwLock::new(transparent()))
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("event block {id} referenced by the weekly timetable is missing")]
    MissingEventBlock { id: u32 },
    #[error("override {id} referenced by a web override is missing")]
    MissingOverride { id: u32 },
    #[error("override {id} has malformed showsdata: {source}")]
    BadShowsData {
        id: u32,
        source: serde_json::Error,
    },
}

/// Re-assertion window for a pulse-mode sensor port.
#[derive(Clone, Debug)]
pub struct PulseTimer {
    pub sense_id: u32,
    pub port_number: u32,
    pub active_until: Instant,
}

/// Outcome of one scheduler tick. The vector is always complete; `faults`
/// lists any layer that had to be reset to transparent.
#[derive(Debug)]
pub struct TickResult {
    pub vector: ScheduleVector,
    pub faults: Vec<String>,
}

impl TickResult {
    pub fn degraded(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// Pure scheduling state machine: composes the four layers and keeps the
/// pulse-timer table between ticks.
#[derive(Default)]
pub struct ScheduleEngine {
    timers: Vec<PulseTimer>,
}

impl ScheduleEngine {
    pub fn new() -> Self {
        ScheduleEngine::default()
    }

    pub fn pulse_timers(&self) -> &[PulseTimer] {
        &self.timers
    }

    /// Compute the final per-zone assignment for one tick.
    ///
    /// Layers composite base to top: weekly, custom, sensor overrides, web
    /// overrides. A failing layer is reset to transparent and recorded as a
    /// fault; the remaining layers still compose.
    pub fn compute(
        &mut self,
        snapshot: &ConfigSnapshot,
        cache: &SensorCache,
        moment: LocalMoment,
        now: Instant,
    ) -> TickResult {
        let mut faults = Vec::new();
        let mut vector = transparent();

        match weekly_layer(snapshot, moment) {
            Ok(top) => vector = layer(&vector, &top),
            Err(error) => {
                log::warn!("weekly layer reset: {error}");
                faults.push(format!("weekly: {error}"));
            }
        }

        let custom = custom_layer(snapshot, moment);
        vector = layer(&vector, &custom);

        let sensor = self.sensor_layer(snapshot, cache, now);
        vector = layer(&vector, &sensor);

        match web_layer(snapshot) {
            Ok(top) => vector = layer(&vector, &top),
            Err(error) => {
                log::warn!("web override layer reset: {error}");
                faults.push(format!("web: {error}"));
            }
        }

        // Expired timers whose port was not visited this tick (e.g. the
        // sense unit was removed from the config) still leave now.
        self.timers.retain(|timer| now < timer.active_until);

        TickResult { vector, faults }
    }

    fn sensor_layer(
        &mut self,
        snapshot: &ConfigSnapshot,
        cache: &SensorCache,
        now: Instant,
    ) -> ScheduleVector {
        let mut acc = transparent();

        for sense in &snapshot.attitude_senses {
            let states = cache.port_data(sense.id);

            // Sort an index view rather than the snapshot itself: ascending
            // priority (absent sorts last), ties to the lower port number by
            // walking indices backwards.
            let mut ports: Vec<(usize, &SensePort)> = sense.data.iter().enumerate().collect();
            ports.sort_by(|a, b| {
                let pa = a.1.priority.unwrap_or(i64::MAX);
                let pb = b.1.priority.unwrap_or(i64::MAX);
                pa.cmp(&pb).then_with(|| b.0.cmp(&a.0))
            });

            for (index, port) in ports {
                let port_number = (index + 1) as u32;
                let Some(override_id) = positive_override_id(port) else {
                    continue;
                };
                let asserted = states.get(index).copied().unwrap_or(0) == 1;

                match port.mode.as_str() {
                    "toggle" => {
                        if asserted {
                            if let Some(top) = resolve_override(snapshot, override_id) {
                                acc = layer(&acc, &top);
                            }
                        }
                    }
                    "pulse" => {
                        if asserted {
                            match pulse_duration(port) {
                                Some(duration) => {
                                    self.upsert_timer(sense.id, port_number, now + duration)
                                }
                                None => log::warn!(
                                    "sense {} port {}: invalid pulse timeLength/timeMode",
                                    sense.id,
                                    port_number
                                ),
                            }
                        }
                        if let Some(position) = self
                            .timers
                            .iter()
                            .position(|t| t.sense_id == sense.id && t.port_number == port_number)
                        {
                            if now < self.timers[position].active_until {
                                if let Some(top) = resolve_override(snapshot, override_id) {
                                    acc = layer(&acc, &top);
                                }
                            } else {
                                self.timers.remove(position);
                            }
                        }
                    }
                    other => {
                        if !other.is_empty() {
                            log::warn!(
                                "sense {} port {}: unknown mode {:?}",
                                sense.id,
                                port_number,
                                other
                            );
                        }
                    }
                }
            }
        }

        acc
    }

    fn upsert_timer(&mut self, sense_id: u32, port_number: u32, active_until: Instant) {
        match self
            .timers
            .iter_mut()
            .find(|t| t.sense_id == sense_id && t.port_number == port_number)
        {
            Some(timer) => timer.active_until = active_until,
            None => self.timers.push(PulseTimer {
                sense_id,
                port_number,
                active_until,
            }),
        }
    }
}

fn positive_override_id(port: &SensePort) -> Option<u32> {
    port.override_id
        .and_then(|id| u32::try_from(id).ok())
        .filter(|id| *id > 0)
}

fn pulse_duration(port: &SensePort) -> Option<Duration> {
    let length = port.time_length.filter(|l| l.is_finite() && *l > 0.0)?;
    let unit_secs = match port.time_mode.as_deref() {
        Some("sec") => 1.0,
        Some("min") => 60.0,
        Some("hour") => 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64(length * unit_secs))
}

fn resolve_override(snapshot: &ConfigSnapshot, id: u32) -> Option<ScheduleVector> {
    let Some(entry) = snapshot.override_entry(id) else {
        log::warn!("sensor port references missing override {id}");
        return None;
    };
    match parse_showsdata(&entry.showsdata) {
        Ok(vector) => Some(vector),
        Err(error) => {
            log::warn!("override {id} has malformed showsdata: {error}");
            None
        }
    }
}

fn weekly_layer(
    snapshot: &ConfigSnapshot,
    moment: LocalMoment,
) -> Result<ScheduleVector, ScheduleError> {
    let hour = moment.hour as i64;
    let block = snapshot.schedule_blocks.iter().find(|b| {
        let start = b.start as i64 - 1;
        b.day == moment.weekday && start <= hour && hour < start + b.height as i64
    });

    let Some(block) = block else {
        return Ok(transparent());
    };
    let event = snapshot
        .event_block(block.event_block_id)
        .ok_or(ScheduleError::MissingEventBlock {
            id: block.event_block_id,
        })?;
    Ok(normalize(event.showdata.clone()))
}

fn custom_layer(snapshot: &ConfigSnapshot, moment: LocalMoment) -> ScheduleVector {
    let mut acc = transparent();
    for block in &snapshot.custom_blocks {
        match custom_block_active(block, moment) {
            Ok(true) => acc = layer(&acc, &normalize(block.showdata.clone())),
            Ok(false) => {}
            Err(reason) => {
                log::warn!("skipping custom block {:?}: {reason}", block.name);
            }
        }
    }
    acc
}

/// Date windows wrap the year boundary when the end ordinal precedes the
/// start ordinal; the minute window is inclusive at the start, exclusive at
/// the end.
fn custom_block_active(block: &CustomBlock, moment: LocalMoment) -> Result<bool, &'static str> {
    if block.month.is_some() || block.day.is_some() {
        return Err("legacy single-date shape");
    }
    let (Some(sm), Some(sd), Some(em), Some(ed)) = (
        block.start_month,
        block.start_day,
        block.end_month,
        block.end_day,
    ) else {
        return Err("missing start or end date");
    };

    let start_md = sm * 100 + sd;
    let end_md = em * 100 + ed;
    let current_md = moment.month_day();

    let in_dates = if end_md >= start_md {
        start_md <= current_md && current_md <= end_md
    } else {
        current_md >= start_md || current_md <= end_md
    };
    if !in_dates {
        return Ok(false);
    }

    let start_minutes = block.start_hour.unwrap_or(0) * 60 + block.start_minute.unwrap_or(0);
    let end_minutes = block.end_hour.unwrap_or(0) * 60 + block.end_minute.unwrap_or(0);
    let now_minutes = moment.minutes_of_day();
    Ok(start_minutes <= now_minutes && now_minutes < end_minutes)
}

/// Web overrides stack in reverse configuration order; a dangling override
/// reference is a hard error that resets the whole layer.
fn web_layer(snapshot: &ConfigSnapshot) -> Result<ScheduleVector, ScheduleError> {
    let mut acc = transparent();
    for web in snapshot.web_overrides.iter().rev() {
        if !web.active || web.override_id == 0 {
            continue;
        }
        let entry = snapshot
            .override_entry(web.override_id)
            .ok_or(ScheduleError::MissingOverride {
                id: web.override_id,
            })?;
        let top = parse_showsdata(&entry.showsdata).map_err(|source| {
            ScheduleError::BadShowsData {
                id: entry.id,
                source,
            }
        })?;
        acc = layer(&acc, &top);
    }
    Ok(acc)
}

/// Periodic module wrapping the schedule engine: owns the clock, reads
/// config and sensor snapshots, and publishes the final vector.
pub struct Scheduler {
    config: Arc<ConfigStore>,
    cache: SensorCache,
    slot: ScheduleSlot,
    bus: EventBus,
    reporter: StatusReporter,
    engine: ScheduleEngine,
    clock: DeviceClock,
    clock_timezone: String,
}

impl Scheduler {
    pub fn new(
        config: Arc<ConfigStore>,
        cache: SensorCache,
        slot: ScheduleSlot,
        bus: EventBus,
    ) -> Self {
        let timezone = config.snapshot().device_timezone.clone();
        let reporter = StatusReporter::new(bus.clone(), ModuleName::Scheduler);
        Scheduler {
            config,
            cache,
            slot,
            bus,
            reporter,
            engine: ScheduleEngine::new(),
            clock: DeviceClock::new(&timezone),
            clock_timezone: timezone,
        }
    }

    fn tick(&mut self) {
        let snapshot = self.config.snapshot();
        if snapshot.device_timezone != self.clock_timezone {
            self.clock = DeviceClock::new(&snapshot.device_timezone);
            self.clock_timezone = snapshot.device_timezone.clone();
        }

        let moment = self.clock.now();
        let result = self
            .engine
            .compute(&snapshot, &self.cache, moment, Instant::now());

        let degraded = result.degraded();
        *self.slot.write() = result.vector;

        if degraded {
            self.reporter.degraded(result.faults.join("; "));
        } else {
            self.reporter.operational();
        }
    }
}

#[async_trait]
impl DeviceModule for Scheduler {
    fn name(&self) -> ModuleName {
        ModuleName::Scheduler
    }

    async fn run(mut self: Box<Self>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.reporter.initializing();
        let mut sense_rx = self.bus.subscribe_sense();
        let mut ticker = tokio::time::interval(SCHEDULER_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                event = sense_rx.recv() => {
                    // A lagged receiver still recomputes; the cache already
                    // holds the newest port states.
                    if event.is_ok() || matches!(event, Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) {
                        self.tick();
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
