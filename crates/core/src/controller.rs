use std::sync::Arc;

use anyhow::Result;

use crate::bus::EventBus;
use crate::config::{ConfigSnapshot, ConfigStore};
use crate::modules::ModuleManager;
use crate::patch::FixturePatch;
use crate::sacn_out::{SacnOutput, SacnTransmitter, DEFAULT_UNIVERSE_COUNT};
use crate::schedule::{new_schedule_slot, ScheduleSlot, Scheduler};
use crate::sense::{SenseReceiver, SensorCache};
use crate::supervisor::{LedIndicator, LogLedIndicator, Supervisor};

pub struct ControllerSettings {
    /// sACN universes transmitted every frame.
    pub universe_count: u16,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            universe_count: DEFAULT_UNIVERSE_COUNT,
        }
    }
}

/// Owns every core subsystem and the shared state between them; the process
/// entry point builds one of these, starts it, and hands the config store to
/// the server-sync collaborator.
pub struct AttitudeController {
    bus: EventBus,
    config: Arc<ConfigStore>,
    cache: SensorCache,
    schedule: ScheduleSlot,
    transmitter: Arc<SacnTransmitter>,
    led: Option<Box<dyn LedIndicator>>,
    manager: Option<ModuleManager>,
}

impl AttitudeController {
    pub fn new(snapshot: ConfigSnapshot, settings: ControllerSettings) -> Self {
        AttitudeController {
            bus: EventBus::new(),
            config: Arc::new(ConfigStore::new(snapshot)),
            cache: SensorCache::new(),
            schedule: new_schedule_slot(),
            transmitter: Arc::new(SacnTransmitter::new(settings.universe_count)),
            led: Some(Box::new(LogLedIndicator)),
            manager: None,
        }
    }

    /// Swap in a real LED panel driver before `start`.
    pub fn with_led(mut self, led: Box<dyn LedIndicator>) -> Self {
        self.led = Some(led);
        self
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Handle the server-sync collaborator uses to replace configuration.
    pub fn config_store(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.config)
    }

    pub fn transmitter(&self) -> Arc<SacnTransmitter> {
        Arc::clone(&self.transmitter)
    }

    pub fn is_running(&self) -> bool {
        self.manager.is_some()
    }

    /// Spawn every core module. Idempotent only in the sense that a second
    /// call is rejected.
    pub fn start(&mut self) -> Result<()> {
        if self.manager.is_some() {
            anyhow::bail!("controller already started");
        }

        log::info!("starting attitude controller");
        let mut manager = ModuleManager::new(self.bus.clone());

        manager.spawn(Box::new(SenseReceiver::new(
            self.cache.clone(),
            self.bus.clone(),
        )));
        manager.spawn(Box::new(Scheduler::new(
            Arc::clone(&self.config),
            self.cache.clone(),
            self.schedule.clone(),
            self.bus.clone(),
        )));
        manager.spawn(Box::new(FixturePatch::new(
            Arc::clone(&self.config),
            self.schedule.clone(),
            Arc::clone(&self.transmitter),
            self.bus.clone(),
        )));
        manager.spawn(Box::new(SacnOutput::new(
            Arc::clone(&self.transmitter),
            Arc::clone(&self.config),
            self.bus.clone(),
        )));
        let led = self.led.take().unwrap_or_else(|| Box::new(LogLedIndicator));
        manager.spawn(Box::new(Supervisor::new(
            self.bus.clone(),
            Arc::clone(&self.transmitter),
            led,
        )));

        log::info!("{} modules running", manager.module_count());
        self.manager = Some(manager);
        Ok(())
    }

    pub async fn shutdown(mut self) {
        if let Some(manager) = self.manager.take() {
            manager.shutdown().await;
        }
        log::info!("attitude controller stopped");
    }
}
