use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::EventBus;

/// Identity of a reporting subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleName {
    Scheduler,
    FixturePatch,
    SacnOutput,
    SenseReceiver,
    ConfigManager,
    Supervisor,
    Network,
    Macros,
}

impl ModuleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleName::Scheduler => "scheduler",
            ModuleName::FixturePatch => "fixturePatch",
            ModuleName::SacnOutput => "sacnOutput",
            ModuleName::SenseReceiver => "senseReceiver",
            ModuleName::ConfigManager => "configManager",
            ModuleName::Supervisor => "supervisor",
            ModuleName::Network => "network",
            ModuleName::Macros => "macros",
        }
    }

    /// Periodic modules are expected to report continuously and can go
    /// unresponsive; one-shot reporters (macros, config sync) cannot.
    pub fn is_periodic(&self) -> bool {
        !matches!(self, ModuleName::Macros | ModuleName::ConfigManager)
    }
}

impl std::fmt::Display for ModuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health level carried by a module status report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Initializing,
    Operational,
    Degraded,
    Errored,
    Online,
    Offline,
    Unresponsive,
    Reconnected,
}

impl StatusLevel {
    /// True for the levels that should hold off an immediate `operational`
    /// flip-back (see the supervisor's sticky-downgrade rule).
    pub fn is_downgrade(&self) -> bool {
        matches!(self, StatusLevel::Degraded | StatusLevel::Errored)
    }
}

/// One status report on the `moduleStatus` topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleStatusEvent {
    pub module: ModuleName,
    pub level: StatusLevel,
    pub data: String,
    pub timestamp: DateTime<Utc>,
}

impl ModuleStatusEvent {
    pub fn new(module: ModuleName, level: StatusLevel, data: impl Into<String>) -> Self {
        ModuleStatusEvent {
            module,
            level,
            data: data.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Handle a subsystem uses to publish its own health.
#[derive(Clone)]
pub struct StatusReporter {
    bus: EventBus,
    module: ModuleName,
}

impl StatusReporter {
    pub fn new(bus: EventBus, module: ModuleName) -> Self {
        StatusReporter { bus, module }
    }

    pub fn module(&self) -> ModuleName {
        self.module
    }

    pub fn report(&self, level: StatusLevel, data: impl Into<String>) {
        self.bus
            .publish_module_status(ModuleStatusEvent::new(self.module, level, data));
    }

    pub fn initializing(&self) {
        self.report(StatusLevel::Initializing, "");
    }

    pub fn operational(&self) {
        self.report(StatusLevel::Operational, "");
    }

    pub fn degraded(&self, data: impl Into<String>) {
        let data = data.into();
        log::warn!("{} degraded: {}", self.module, data);
        self.report(StatusLevel::Degraded, data);
    }

    pub fn errored(&self, data: impl Into<String>) {
        let data = data.into();
        log::error!("{} errored: {}", self.module, data);
        self.report(StatusLevel::Errored, data);
    }
}
