pub use bus::EventBus;
pub use clock::{DeviceClock, LocalMoment, FALLBACK_TIMEZONE};
pub use config::{
    AttitudeSense, ConfigError, ConfigSnapshot, ConfigStore, CustomBlock, EventBlock, LogLevel,
    OverrideEntry, ScheduleBlock, SensePort, Show, WebOverride, Zone,
};
pub use controller::{AttitudeController, ControllerSettings};
pub use engine::{
    Direction, EffectsEngine, EngineConfig, EngineConfigError, EnginePool, ShowTranslateError,
    ShowType, Transition, CANVAS_SIZE, ENGINE_VERSION_2A, FRAME_MILLIS,
};
pub use modules::{DeviceModule, ModuleManager};
pub use patch::{FixturePatch, PatchError, PATCH_INTERVAL};
pub use sacn_out::{
    SacnOutput, SacnTransmitter, DEFAULT_UNIVERSE_COUNT, SACN_SEND_INTERVAL, SACN_SOURCE_NAME,
    UNIVERSE_SLOTS,
};
pub use schedule::{
    active_show_ids, layer, normalize, parse_showsdata, transparent, new_schedule_slot,
    PulseTimer, ScheduleEngine, ScheduleError, ScheduleSlot, ScheduleVector, Scheduler,
    TickResult, ZoneShows, ZONE_COUNT,
};
pub use sense::{
    parse_sense_packet, SenseEvent, SenseReceiver, SenseValidationError, SensorCache,
    SENSE_PACKET_TYPE, SENSE_PORT_COUNT, SENSE_UDP_PORT,
};
pub use status::{ModuleName, ModuleStatusEvent, StatusLevel, StatusReporter};
pub use supervisor::{
    LedColor, LedIndicator, LogLedIndicator, Supervisor, SystemStatus, SystemStatusEvent,
    SUPERVISOR_INTERVAL, UNRESPONSIVE_AFTER,
};

mod bus;
mod clock;
mod config;
mod controller;
mod engine;
mod modules;
mod patch;
mod sacn_out;
mod schedule;
mod sense;
mod status;
mod supervisor;
