pub use assignment::{
    active_show_ids, layer, normalize, parse_showsdata, transparent, ScheduleVector, ZoneShows,
    ZONE_COUNT,
};
pub use scheduler::{
    new_schedule_slot, PulseTimer, ScheduleEngine, ScheduleError, ScheduleSlot, Scheduler,
    TickResult,
};

mod assignment;
mod scheduler;
