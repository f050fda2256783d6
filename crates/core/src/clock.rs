use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

/// Timezone every device falls back to when its configured zone is unknown.
pub const FALLBACK_TIMEZONE: &str = "America/Chicago";

/// Wall-clock fields the scheduler works in, already shifted to the device's
/// configured timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalMoment {
    pub month: u32,
    pub day: u32,
    /// 1..=7 with Sunday = 1.
    pub weekday: u32,
    pub hour: u32,
    pub minute: u32,
}

impl LocalMoment {
    /// Month-day ordinal used for custom-block date windows (e.g. Nov 30 = 1130).
    pub fn month_day(&self) -> u32 {
        self.month * 100 + self.day
    }

    pub fn minutes_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

/// Timezone-aware clock for the device location.
#[derive(Clone, Debug)]
pub struct DeviceClock {
    tz: Tz,
}

impl DeviceClock {
    pub fn new(timezone: &str) -> Self {
        let tz = match timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                log::warn!(
                    "unknown timezone {:?}, falling back to {}",
                    timezone,
                    FALLBACK_TIMEZONE
                );
                chrono_tz::America::Chicago
            }
        };
        DeviceClock { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> LocalMoment {
        self.moment_at(Utc::now())
    }

    pub fn moment_at(&self, instant: DateTime<Utc>) -> LocalMoment {
        let local = instant.with_timezone(&self.tz);
        LocalMoment {
            month: local.month(),
            day: local.day(),
            weekday: (local.weekday().number_from_monday() % 7) + 1,
            hour: local.hour(),
            minute: local.minute(),
        }
    }
}
