//! Archive and cutover scheduling
//!
//! Both instants are "the next time the wall clock shows HH:MM:SS", either
//! on the UTC clock or on the local clock. In local mode the target is fixed
//! in wall-clock terms first and only then converted to UTC, so the duration
//! comes out right on days that are 23 or 25 hours long.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;

use crate::clock::Clock;

/// Which clock the configured times of day refer to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TimeZoneMode {
    #[default]
    Local,
    Utc,
}

/// Inputs for [`ArchiveSchedule::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    pub mode: TimeZoneMode,
    pub cutover_time: NaiveTime,
    pub archive_time: NaiveTime,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            mode: TimeZoneMode::Local,
            cutover_time: NaiveTime::MIN,
            archive_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSchedule {
    pub next_archive_utc: DateTime<Utc>,
    /// Never negative.
    pub time_until_next_archive: Duration,
    pub next_cutover_utc: DateTime<Utc>,
    pub time_until_next_cutover: Duration,
}

impl ArchiveSchedule {
    pub fn build(clock: &dyn Clock, options: &ScheduleOptions) -> Self {
        let (next_archive_utc, time_until_next_archive) =
            next_occurrence(clock, options.mode, options.archive_time);
        let (next_cutover_utc, time_until_next_cutover) =
            next_occurrence(clock, options.mode, options.cutover_time);

        Self {
            next_archive_utc,
            time_until_next_archive,
            next_cutover_utc,
            time_until_next_cutover,
        }
    }

    /// Time until whichever of archive or cutover comes first.
    pub fn time_until_next_event(&self) -> Duration {
        self.time_until_next_archive.min(self.time_until_next_cutover)
    }
}

fn next_occurrence(
    clock: &dyn Clock,
    mode: TimeZoneMode,
    time_of_day: NaiveTime,
) -> (DateTime<Utc>, Duration) {
    let utc_now = clock.utc_now();

    let target = match mode {
        TimeZoneMode::Utc => {
            let now = utc_now.naive_utc();
            next_wall_clock(now, time_of_day).and_utc()
        }
        TimeZoneMode::Local => {
            let now = clock.to_local(utc_now);
            clock.to_utc(next_wall_clock(now, time_of_day))
        }
    };

    let remaining = (target - utc_now).max(Duration::zero());
    (target, remaining)
}

/// Today's `time_of_day`, or tomorrow's once it has passed.
fn next_wall_clock(now: NaiveDateTime, time_of_day: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(time_of_day);
    if today < now {
        today + Duration::days(1)
    } else {
        today
    }
}
