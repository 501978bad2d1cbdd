use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};

/// Source of "now" plus the local time zone rules the schedule needs.
///
/// Local wall-clock values are exchanged as [`NaiveDateTime`] so a fake
/// clock can model any zone (including daylight-saving transitions) without
/// touching the process time zone.
pub trait Clock: Send + Sync {
    fn utc_now(&self) -> DateTime<Utc>;

    /// Wall-clock reading for a UTC instant.
    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime;

    /// UTC instant for a local wall-clock reading. Ambiguous readings resolve
    /// to the earlier instant; readings inside a spring-forward gap resolve to
    /// the first valid instant after it.
    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc>;

    fn now(&self) -> NaiveDateTime {
        self.to_local(self.utc_now())
    }
}

/// Real clock using the process time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&Local).naive_local()
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        if let Some(resolved) = Local.from_local_datetime(&local).earliest() {
            return resolved.with_timezone(&Utc);
        }

        // Spring-forward gap: no transition skips more than an hour in practice.
        let shifted = local + Duration::hours(1);
        match Local.from_local_datetime(&shifted).earliest() {
            Some(resolved) => resolved.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&local),
        }
    }
}
