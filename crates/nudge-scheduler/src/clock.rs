//! Calendar arithmetic helpers: wall-clock times of day and epoch-grid
//! alignment for periodic cadences.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An (hour, minute) wall-clock value with no date component.
///
/// Serialized as `"HH:MM"` in config files and durable snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    /// Create a time of day, clamping out-of-range components.
    pub fn new(hour: u8, minute: u8) -> Self {
        Self {
            hour: hour.min(23),
            minute: minute.min(59),
        }
    }

    /// Bind this wall-clock time to the calendar day of `reference`,
    /// shifted by `day_offset` days (0 = today, 1 = tomorrow, -1 = yesterday).
    pub fn on_day(&self, reference: DateTime<Utc>, day_offset: i64) -> DateTime<Utc> {
        let day = reference.date_naive() + Duration::days(day_offset);
        let naive = day
            .and_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or_else(|| day.and_hms_opt(0, 0, 0).unwrap_or_default());
        Utc.from_utc_datetime(&naive)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{s}'"))?;
        let hour: u8 = h.trim().parse().map_err(|_| format!("bad hour in '{s}'"))?;
        let minute: u8 = m
            .trim()
            .parse()
            .map_err(|_| format!("bad minute in '{s}'"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("out of range time '{s}'"));
        }
        Ok(Self { hour, minute })
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Snap `at` down to the most recent multiple of `period_minutes`, measured
/// from the Unix epoch. A 15-minute period therefore always lands on
/// :00/:15/:30/:45 regardless of when scheduling started.
pub fn align_down(at: DateTime<Utc>, period_minutes: u32) -> DateTime<Utc> {
    let period_ms = i64::from(period_minutes.max(1)) * 60_000;
    let ms = at.timestamp_millis();
    let aligned = ms - ms.rem_euclid(period_ms);
    Utc.timestamp_millis_opt(aligned).single().unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_and_display() {
        let t: TimeOfDay = "21:05".parse().unwrap();
        assert_eq!(t, TimeOfDay::new(21, 5));
        assert_eq!(t.to_string(), "21:05");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("nope".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_on_day_binds_to_reference_date() {
        let reference = Utc.with_ymd_and_hms(2025, 2, 1, 14, 30, 0).unwrap();
        let t = TimeOfDay::new(9, 0);
        assert_eq!(
            t.on_day(reference, 0),
            Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(
            t.on_day(reference, 1),
            Utc.with_ymd_and_hms(2025, 2, 2, 9, 0, 0).unwrap()
        );
        assert_eq!(
            t.on_day(reference, -1),
            Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_align_down_lands_on_grid() {
        let at = Utc.with_ymd_and_hms(2025, 2, 1, 10, 37, 42).unwrap();
        let aligned = align_down(at, 15);
        assert_eq!(aligned.minute(), 30);
        assert_eq!(aligned.second(), 0);
        // Already-aligned instants are unchanged.
        assert_eq!(align_down(aligned, 15), aligned);
    }

    #[test]
    fn test_align_down_hour_grid() {
        let at = Utc.with_ymd_and_hms(2025, 2, 1, 10, 59, 59).unwrap();
        let aligned = align_down(at, 60);
        assert_eq!(
            aligned,
            Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let t = TimeOfDay::new(8, 45);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"08:45\"");
        let back: TimeOfDay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
