//! Timeframe — fixed candle bucket widths.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Bucket width in whole minutes.
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Bucket width as a chrono duration.
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Open time of the bucket containing `time`.
    ///
    /// Buckets are aligned to the Unix epoch, so a D1 bucket opens at 00:00 UTC
    /// and an H4 bucket at 00/04/08/12/16/20.
    pub fn bucket_open(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let width_ms = self.minutes() * 60_000;
        let ms = time.timestamp_millis();
        let floored = ms.div_euclid(width_ms) * width_ms;
        Utc.timestamp_millis_opt(floored).unwrap()
    }

    /// Close time (exclusive) of the bucket containing `time`.
    pub fn bucket_close(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        self.bucket_open(time) + self.duration()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_open_floors_to_width() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 37, 42).unwrap();
        assert_eq!(
            Timeframe::M5.bucket_open(t),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 35, 0).unwrap()
        );
        assert_eq!(
            Timeframe::H1.bucket_open(t),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::D1.bucket_open(t),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn bucket_close_is_open_plus_width() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 37, 42).unwrap();
        assert_eq!(
            Timeframe::M15.bucket_close(t),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 45, 0).unwrap()
        );
    }

    #[test]
    fn parse_roundtrip() {
        for tf in [
            Timeframe::M1,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
        ] {
            assert_eq!(tf.to_string().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("M7".parse::<Timeframe>().is_err());
    }
}
