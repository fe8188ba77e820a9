//! Time units accepted on delay profiles.

use crate::error::{self, ErrorKind};

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Unit of the per-channel delay values carried by a delay profile.
///
/// Delays are converted to seconds before they are turned into clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[serde(rename = "ns")]
    Nanoseconds,
}

impl TimeUnit {
    /// Conversion factor to seconds
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Milliseconds => 1e-3,
            TimeUnit::Microseconds => 1e-6,
            TimeUnit::Nanoseconds => 1e-9,
        }
    }
}

impl Default for TimeUnit {
    fn default() -> Self {
        TimeUnit::Seconds
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "us",
            TimeUnit::Nanoseconds => "ns",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TimeUnit {
    type Err = error::Error;

    fn from_str(s: &str) -> error::Result<Self> {
        match s {
            "s" => Ok(TimeUnit::Seconds),
            "ms" => Ok(TimeUnit::Milliseconds),
            "us" => Ok(TimeUnit::Microseconds),
            "ns" => Ok(TimeUnit::Nanoseconds),
            other => Err(ErrorKind::UnknownUnit(format!(
                "time unit {:?} is not recognized",
                other
            )))?,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unit_factors() {
        assert_eq!(TimeUnit::Seconds.seconds(), 1.0);
        assert_eq!(TimeUnit::Milliseconds.seconds(), 1e-3);
        assert_eq!(TimeUnit::Microseconds.seconds(), 1e-6);
        assert_eq!(TimeUnit::Nanoseconds.seconds(), 1e-9);
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!("s".parse::<TimeUnit>().unwrap(), TimeUnit::Seconds);
        assert_eq!("us".parse::<TimeUnit>().unwrap(), TimeUnit::Microseconds);
        assert_eq!("ns".parse::<TimeUnit>().unwrap(), TimeUnit::Nanoseconds);

        let err = "furlongs".parse::<TimeUnit>().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownUnit(_)));
    }

    #[test]
    fn test_unit_roundtrip_display() {
        for unit in [
            TimeUnit::Seconds,
            TimeUnit::Milliseconds,
            TimeUnit::Microseconds,
            TimeUnit::Nanoseconds,
        ] {
            assert_eq!(unit.to_string().parse::<TimeUnit>().unwrap(), unit);
        }
    }

    #[test]
    fn test_unit_serde_tag() {
        assert_eq!(
            serde_json::to_string(&TimeUnit::Microseconds).unwrap(),
            "\"us\""
        );
        assert_eq!(
            serde_json::from_str::<TimeUnit>("\"ms\"").unwrap(),
            TimeUnit::Milliseconds
        );
    }
}
