//! Event and detection severity levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of a normalized event or detection.
///
/// Ordering matters: `Info < Low < Medium < High < Critical`, so `max()`
/// over a digest's member detections picks the most severe one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Canonical lowercase name, matching what is stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Map a syslog-style level string to a severity.
    ///
    /// `emergency`, `alert`, and `critical` collapse to critical; unknown
    /// levels default to info.
    pub fn from_syslog_level(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "emergency" | "alert" | "critical" => Severity::Critical,
            "error" => Severity::High,
            "warning" => Severity::Medium,
            "notice" => Severity::Low,
            _ => Severity::Info,
        }
    }

    /// The next level up, saturating at critical.
    pub fn raised(&self) -> Self {
        match self {
            Severity::Info => Severity::Low,
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_puts_critical_on_top() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn syslog_levels_collapse_as_documented() {
        assert_eq!(Severity::from_syslog_level("emergency"), Severity::Critical);
        assert_eq!(Severity::from_syslog_level("alert"), Severity::Critical);
        assert_eq!(Severity::from_syslog_level("critical"), Severity::Critical);
        assert_eq!(Severity::from_syslog_level("error"), Severity::High);
        assert_eq!(Severity::from_syslog_level("warning"), Severity::Medium);
        assert_eq!(Severity::from_syslog_level("notice"), Severity::Low);
        assert_eq!(Severity::from_syslog_level("information"), Severity::Info);
        assert_eq!(Severity::from_syslog_level("debug"), Severity::Info);
    }

    #[test]
    fn round_trips_through_strings() {
        for sev in [
            Severity::Info,
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            assert_eq!(sev.as_str().parse::<Severity>().unwrap(), sev);
        }
    }

    #[test]
    fn raised_saturates_at_critical() {
        assert_eq!(Severity::Medium.raised(), Severity::High);
        assert_eq!(Severity::Critical.raised(), Severity::Critical);
    }
}
