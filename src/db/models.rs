//! Database model types.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

/// How a target is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    #[default]
    Http,
    Tcp,
    /// TCP connect standing in for an ICMP echo.
    Icmp,
}

impl ProbeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMode::Http => "http",
            ProbeMode::Tcp => "tcp",
            ProbeMode::Icmp => "icmp",
        }
    }

    /// Parse a stored mode, treating anything unknown as `http`.
    pub fn from_stored(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for ProbeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProbeMode::Http),
            "tcp" => Ok(ProbeMode::Tcp),
            "icmp" => Ok(ProbeMode::Icmp),
            other => Err(format!("unknown probe mode: {}", other)),
        }
    }
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored endpoint and its rolling statistics.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: i64,
    pub address: String,
    pub probe_mode: ProbeMode,
    /// Attempts run against this target on every tick (at least 1).
    pub attempt_count: u32,
    /// Status of the last tick, 0 when no attempt succeeded.
    pub last_status: u16,
    pub last_latency_ms: i64,
    pub last_checked: Option<DateTime<Utc>>,
    /// Present iff the target is currently up.
    pub first_up_time: Option<DateTime<Utc>>,
    pub total_probe_count: i64,
    pub total_latency_sum: i64,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            id: 0,
            address: String::new(),
            probe_mode: ProbeMode::Http,
            attempt_count: 1,
            last_status: 0,
            last_latency_ms: 0,
            last_checked: None,
            first_up_time: None,
            total_probe_count: 0,
            total_latency_sum: 0,
        }
    }
}

impl Target {
    /// Whether the last recorded tick left this target up.
    pub fn is_up(&self) -> bool {
        self.last_status == 200
    }

    /// Continuous up duration measured from the first-up anchor.
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.first_up_time.map(|since| now - since)
    }

    /// Historical average latency over successful ticks.
    pub fn average_latency(&self) -> Option<i64> {
        if self.total_probe_count == 0 {
            return None;
        }
        Some(self.total_latency_sum / self.total_probe_count)
    }
}

/// Render an uptime for display.
pub fn format_uptime(uptime: Option<Duration>) -> String {
    let Some(d) = uptime else {
        return "N/A".to_string();
    };

    let days = d.num_days();
    let hours = d.num_hours() % 24;
    let minutes = d.num_minutes() % 60;

    if days > 0 {
        format!("{} day, {} hour", days, hours)
    } else if hours > 0 {
        format!("{} hour, {} minute", hours, minutes)
    } else if minutes > 0 {
        format!("{} minute", minutes)
    } else {
        "Just now".to_string()
    }
}

/// One appended probe history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub target_id: i64,
    pub latency_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    /// "Up" or "Down".
    pub status: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_probe_mode_parse() {
        assert_eq!("tcp".parse::<ProbeMode>().unwrap(), ProbeMode::Tcp);
        assert_eq!("ICMP".parse::<ProbeMode>().unwrap(), ProbeMode::Icmp);
        assert!("udp".parse::<ProbeMode>().is_err());
        assert_eq!(ProbeMode::from_stored("garbage"), ProbeMode::Http);
    }

    #[test]
    fn test_average_latency() {
        let mut target = Target::default();
        assert_eq!(target.average_latency(), None);

        target.total_probe_count = 3;
        target.total_latency_sum = 100;
        assert_eq!(target.average_latency(), Some(33));
    }

    #[test]
    fn test_format_uptime() {
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let mut target = Target::default();
        assert_eq!(format_uptime(target.uptime(now)), "N/A");

        target.first_up_time = Some(now - Duration::seconds(20));
        assert_eq!(format_uptime(target.uptime(now)), "Just now");

        target.first_up_time = Some(now - Duration::minutes(7));
        assert_eq!(format_uptime(target.uptime(now)), "7 minute");

        target.first_up_time = Some(now - Duration::minutes(125));
        assert_eq!(format_uptime(target.uptime(now)), "2 hour, 5 minute");

        target.first_up_time = Some(now - Duration::hours(50));
        assert_eq!(format_uptime(target.uptime(now)), "2 day, 2 hour");
    }
}
