//! Engine configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration.

use chrono::{FixedOffset, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::{BusinessCalendar, NotifyMethod};
use crate::error::{ConfigurationError, DeskResult};

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub calendar: CalendarConfig,
    pub assignment: AssignmentConfig,
    pub notifications: NotificationConfig,
}

/// Escalation scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between escalation ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Seconds one tick may run before it yields
    #[serde(default = "default_tick_budget")]
    pub tick_budget_secs: u64,
}

fn default_tick_interval() -> u64 {
    60
}

fn default_tick_budget() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            tick_budget_secs: default_tick_budget(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs(self.tick_budget_secs)
    }
}

/// Business calendar settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Offset of local business time from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Dates (`YYYY-MM-DD`) with no business hours
    #[serde(default)]
    pub holidays: Vec<String>,
    #[serde(default = "default_windows")]
    pub windows: Vec<WindowConfig>,
}

/// Opening hours shared by a set of weekdays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub days: Vec<String>,
    /// `HH:MM`
    pub open: String,
    /// `HH:MM`
    pub close: String,
}

fn default_windows() -> Vec<WindowConfig> {
    vec![WindowConfig {
        days: ["mon", "tue", "wed", "thu", "fri"].iter().map(|d| d.to_string()).collect(),
        open: "09:00".into(),
        close: "17:00".into(),
    }]
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            holidays: Vec::new(),
            windows: default_windows(),
        }
    }
}

impl CalendarConfig {
    /// Validate and build the calendar.
    pub fn build(&self) -> Result<BusinessCalendar, ConfigurationError> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60));
        let offset = offset.ok_or_else(|| {
            ConfigurationError::InvalidCalendar(format!(
                "utc offset {} minutes is out of range",
                self.utc_offset_minutes
            ))
        })?;

        let mut calendar = BusinessCalendar::closed(offset);
        for window in &self.windows {
            let open = parse_time(&window.open)?;
            let close = parse_time(&window.close)?;
            if window.days.is_empty() {
                return Err(ConfigurationError::InvalidCalendar("window lists no days".into()));
            }
            for day in &window.days {
                let day = day
                    .parse::<Weekday>()
                    .map_err(|_| {
                        ConfigurationError::InvalidCalendar(format!("unknown weekday '{}'", day))
                    })?;
                calendar = calendar.with_window(day, open, close)?;
            }
        }
        calendar.ensure_open_somewhere()?;

        let holidays = self
            .holidays
            .iter()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d")
                    .map_err(|_| {
                        ConfigurationError::InvalidCalendar(format!("malformed holiday '{}'", d))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(calendar.with_holidays(holidays))
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, ConfigurationError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| {
            ConfigurationError::InvalidCalendar(format!(
                "malformed time '{}', expected HH:MM",
                value
            ))
        })
}

/// Assignment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Tag added to tickets no rule could assign
    #[serde(default = "default_triage_tag")]
    pub triage_tag: String,
}

fn default_triage_tag() -> String {
    "needs-triage".to_string()
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self { triage_tag: default_triage_tag() }
    }
}

/// Notification settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Method used when an action names none
    #[serde(default)]
    pub default_method: NotifyMethod,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> DeskResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml_str(&text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigurationError> {
        toml::to_string_pretty(self).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "scheduler.tick_interval_secs must be positive".into(),
            ));
        }
        if self.scheduler.tick_budget_secs == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "scheduler.tick_budget_secs must be positive".into(),
            ));
        }
        if self.assignment.triage_tag.trim().is_empty() {
            return Err(ConfigurationError::InvalidConfig(
                "assignment.triage_tag must not be empty".into(),
            ));
        }
        self.calendar.build().map(|_| ())
    }

    pub fn business_calendar(&self) -> Result<BusinessCalendar, ConfigurationError> {
        self.calendar.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.scheduler.tick_interval(), Duration::from_secs(60));
        assert_eq!(config.scheduler.tick_budget(), Duration::from_secs(30));
        assert_eq!(config.assignment.triage_tag, "needs-triage");
        assert_eq!(config.notifications.default_method, NotifyMethod::Email);
        assert_eq!(config.business_calendar().unwrap(), BusinessCalendar::standard());
    }

    #[test]
    fn test_calendar_from_toml() {
        let text = r#"
[scheduler]
tick_interval_secs = 30

[calendar]
utc_offset_minutes = 120
holidays = ["2026-12-25"]

[[calendar.windows]]
days = ["mon", "tue", "wed", "thu"]
open = "08:00"
close = "18:00"

[[calendar.windows]]
days = ["fri"]
open = "08:00"
close = "12:00"
"#;
        let config = EngineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 30);
        assert_eq!(config.scheduler.tick_budget_secs, 30);

        let calendar = config.business_calendar().unwrap();
        // Friday 11:30 at UTC+2 is 09:30 UTC
        assert!(calendar.is_open_at(Utc.with_ymd_and_hms(2026, 3, 6, 9, 30, 0).unwrap()));
        assert!(!calendar.is_open_at(Utc.with_ymd_and_hms(2026, 3, 6, 10, 30, 0).unwrap()));
        // Christmas falls on a Friday
        assert!(!calendar.is_open_at(Utc.with_ymd_and_hms(2026, 12, 25, 8, 0, 0).unwrap()));
    }

    #[test]
    fn test_invalid_calendars() {
        let bad_time =
            "[[calendar.windows]]\ndays = [\"mon\"]\nopen = \"9am\"\nclose = \"17:00\"\n";
        assert!(matches!(
            EngineConfig::from_toml_str(bad_time),
            Err(ConfigurationError::InvalidCalendar(_))
        ));

        let inverted =
            "[[calendar.windows]]\ndays = [\"mon\"]\nopen = \"17:00\"\nclose = \"09:00\"\n";
        assert!(EngineConfig::from_toml_str(inverted).is_err());

        let bad_day =
            "[[calendar.windows]]\ndays = [\"someday\"]\nopen = \"09:00\"\nclose = \"17:00\"\n";
        assert!(EngineConfig::from_toml_str(bad_day).is_err());

        let no_windows = "[calendar]\nwindows = []\n";
        assert!(EngineConfig::from_toml_str(no_windows).is_err());

        let bad_holiday = "[calendar]\nholidays = [\"25/12/2026\"]\n";
        assert!(EngineConfig::from_toml_str(bad_holiday).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let text = "[scheduler]\ntick_interval_secs = 0\n";
        assert!(matches!(
            EngineConfig::from_toml_str(text),
            Err(ConfigurationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = EngineConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
