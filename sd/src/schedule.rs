//! Declarative schedule configuration for one agent
//!
//! ```yaml
//! heartbeat:
//!   interval-ms: 60000
//!   prompt: "Check the inbox"
//! cron:
//!   - pattern: "0 9 * * *"
//!     prompt: "Daily review"
//!     timezone: Asia/Shanghai
//! hooks:
//!   - event-name: on-push
//!     prompt: "Review push: {{payload}}"
//!     priority: high
//! ```
//!
//! The camelCase spellings (`intervalMs`, `eventName`) are accepted as aliases.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Priority;
use crate::inputs::{parse_cron_pattern, parse_timezone};

/// Smallest heartbeat interval accepted by [`ScheduleConfig::validate`]
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Errors turning a schedule into concrete input sources
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron pattern '{pattern}': {source}")]
    InvalidCron {
        pattern: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("heartbeat interval {interval_ms}ms is below the {MIN_HEARTBEAT_INTERVAL_MS}ms minimum")]
    IntervalTooShort { interval_ms: u64 },
}

/// Which input sources an agent gets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub heartbeat: Option<HeartbeatConfig>,
    pub cron: Vec<CronConfig>,
    pub hooks: Vec<HookConfig>,
}

/// Fixed-interval prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(rename = "interval-ms", alias = "intervalMs")]
    pub interval_ms: u64,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// Cron-scheduled prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronConfig {
    pub pattern: String,
    pub prompt: String,
    /// IANA timezone name, UTC when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// Prompt produced when a named event is emitted; `{{payload}}` is substituted once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(rename = "event-name", alias = "eventName")]
    pub event_name: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl ScheduleConfig {
    pub fn is_empty(&self) -> bool {
        self.heartbeat.is_none() && self.cron.is_empty() && self.hooks.is_empty()
    }

    /// Number of input sources this schedule materializes into
    pub fn source_count(&self) -> usize {
        usize::from(self.heartbeat.is_some()) + self.cron.len() + self.hooks.len()
    }

    /// Check intervals, cron patterns and timezones up front
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if let Some(heartbeat) = &self.heartbeat {
            if heartbeat.interval_ms < MIN_HEARTBEAT_INTERVAL_MS {
                return Err(ScheduleError::IntervalTooShort {
                    interval_ms: heartbeat.interval_ms,
                });
            }
        }
        for entry in &self.cron {
            parse_cron_pattern(&entry.pattern)?;
            parse_timezone(entry.timezone.as_deref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_schedule() {
        let yaml = r#"
heartbeat:
  interval-ms: 5000
  prompt: heartbeat prompt
cron:
  - pattern: "0 9 * * *"
    prompt: daily prompt
    timezone: Asia/Shanghai
hooks:
  - event-name: on-push
    prompt: "push prompt {{payload}}"
    priority: high
"#;
        let config: ScheduleConfig = serde_yaml::from_str(yaml).unwrap();

        let heartbeat = config.heartbeat.as_ref().unwrap();
        assert_eq!(heartbeat.interval_ms, 5000);
        assert_eq!(heartbeat.priority, None);
        assert_eq!(config.cron[0].timezone.as_deref(), Some("Asia/Shanghai"));
        assert_eq!(config.hooks[0].event_name, "on-push");
        assert_eq!(config.hooks[0].priority, Some(Priority::High));
        assert_eq!(config.source_count(), 3);
    }

    #[test]
    fn test_camel_case_aliases() {
        let json = r#"{"heartbeat": {"intervalMs": 2000, "prompt": "ping"}, "hooks": [{"eventName": "e", "prompt": "p"}]}"#;
        let config: ScheduleConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.heartbeat.unwrap().interval_ms, 2000);
        assert!(config.cron.is_empty());
        assert_eq!(config.hooks[0].event_name, "e");
    }

    #[test]
    fn test_empty_schedule() {
        let config: ScheduleConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.is_empty());
        assert_eq!(config.source_count(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_interval() {
        let config = ScheduleConfig {
            heartbeat: Some(HeartbeatConfig {
                interval_ms: 500,
                prompt: "tick".to_string(),
                priority: None,
            }),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScheduleError::IntervalTooShort { interval_ms: 500 })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_cron_and_timezone() {
        let bad_pattern = ScheduleConfig {
            cron: vec![CronConfig {
                pattern: "not a cron".to_string(),
                prompt: "p".to_string(),
                timezone: None,
                priority: None,
            }],
            ..Default::default()
        };
        assert!(matches!(bad_pattern.validate(), Err(ScheduleError::InvalidCron { .. })));

        let bad_tz = ScheduleConfig {
            cron: vec![CronConfig {
                pattern: "0 9 * * *".to_string(),
                prompt: "p".to_string(),
                timezone: Some("Mars/Olympus".to_string()),
                priority: None,
            }],
            ..Default::default()
        };
        assert!(matches!(bad_tz.validate(), Err(ScheduleError::UnknownTimezone(_))));
    }
}
