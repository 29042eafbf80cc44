//! Cron source - one task per occurrence of a cron pattern

use std::str::FromStr;
use std::sync::Arc;

use ::cron::Schedule;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use super::{InputSource, TaskCallback, Trigger, generate_source_id};
use crate::domain::Task;
use crate::events::{CallerMeta, EventSink, cron_event_name};
use crate::schedule::{CronConfig, ScheduleError};

/// Prepend a seconds field to standard 5-field patterns
///
/// The parser wants `sec min hour day-of-month month day-of-week [year]`;
/// anything that is not exactly five fields passes through trimmed.
pub fn normalize_cron(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

pub fn parse_cron_pattern(pattern: &str) -> Result<Schedule, ScheduleError> {
    Schedule::from_str(&normalize_cron(pattern)).map_err(|source| ScheduleError::InvalidCron {
        pattern: pattern.to_string(),
        source,
    })
}

/// Resolve an IANA timezone name, UTC when absent
pub fn parse_timezone(name: Option<&str>) -> Result<Tz, ScheduleError> {
    match name {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| ScheduleError::UnknownTimezone(name.to_string())),
    }
}

/// First occurrence strictly after `after`, evaluated in `tz`
fn next_occurrence(schedule: &Schedule, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|at| at.with_timezone(&Utc))
}

/// Fires at every occurrence of a cron pattern in the configured timezone
pub struct CronInput {
    id: String,
    config: CronConfig,
    schedule: Schedule,
    timezone: Tz,
    event_sink: Option<Arc<dyn EventSink>>,
    job: Option<Trigger>,
}

impl CronInput {
    /// Fails on an unparseable pattern or unknown timezone
    pub fn new(config: CronConfig) -> Result<Self, ScheduleError> {
        Self::with_id(config, generate_source_id("cron"))
    }

    pub fn with_id(config: CronConfig, id: impl Into<String>) -> Result<Self, ScheduleError> {
        let schedule = parse_cron_pattern(&config.pattern)?;
        let timezone = parse_timezone(config.timezone.as_deref())?;
        Ok(Self {
            id: id.into(),
            config,
            schedule,
            timezone,
            event_sink: None,
            job: None,
        })
    }

    /// Publish `cron:<pattern>` to this sink on every fire
    pub fn with_event_sink(mut self, sink: Option<Arc<dyn EventSink>>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn config(&self) -> &CronConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Next time this source would fire after `after`
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_occurrence(&self.schedule, self.timezone, after)
    }
}

struct Firing {
    source: String,
    agent_name: String,
    config: CronConfig,
    sink: Option<Arc<dyn EventSink>>,
    on_task: TaskCallback,
}

impl Firing {
    fn fire(&self) {
        debug!(source = %self.source, "Firing::fire: called");
        if let Some(sink) = &self.sink {
            sink.emit(
                &cron_event_name(&self.config.pattern),
                CallerMeta::system("CronInput"),
                &self.agent_name,
                serde_json::json!({"pattern": self.config.pattern, "timezone": self.config.timezone}),
            );
        }
        (self.on_task)(Task::new(
            &self.agent_name,
            &self.config.prompt,
            self.config.priority.unwrap_or_default(),
            &self.source,
        ));
    }
}

impl InputSource for CronInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn source_type(&self) -> &'static str {
        "cron"
    }

    fn start(&mut self, agent_name: &str, on_task: TaskCallback) {
        if self.job.is_some() {
            debug!(id = %self.id, "CronInput::start: already active");
            return;
        }

        let schedule = self.schedule.clone();
        let timezone = self.timezone;
        let firing = Firing {
            source: format!("cron:{}", self.id),
            agent_name: agent_name.to_string(),
            config: self.config.clone(),
            sink: self.event_sink.clone(),
            on_task,
        };

        self.job = Some(Trigger::spawn(move |gate| async move {
            let mut last_fire: Option<DateTime<Utc>> = None;
            loop {
                let now = Utc::now();
                let from = last_fire.map_or(now, |last| last.max(now));
                let Some(next) = next_occurrence(&schedule, timezone, from) else {
                    warn!(source = %firing.source, "Cron schedule has no further occurrences");
                    return;
                };
                let delay = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;
                last_fire = Some(next);
                if !gate.pass(|| firing.fire()) {
                    return;
                }
            }
        }));

        info!(id = %self.id, pattern = %self.config.pattern, timezone = %self.timezone, "CronInput started");
    }

    fn stop(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        drop(job);
        info!(id = %self.id, "CronInput stopped");
    }

    fn is_active(&self) -> bool {
        self.job.is_some()
    }
}
