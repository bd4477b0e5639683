//! # Maintenance Windows
//!
//! A maintenance window gates when a soft or forced update may actually
//! be installed on a device. It is defined by a cron schedule for window
//! starts, a duration, and a fixed UTC offset in which the schedule is
//! interpreted. Evaluation is a pure function of the wall clock so the
//! rollout engine and the protocol dispatcher always agree on gating.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{UpdraftError, UpdraftResult};
use crate::maintenance::schedule::CronSchedule;

/// Where the wall clock sits relative to the window schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// No window is configured; installation is never gated.
    NotConfigured,
    /// Now is ahead of the next window start.
    Before,
    /// Now falls inside an open window.
    InWindow,
    /// The schedule has no further occurrences.
    After,
}

impl WindowState {
    /// Whether installation may proceed right now.
    pub fn permits_install(&self) -> bool {
        matches!(self, WindowState::NotConfigured | WindowState::InWindow)
    }
}

/// Maintenance window definition as stored on actions and rollouts.
///
/// Fields stay in their wire form; [`MaintenanceWindow::validate`] is
/// called once at creation and evaluation re-parses on demand, so a
/// stored window can never fail in ways creation did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    /// 6-field cron expression for window starts.
    pub schedule: String,
    /// Window length as `hh:mm:ss`.
    pub duration: String,
    /// Fixed UTC offset (`+02:00`, `-05:30`, or `Z`) the schedule is
    /// evaluated in.
    pub timezone: String,
}

impl MaintenanceWindow {
    pub fn new(
        schedule: impl Into<String>,
        duration: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            schedule: schedule.into(),
            duration: duration.into(),
            timezone: timezone.into(),
        }
    }

    /// Validate all three fields. Called when an action or rollout
    /// carrying a window is created.
    pub fn validate(&self) -> UpdraftResult<()> {
        self.compile().map(|_| ())
    }

    /// Evaluate the window against `now`.
    pub fn evaluate(&self, now: DateTime<Utc>) -> UpdraftResult<WindowState> {
        let (schedule, duration, offset) = self.compile()?;
        let local = now.with_timezone(&offset).naive_local();

        // The window containing `local` (if any) started at most
        // `duration` ago. Probing one second earlier makes a start at
        // exactly `local - duration` still count as open.
        let probe = local - duration - Duration::seconds(1);
        match schedule.next_after(probe) {
            Some(start) if start <= local => Ok(WindowState::InWindow),
            Some(_) => Ok(WindowState::Before),
            None => Ok(WindowState::After),
        }
    }

    fn compile(&self) -> UpdraftResult<(CronSchedule, Duration, FixedOffset)> {
        let schedule = CronSchedule::parse(&self.schedule).map_err(|reason| {
            UpdraftError::InvalidMaintenanceSchedule {
                schedule: self.schedule.clone(),
                reason,
            }
        })?;
        let duration = parse_duration(&self.duration)?;
        let offset = parse_timezone(&self.timezone)?;
        Ok((schedule, duration, offset))
    }
}

/// Parse a window duration in `hh:mm:ss` form. Must be positive; hours
/// may exceed 24 for windows spanning several days.
fn parse_duration(s: &str) -> UpdraftResult<Duration> {
    let invalid = || UpdraftError::InvalidMaintenanceDuration {
        duration: s.to_string(),
    };

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let hours: i64 = parts[0].parse().map_err(|_| invalid())?;
    let minutes: i64 = parts[1].parse().map_err(|_| invalid())?;
    let seconds: i64 = parts[2].parse().map_err(|_| invalid())?;
    if minutes > 59 || seconds > 59 {
        return Err(invalid());
    }

    let total = hours * 3600 + minutes * 60 + seconds;
    if total <= 0 {
        return Err(invalid());
    }
    Ok(Duration::seconds(total))
}

/// Parse a fixed UTC offset: `Z`, `+hh:mm` or `-hh:mm`.
fn parse_timezone(s: &str) -> UpdraftResult<FixedOffset> {
    let invalid = || UpdraftError::InvalidMaintenanceTimezone {
        timezone: s.to_string(),
    };

    if s == "Z" || s == "z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = s.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
