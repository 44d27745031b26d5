use crate::domain::newsletter::{Frequency, Newsletter};
use crate::error::{AppError, Result};
use std::str::FromStr;
use time::{OffsetDateTime, UtcOffset};

/// Highest day of month a monthly newsletter may be pinned to, so short months are never skipped.
pub const MAX_MONTHLY_DAY: u8 = 28;

const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CronField {
    Any,
    At(u8),
}

impl std::fmt::Display for CronField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::At(value) => write!(f, "{value}"),
        }
    }
}

impl FromStr for CronField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::Any);
        }
        s.parse::<u8>().map(Self::At).map_err(|_| format!("Invalid cron field: {s}"))
    }
}

/// Cron-like recurrence. `day_of_week` counts from Monday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecurrenceSpec {
    pub minute: u8,
    pub hour: u8,
    pub day_of_week: CronField,
    pub day_of_month: CronField,
    pub month_of_year: CronField,
}

impl RecurrenceSpec {
    /// Derives the recurrence from the newsletter's frequency, send time and creation date.
    #[must_use]
    pub fn for_newsletter(newsletter: &Newsletter) -> Self {
        let created = newsletter.created_at.to_offset(UtcOffset::UTC);

        let (day_of_week, day_of_month) = match newsletter.frequency {
            Frequency::Daily => (CronField::Any, CronField::Any),
            Frequency::Weekly => (CronField::At(created.weekday().number_days_from_monday()), CronField::Any),
            Frequency::Monthly => (CronField::Any, CronField::At(created.day().min(MAX_MONTHLY_DAY))),
        };

        Self {
            minute: newsletter.time.minute(),
            hour: newsletter.time.hour(),
            day_of_week,
            day_of_month,
            month_of_year: CronField::Any,
        }
    }

    /// Renders a six-field expression (seconds first) with weekdays as names.
    ///
    /// # Errors
    /// Returns `AppError::InvalidSchedule` if the day of week is out of range.
    pub fn cron_expression(&self) -> Result<String> {
        let day_of_week = match self.day_of_week {
            CronField::Any => "*".to_string(),
            CronField::At(day) => WEEKDAY_NAMES
                .get(usize::from(day))
                .ok_or_else(|| AppError::InvalidSchedule(format!("day of week {day} out of range")))?
                .to_string(),
        };

        Ok(format!("0 {} {} {} {} {}", self.minute, self.hour, self.day_of_month, self.month_of_year, day_of_week))
    }

    /// The first firing strictly after `after`, in UTC.
    ///
    /// # Errors
    /// Returns `AppError::InvalidSchedule` if the recurrence cannot be evaluated.
    pub fn next_after(&self, after: OffsetDateTime) -> Result<Option<OffsetDateTime>> {
        let expression = self.cron_expression()?;
        let schedule = cron::Schedule::from_str(&expression)
            .map_err(|e| AppError::InvalidSchedule(format!("{expression}: {e}")))?;

        let after = chrono::DateTime::from_timestamp(after.unix_timestamp(), after.nanosecond())
            .ok_or_else(|| AppError::InvalidSchedule(format!("timestamp {after} out of range")))?;

        schedule
            .after(&after)
            .next()
            .map(|next| {
                OffsetDateTime::from_unix_timestamp(next.timestamp())
                    .map_err(|e| AppError::InvalidSchedule(e.to_string()))
            })
            .transpose()
    }
}

impl std::fmt::Display for RecurrenceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month_of_year, self.day_of_week
        )
    }
}

/// A stored recurrence. Identical specs share one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrontabSchedule {
    pub id: i64,
    pub spec: RecurrenceSpec,
}

/// A registered job that runs a delivery pass for one newsletter on a schedule.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    pub id: i64,
    pub name: String,
    pub schedule_id: i64,
    pub newsletter_id: i64,
    pub last_run_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PeriodicTask {
    /// The instant from which the next firing is searched.
    #[must_use]
    pub fn last_fired_or_created(&self) -> OffsetDateTime {
        self.last_run_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task: PeriodicTask,
    pub spec: RecurrenceSpec,
}

impl ScheduledTask {
    /// The most recent firing due at `now`, if any. Slots missed while no beat was
    /// running collapse into the latest one.
    ///
    /// # Errors
    /// Returns `AppError::InvalidSchedule` if the recurrence cannot be evaluated.
    pub fn due_at(&self, now: OffsetDateTime) -> Result<Option<OffsetDateTime>> {
        let mut due = None;
        let mut cursor = self.task.last_fired_or_created();
        while let Some(next) = self.spec.next_after(cursor)? {
            if next > now {
                break;
            }
            due = Some(next);
            cursor = next;
        }
        Ok(due)
    }
}
