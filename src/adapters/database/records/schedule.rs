use crate::domain::schedule::{CronField, CrontabSchedule, PeriodicTask, RecurrenceSpec, ScheduledTask};
use crate::error::AppError;
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, FromRow)]
pub struct CrontabScheduleRecord {
    pub(crate) id: i64,
    pub(crate) minute: String,
    pub(crate) hour: String,
    pub(crate) day_of_week: String,
    pub(crate) day_of_month: String,
    pub(crate) month_of_year: String,
}

impl CrontabScheduleRecord {
    fn spec(&self) -> Result<RecurrenceSpec, String> {
        Ok(RecurrenceSpec {
            minute: self.minute.parse::<u8>().map_err(|e| format!("minute {}: {e}", self.minute))?,
            hour: self.hour.parse::<u8>().map_err(|e| format!("hour {}: {e}", self.hour))?,
            day_of_week: self.day_of_week.parse::<CronField>()?,
            day_of_month: self.day_of_month.parse::<CronField>()?,
            month_of_year: self.month_of_year.parse::<CronField>()?,
        })
    }
}

impl TryFrom<CrontabScheduleRecord> for CrontabSchedule {
    type Error = AppError;

    fn try_from(record: CrontabScheduleRecord) -> Result<Self, Self::Error> {
        let spec = record.spec().map_err(|e| {
            tracing::error!(schedule_id = record.id, error = %e, "Corrupt crontab schedule row");
            AppError::Internal
        })?;
        Ok(Self { id: record.id, spec })
    }
}

#[derive(Debug, FromRow)]
pub struct PeriodicTaskRecord {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) schedule_id: i64,
    pub(crate) newsletter_id: i64,
    pub(crate) last_run_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl From<PeriodicTaskRecord> for PeriodicTask {
    fn from(record: PeriodicTaskRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            schedule_id: record.schedule_id,
            newsletter_id: record.newsletter_id,
            last_run_at: record.last_run_at,
            created_at: record.created_at,
        }
    }
}

/// A task joined with its schedule columns.
#[derive(Debug, FromRow)]
pub struct ScheduledTaskRecord {
    #[sqlx(flatten)]
    pub(crate) task: PeriodicTaskRecord,
    pub(crate) minute: String,
    pub(crate) hour: String,
    pub(crate) day_of_week: String,
    pub(crate) day_of_month: String,
    pub(crate) month_of_year: String,
}

impl TryFrom<ScheduledTaskRecord> for ScheduledTask {
    type Error = AppError;

    fn try_from(record: ScheduledTaskRecord) -> Result<Self, Self::Error> {
        let schedule = CrontabScheduleRecord {
            id: record.task.schedule_id,
            minute: record.minute,
            hour: record.hour,
            day_of_week: record.day_of_week,
            day_of_month: record.day_of_month,
            month_of_year: record.month_of_year,
        };
        let CrontabSchedule { spec, .. } = schedule.try_into()?;
        Ok(Self { task: record.task.into(), spec })
    }
}
