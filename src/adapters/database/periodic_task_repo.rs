use crate::adapters::database::DbPool;
use crate::adapters::database::records::{CrontabScheduleRecord, PeriodicTaskRecord, ScheduledTaskRecord};
use crate::domain::schedule::{CrontabSchedule, PeriodicTask, RecurrenceSpec, ScheduledTask};
use crate::error::{AppError, Result};
use crate::services::ports::PeriodicTaskRegistry;
use async_trait::async_trait;
use time::OffsetDateTime;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone, Debug)]
pub struct PgPeriodicTaskRegistry {
    pool: DbPool,
}

impl PgPeriodicTaskRegistry {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PeriodicTaskRegistry for PgPeriodicTaskRegistry {
    #[tracing::instrument(level = "debug", skip(self), fields(spec = %spec))]
    async fn schedule_or_get(&self, spec: RecurrenceSpec) -> Result<CrontabSchedule> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let record = sqlx::query_as::<_, CrontabScheduleRecord>(
            r#"
            INSERT INTO crontab_schedules (minute, hour, day_of_week, day_of_month, month_of_year)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (minute, hour, day_of_week, day_of_month, month_of_year)
            DO UPDATE SET minute = EXCLUDED.minute
            RETURNING id, minute, hour, day_of_week, day_of_month, month_of_year
            "#,
        )
        .bind(spec.minute.to_string())
        .bind(spec.hour.to_string())
        .bind(spec.day_of_week.to_string())
        .bind(spec.day_of_month.to_string())
        .bind(spec.month_of_year.to_string())
        .fetch_one(&self.pool)
        .await?;

        record.try_into()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn register(&self, name: &str, schedule_id: i64, newsletter_id: i64) -> Result<PeriodicTask> {
        let result = sqlx::query_as::<_, PeriodicTaskRecord>(
            r#"
            INSERT INTO periodic_tasks (name, schedule_id, newsletter_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, schedule_id, newsletter_id, last_run_at, created_at
            "#,
        )
        .bind(name)
        .bind(schedule_id)
        .bind(newsletter_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::Conflict(format!("periodic task {name} already exists")))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_name(&self, name: &str) -> Result<Option<PeriodicTask>> {
        let record = sqlx::query_as::<_, PeriodicTaskRecord>(
            "SELECT id, name, schedule_id, newsletter_id, last_run_at, created_at FROM periodic_tasks WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_newsletter(&self, newsletter_id: i64) -> Result<Option<PeriodicTask>> {
        let record = sqlx::query_as::<_, PeriodicTaskRecord>(
            r#"
            SELECT id, name, schedule_id, newsletter_id, last_run_at, created_at
            FROM periodic_tasks
            WHERE newsletter_id = $1
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(newsletter_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, task_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM periodic_tasks WHERE id = $1").bind(task_id).execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_scheduled(&self) -> Result<Vec<ScheduledTask>> {
        let records = sqlx::query_as::<_, ScheduledTaskRecord>(
            r#"
            SELECT t.id, t.name, t.schedule_id, t.newsletter_id, t.last_run_at, t.created_at,
                   s.minute, s.hour, s.day_of_week, s.day_of_month, s.month_of_year
            FROM periodic_tasks t
            JOIN crontab_schedules s ON s.id = t.schedule_id
            ORDER BY t.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn claim_run(
        &self,
        task_id: i64,
        previous: Option<OffsetDateTime>,
        fired_at: OffsetDateTime,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE periodic_tasks
            SET last_run_at = $3
            WHERE id = $1 AND last_run_at IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(task_id)
        .bind(previous)
        .bind(fired_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn release_run(
        &self,
        task_id: i64,
        claimed: OffsetDateTime,
        previous: Option<OffsetDateTime>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE periodic_tasks SET last_run_at = $3 WHERE id = $1 AND last_run_at = $2")
            .bind(task_id)
            .bind(claimed)
            .bind(previous)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
